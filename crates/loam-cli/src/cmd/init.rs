use anyhow::{Context as _, Result};
use clap::Args;
use loam_core::config::OutboxConfig;
use loam_core::{Outbox, db};

use crate::paths::Paths;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.toml with the default template.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[outbox]\n\
    base_backoff_secs = 60\n\
    backoff_cap_secs = 3600\n\
    max_action_age_hours = 168\n\
    \n\
    # Actor directory used by `loam history` to resolve display names.\n\
    # [actors.amina]\n\
    # name = \"Amina Njoroge\"\n\
    # role = \"farmer\"\n";

/// Execute `loam init`. Creates the data directory, opens the ledger once
/// so migrations run, creates the outbox database, and writes a default
/// config.toml.
///
/// # Errors
///
/// Returns an error if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, paths: &Paths) -> Result<()> {
    std::fs::create_dir_all(paths.data_dir()).with_context(|| {
        format!(
            "failed to create data directory {}",
            paths.data_dir().display()
        )
    })?;

    // Opening runs migrations; dropping closes cleanly.
    drop(db::open_store(&paths.ledger())?);
    drop(Outbox::open(&paths.outbox(), OutboxConfig::default())?);

    let config_path = paths.config();
    if !config_path.exists() || args.force {
        std::fs::write(&config_path, CONFIG_TOML)
            .with_context(|| format!("failed to write config {}", config_path.display()))?;
    } else {
        tracing::info!("config.toml already present, leaving it in place");
    }

    println!("✓ Initialized loam data directory.");
    println!();
    println!("  Ledger:  {}", paths.ledger().display());
    println!("  Outbox:  {}", paths.outbox().display());
    println!("  Config:  {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  Set your actor identity (required for recording):");
    println!("    export LOAM_ACTOR=your-id");
    println!();
    println!("  Record a planting:");
    println!("    loam record PLANTED field-1 --payload '{{\"cropType\": \"Maize\"}}'");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = Paths::resolve(Some(dir.path().join("loam"))).expect("paths");

        run_init(&InitArgs { force: false }, &paths).expect("init");
        assert!(paths.ledger().is_file());
        assert!(paths.outbox().is_file());
        assert!(paths.config().is_file());

        let config = std::fs::read_to_string(paths.config()).expect("read config");
        assert!(config.contains("[outbox]"));
        assert!(config.contains("max_action_age_hours"));
    }

    #[test]
    fn reinit_preserves_config_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = Paths::resolve(Some(dir.path().join("loam"))).expect("paths");

        run_init(&InitArgs { force: false }, &paths).expect("init");
        std::fs::write(paths.config(), "[outbox]\nbase_backoff_secs = 5\n").expect("edit");

        run_init(&InitArgs { force: false }, &paths).expect("reinit");
        let kept = std::fs::read_to_string(paths.config()).expect("read");
        assert!(kept.contains("base_backoff_secs = 5"));

        run_init(&InitArgs { force: true }, &paths).expect("reinit --force");
        let reset = std::fs::read_to_string(paths.config()).expect("read");
        assert!(reset.contains("base_backoff_secs = 60"));
    }
}
