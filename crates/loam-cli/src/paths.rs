//! Resolution of the on-disk layout for a loam installation.
//!
//! Everything lives under one data directory:
//!
//! ```text
//! <data-dir>/
//!   ledger.sqlite3    (VTIs + events, the shared ledger)
//!   outbox.sqlite3    (this device's offline queue)
//!   config.toml       (retry policy, actor directory)
//! ```

use anyhow::{Result, anyhow};
use std::env;
use std::path::{Path, PathBuf};

/// Resolved file locations for one installation.
#[derive(Debug, Clone)]
pub struct Paths {
    data_dir: PathBuf,
}

impl Paths {
    /// Resolve the data directory. Precedence: `--data-dir` flag,
    /// `LOAM_DATA_DIR` env var, then the platform data dir.
    pub fn resolve(flag: Option<PathBuf>) -> Result<Self> {
        let data_dir = flag
            .or_else(|| env::var_os("LOAM_DATA_DIR").map(PathBuf::from))
            .or_else(|| dirs::data_dir().map(|d| d.join("loam")))
            .ok_or_else(|| {
                anyhow!("cannot determine a data directory; pass --data-dir or set LOAM_DATA_DIR")
            })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ledger(&self) -> PathBuf {
        self.data_dir.join("ledger.sqlite3")
    }

    pub fn outbox(&self) -> PathBuf {
        self.data_dir.join("outbox.sqlite3")
    }

    pub fn config(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins() {
        let paths = Paths::resolve(Some(PathBuf::from("/tmp/loam-test"))).expect("resolve");
        assert_eq!(paths.data_dir(), Path::new("/tmp/loam-test"));
        assert_eq!(paths.ledger(), Path::new("/tmp/loam-test/ledger.sqlite3"));
        assert_eq!(paths.outbox(), Path::new("/tmp/loam-test/outbox.sqlite3"));
        assert_eq!(paths.config(), Path::new("/tmp/loam-test/config.toml"));
    }
}
