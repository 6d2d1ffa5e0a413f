pub mod history;
pub mod init;
pub mod queue;
pub mod record;
pub mod sync;
