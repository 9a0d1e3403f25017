//! Database access
//!
//! SQLite holds the playback position record for each episode and a small
//! key-value settings table (current episode).

pub mod init;
pub mod playback;

pub use init::init_database;
pub use playback::*;
