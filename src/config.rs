//! Runtime configuration

use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "fitlevel.db";

/// Collection holding one progress document per user
pub const DEFAULT_COLLECTION: &str = "userStats";

#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite file; `None` keeps everything in memory
    pub db_path: Option<PathBuf>,
    pub collection: String,
}
