//! Fixed names used under the configuration and state directories

pub const APP_DIR: &str = "fman";
pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_DIR: &str = "state";
pub const LOGS_DIR: &str = "logs";

pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_PARALLEL_FETCHES: usize = 8;
