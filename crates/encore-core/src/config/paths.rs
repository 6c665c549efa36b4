//! Default file locations

use std::path::PathBuf;

const APP_DIR: &str = "encore";

/// `~/.config/encore/config.yaml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("config.yaml")
}

/// `~/.local/share/encore/<file_name>`
pub fn default_data_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(file_name)
}
