use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::error::{Result, WhisprError};

pub const APP_QUALIFIER: &str = "app";
pub const APP_ORG: &str = "whispr";
pub const APP_NAME: &str = "whispr";

pub const DATA_DIR_ENV: &str = "WHISPR_DATA_DIR";
pub const REGISTRY_DIR_NAME: &str = "registry";

pub fn data_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| WhisprError::Config("cannot determine data directory".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(crate::config::CONFIG_FILE_NAME)
}

pub fn registry_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(REGISTRY_DIR_NAME)
}
