use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::virtualization::qemu_img::QemuImg;

const APP_DIR_NAME: &str = "qemu-vmm";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Read(#[source] std::io::Error),
    #[error("Deserialization error: {0}")]
    InvalidConfigFile(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub config_dir: PathBuf,
    pub qemu_img_path: PathBuf,
    pub preallocate_full: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            qemu_img_path: PathBuf::from(QemuImg::DEFAULT_PATH),
            preallocate_full: false,
        }
    }
}

impl ManagerConfig {
    pub async fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::Read)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// `<user config dir>/qemu-vmm`, or `./qemu-vmm` when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
