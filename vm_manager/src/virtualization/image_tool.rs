use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::managers::vm_descriptor::ImageFormat;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ImageToolError {
    #[error("Failed to run image tool: {0}")]
    Spawn(String),
    #[error("Image tool exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("Image tool produced unexpected output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preallocation {
    #[default]
    Off,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateImageRequest {
    pub path: PathBuf,
    pub format: ImageFormat,
    pub size_mb: u64,
    pub preallocation: Preallocation,
}

/// Subset of `info --output=json` this crate relies on.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    #[serde(rename = "virtual-size")]
    pub virtual_size: u64,
}

impl ImageInfo {
    pub fn from_json(output: &str) -> Result<Self, ImageToolError> {
        serde_json::from_str(output).map_err(|err| ImageToolError::InvalidOutput(err.to_string()))
    }
}

#[async_trait]
pub trait ImageTool {
    async fn create(&self, request: &CreateImageRequest) -> Result<(), ImageToolError>;
    async fn info(&self, path: &Path) -> Result<ImageInfo, ImageToolError>;
}
