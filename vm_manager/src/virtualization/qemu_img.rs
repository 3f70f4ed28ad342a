use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use tokio::process::Command;

use super::image_tool::{CreateImageRequest, ImageInfo, ImageTool, ImageToolError, Preallocation};

/// `qemu-img` driven as a child process.
pub struct QemuImg {
    path_to_tool: PathBuf,
}

impl QemuImg {
    pub const DEFAULT_PATH: &'static str = "qemu-img";

    pub fn new(path_to_tool: PathBuf) -> Self {
        Self { path_to_tool }
    }

    fn create_command(&self, request: &CreateImageRequest) -> Command {
        let mut command = Command::new(&self.path_to_tool);
        command.arg("create").arg("-f").arg(request.format.as_str());
        if request.preallocation == Preallocation::Full {
            command.arg("-o").arg("preallocation=full");
        }
        command
            .arg(&request.path)
            .arg(format!("{}M", request.size_mb));
        command
    }

    fn info_command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.path_to_tool);
        command.arg("info").arg("--output=json").arg(path);
        command
    }

    async fn run(mut command: Command) -> Result<String, ImageToolError> {
        debug!("Running: {:?}", command.as_std());
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| ImageToolError::Spawn(err.to_string()))?;
        if !output.status.success() {
            return Err(ImageToolError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout)
            .map_err(|err| ImageToolError::InvalidOutput(err.to_string()))
    }
}

impl Default for QemuImg {
    fn default() -> Self {
        Self::new(PathBuf::from(Self::DEFAULT_PATH))
    }
}

#[async_trait]
impl ImageTool for QemuImg {
    async fn create(&self, request: &CreateImageRequest) -> Result<(), ImageToolError> {
        Self::run(self.create_command(request)).await.map(|_| ())
    }

    async fn info(&self, path: &Path) -> Result<ImageInfo, ImageToolError> {
        let output = Self::run(self.info_command(path)).await?;
        ImageInfo::from_json(&output)
    }
}
