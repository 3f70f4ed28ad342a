use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use async_trait::async_trait;
use tempfile::TempDir;
use utils::file_system::config_directory::ConfigDirectory;
use vm_manager::{
    managers::vm_config_manager::VmConfigManager,
    storage::{descriptor_store::DescriptorStore, disk_provisioner::MIB},
    virtualization::{
        host_memory::HostMemory,
        image_tool::{CreateImageRequest, ImageInfo, ImageTool, ImageToolError, Preallocation},
    },
};

/// Stands in for qemu-img: images are sparse files of the requested size.
#[derive(Default)]
pub struct FakeImageTool {
    pub reject_preallocation: bool,
    pub failing_path: Option<PathBuf>,
    pub(crate) requests: Mutex<Vec<CreateImageRequest>>,
}

impl FakeImageTool {
    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<CreateImageRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageTool for FakeImageTool {
    async fn create(&self, request: &CreateImageRequest) -> Result<(), ImageToolError> {
        self.requests.lock().unwrap().push(request.clone());
        let rejected = self.reject_preallocation && request.preallocation == Preallocation::Full;
        if rejected || self.failing_path.as_ref() == Some(&request.path) {
            return Err(ImageToolError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: "Could not create image".to_string(),
            });
        }
        let file = std::fs::File::create(&request.path)
            .map_err(|err| ImageToolError::Spawn(err.to_string()))?;
        file.set_len(request.size_mb * MIB)
            .map_err(|err| ImageToolError::Spawn(err.to_string()))?;
        Ok(())
    }

    async fn info(&self, path: &Path) -> Result<ImageInfo, ImageToolError> {
        let metadata = std::fs::metadata(path)
            .map_err(|err| ImageToolError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: err.to_string(),
            })?;
        Ok(ImageInfo {
            virtual_size: metadata.len(),
        })
    }
}

pub struct FixedHostMemory(pub u64);

impl HostMemory for FixedHostMemory {
    fn total_physical_memory_mb(&self) -> u64 {
        self.0
    }
}

/// Scratch directories for descriptors and disk images, removed on drop.
pub struct TestEnvironment {
    config_dir: TempDir,
    disk_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            config_dir: tempfile::tempdir().unwrap(),
            disk_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        self.config_dir.path()
    }

    pub fn disk_path(&self, file_name: &str) -> PathBuf {
        self.disk_dir.path().join(file_name)
    }

    pub async fn manager(
        &self,
        image_tool: FakeImageTool,
    ) -> VmConfigManager<FakeImageTool, FixedHostMemory> {
        let directory = ConfigDirectory::new(self.config_dir().to_path_buf())
            .await
            .unwrap();
        VmConfigManager::new(
            DescriptorStore::new(directory),
            image_tool,
            FixedHostMemory(8192),
        )
    }
}
