use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::mock;

use crate::managers::vm_descriptor::{
    Accelerator, CpuConfig, DiskEntry, DiskType, GpuOptions, VmDescriptor,
};
use crate::virtualization::host_memory::HostMemory;
use crate::virtualization::image_tool::{
    CreateImageRequest, ImageInfo, ImageTool, ImageToolError,
};

pub fn create_example_descriptor() -> VmDescriptor {
    VmDescriptor {
        name: "debian".to_string(),
        cpu: CpuConfig {
            model: Some("Basic: qemu64".to_string()),
            cores: Some("4".to_string()),
            sockets: Some("1".to_string()),
            threads: Some("2".to_string()),
            features: Some("+ssse3,-sse4.2".to_string()),
            accel_enabled: Some(true),
            accelerator: Some(Accelerator::Kvm),
        },
        ram: Some("4096MB".to_string()),
        disks: vec![
            DiskEntry::new(
                DiskType::Qcow2,
                Some(PathBuf::from("/var/lib/vms/debian.qcow2")),
                "20480",
            ),
            DiskEntry::new(
                DiskType::Raw,
                Some(PathBuf::from("/var/lib/vms/data.img")),
                "1024",
            ),
        ],
        gpu: GpuOptions {
            vga: Some("virtio".to_string()),
            display: Some("gtk".to_string()),
            device: None,
            gl: Some("on".to_string()),
            hostmem: Some("256M".to_string()),
        },
        network: Some("user".to_string()),
        hardware: Some("-bios /usr/share/ovmf/OVMF.fd".to_string()),
    }
}

pub fn create_example_image_info(virtual_size_mb: u64) -> ImageInfo {
    ImageInfo {
        virtual_size: virtual_size_mb * 1024 * 1024,
    }
}

/// Writes a sparse file so existence checks and RAW probes see the disk.
pub fn create_sparse_file(path: &Path, size_mb: u64) {
    let file = std::fs::File::create(path).unwrap();
    file.set_len(size_mb * 1024 * 1024).unwrap();
}

mock! {
    pub ImageTool {}

    #[async_trait]
    impl ImageTool for ImageTool {
        async fn create(&self, request: &CreateImageRequest) -> Result<(), ImageToolError>;
        async fn info(&self, path: &Path) -> Result<ImageInfo, ImageToolError>;
    }
}

mock! {
    pub HostMemory {}

    impl HostMemory for HostMemory {
        fn total_physical_memory_mb(&self) -> u64;
    }
}
