use std::path::Path;

use log::{info, warn};

use super::descriptor_editor::{CommitReport, DescriptorEditor, EditorError};
use super::memory_sizing::{derive_ram_options, total_in_unit, warn_if_near_capacity, RamCheck};
use super::vm_descriptor::{DiskEntry, DiskType, RamUnit, VmDescriptor};
use crate::storage::codec::ParsedDescriptor;
use crate::storage::descriptor_store::{DescriptorStore, DescriptorStoreError};
use crate::storage::disk_provisioner::DiskProvisioner;
use crate::virtualization::host_memory::HostMemory;
use crate::virtualization::image_tool::ImageTool;

/// Entry point for callers: owns the descriptor store, the disk provisioner
/// and the host memory source.
pub struct VmConfigManager<T: ImageTool, M: HostMemory> {
    store: DescriptorStore,
    provisioner: DiskProvisioner<T>,
    host_memory: M,
}

impl<T: ImageTool + Send + Sync, M: HostMemory> VmConfigManager<T, M> {
    pub fn new(store: DescriptorStore, image_tool: T, host_memory: M) -> Self {
        Self {
            store,
            provisioner: DiskProvisioner::new(image_tool),
            host_memory,
        }
    }

    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn provisioner(&self) -> &DiskProvisioner<T> {
        &self.provisioner
    }

    pub async fn list(&self) -> Result<Vec<VmDescriptor>, DescriptorStoreError> {
        self.store.list().await
    }

    /// Opens `name` for editing, or a blank descriptor when `name` is `None`.
    pub async fn open_editor(&self, name: Option<&str>) -> Result<DescriptorEditor, EditorError> {
        let parsed = match name {
            Some(name) => self.store.load(name).await?,
            None => ParsedDescriptor::default(),
        };
        Ok(DescriptorEditor::open(name.map(str::to_string), parsed, &self.provisioner).await)
    }

    pub async fn commit(
        &self,
        editor: &mut DescriptorEditor,
        preallocate_full: bool,
    ) -> Result<CommitReport, EditorError> {
        let report = editor
            .commit(&self.store, &self.provisioner, preallocate_full)
            .await?;
        for degraded in &report.degraded {
            warn!(
                "{} was created without preallocation: {}",
                degraded.path.display(),
                degraded.reason
            );
        }
        Ok(report)
    }

    /// Removes the descriptor and, only when `delete_disks` is set, the images
    /// it references. Returns the disks whose images were removed.
    pub async fn delete(
        &self,
        name: &str,
        delete_disks: bool,
    ) -> Result<Vec<DiskEntry>, EditorError> {
        let disks = if delete_disks {
            self.store.load(name).await?.descriptor.disks
        } else {
            vec![]
        };
        self.store.delete(name).await?;

        let mut removed = vec![];
        for disk in disks {
            if let Some(path) = disk.path.as_deref() {
                self.provisioner.remove_image(path).await?;
                removed.push(disk);
            }
        }
        info!("Deleted VM '{}' ({} disk images removed)", name, removed.len());
        Ok(removed)
    }

    pub async fn probe_disk(&self, path: &Path, disk_type: &DiskType) -> u64 {
        self.provisioner.probe_size(path, disk_type).await
    }

    pub fn total_memory_mb(&self) -> u64 {
        self.host_memory.total_physical_memory_mb()
    }

    pub fn ram_options(&self, unit: RamUnit) -> Vec<u64> {
        derive_ram_options(unit, self.total_memory_mb())
    }

    pub fn check_ram(&self, amount: u64, unit: RamUnit) -> RamCheck {
        warn_if_near_capacity(amount, total_in_unit(unit, self.total_memory_mb()))
    }
}
