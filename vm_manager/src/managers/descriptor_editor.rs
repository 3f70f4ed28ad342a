use std::path::PathBuf;

use log::{debug, info};
use thiserror::Error;

use crate::managers::vm_descriptor::{
    Accelerator, CpuConfig, DiskEntry, DiskType, GpuOptions, RamSize, RamUnit, VmDescriptor,
};
use crate::storage::codec::{IgnoredLine, ParsedDescriptor};
use crate::storage::descriptor_store::{validate_name, DescriptorStore, DescriptorStoreError};
use crate::storage::disk_provisioner::{
    clamp_to_floor, file_exists, DegradedDisk, DiskProvisioner, ProvisionerError,
};
use crate::storage::with_default_extension;
use crate::virtualization::image_tool::ImageTool;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum EditorError {
    #[error("There is no disk at index {0}")]
    NoSuchDisk(usize),
    #[error("Disk {0} already exists on disk, its type can't be changed")]
    DiskTypeLocked(usize),
    #[error("Disk capacity must be a decimal number of MB, got: '{0}'")]
    InvalidCapacity(String),
    #[error("Disk path {} can't contain ';' or line breaks", .0.display())]
    UnstorablePath(PathBuf),
    #[error(transparent)]
    Store(#[from] DescriptorStoreError),
    #[error(transparent)]
    Provisioner(#[from] ProvisionerError),
}

/// A disk entry together with the limits its backing file imposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskSlot {
    entry: DiskEntry,
    floor_mb: u64,
    locked: bool,
}

impl DiskSlot {
    pub fn entry(&self) -> &DiskEntry {
        &self.entry
    }

    /// Size of the existing image in MB; 0 when there's no floor.
    pub fn floor_mb(&self) -> u64 {
        self.floor_mb
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

/// Mutable access to the plain fields of the draft. Disks go through the
/// editor so that floors and type locks stay enforced.
pub struct DescriptorFields<'a> {
    pub name: &'a mut String,
    pub cpu: &'a mut CpuConfig,
    pub ram: &'a mut Option<String>,
    pub gpu: &'a mut GpuOptions,
    pub network: &'a mut Option<String>,
    pub hardware: &'a mut Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub descriptor: VmDescriptor,
    pub created: Vec<PathBuf>,
    pub degraded: Vec<DegradedDisk>,
}

pub struct DescriptorEditor {
    original_name: Option<String>,
    snapshot: VmDescriptor,
    ignored: Vec<IgnoredLine>,
    draft: VmDescriptor,
    disks: Vec<DiskSlot>,
}

impl DescriptorEditor {
    /// Starts editing `parsed`. `original_name` is `None` for a VM that
    /// hasn't been saved yet. Disks whose files exist are probed, locked and
    /// raised to their current size.
    pub async fn open<T: ImageTool + Send + Sync>(
        original_name: Option<String>,
        parsed: ParsedDescriptor,
        provisioner: &DiskProvisioner<T>,
    ) -> Self {
        let ParsedDescriptor {
            descriptor: snapshot,
            ignored,
        } = parsed;
        let mut draft = snapshot.clone();
        let mut disks = vec![];
        for mut entry in std::mem::take(&mut draft.disks) {
            let mut floor_mb = 0;
            let mut locked = false;
            if let Some(path) = entry.path.as_deref() {
                if file_exists(path).await {
                    floor_mb = provisioner.probe_size(path, &entry.disk_type).await;
                    locked = true;
                }
            }
            let clamped = clamp_to_floor(&entry.capacity_mb, floor_mb);
            if clamped != entry.capacity_mb {
                debug!(
                    "Raising capacity of {:?} from {} to {}",
                    entry.path, entry.capacity_mb, clamped
                );
                entry.capacity_mb = clamped;
            }
            disks.push(DiskSlot {
                entry,
                floor_mb,
                locked,
            });
        }
        Self {
            original_name,
            snapshot,
            ignored,
            draft,
            disks,
        }
    }

    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// The descriptor as it was loaded, before any edit or clamp.
    pub fn snapshot(&self) -> &VmDescriptor {
        &self.snapshot
    }

    pub fn ignored_lines(&self) -> &[IgnoredLine] {
        &self.ignored
    }

    pub fn descriptor(&self) -> VmDescriptor {
        VmDescriptor {
            disks: self.disks.iter().map(|slot| slot.entry.clone()).collect(),
            ..self.draft.clone()
        }
    }

    pub fn descriptor_mut(&mut self) -> DescriptorFields<'_> {
        let draft = &mut self.draft;
        DescriptorFields {
            name: &mut draft.name,
            cpu: &mut draft.cpu,
            ram: &mut draft.ram,
            gpu: &mut draft.gpu,
            network: &mut draft.network,
            hardware: &mut draft.hardware,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.descriptor() != self.snapshot
    }

    pub fn disks(&self) -> &[DiskSlot] {
        &self.disks
    }

    /// Whether some disk has a path but no image yet, so a commit would create it.
    pub fn has_missing_images(&self) -> bool {
        self.disks
            .iter()
            .any(|slot| !slot.locked && slot.entry.path.is_some())
    }

    pub fn set_ram(&mut self, amount: u64, unit: RamUnit) {
        self.draft.ram = Some(RamSize { amount, unit }.to_string());
    }

    pub fn set_accelerator(&mut self, enabled: bool, accelerator: Option<Accelerator>) {
        self.draft.cpu.accel_enabled = Some(enabled);
        self.draft.cpu.accelerator = accelerator;
    }

    /// Appends a new disk with the default capacity and returns its index.
    pub fn add_disk(
        &mut self,
        disk_type: DiskType,
        path: Option<PathBuf>,
    ) -> Result<usize, EditorError> {
        let path = path
            .map(|path| storable_path(with_default_extension(&path, &disk_type)))
            .transpose()?;
        self.disks.push(DiskSlot {
            entry: DiskEntry::new(
                disk_type,
                path,
                DiskEntry::DEFAULT_CAPACITY_MB.to_string(),
            ),
            floor_mb: 0,
            locked: false,
        });
        Ok(self.disks.len() - 1)
    }

    /// Appends an existing image. Its probed size becomes both the capacity
    /// and the floor; an image that can't be probed gets the default capacity.
    pub async fn import_disk<T: ImageTool + Send + Sync>(
        &mut self,
        disk_type: DiskType,
        path: PathBuf,
        provisioner: &DiskProvisioner<T>,
    ) -> Result<usize, EditorError> {
        let path = storable_path(path)?;
        let size_mb = provisioner.probe_size(&path, &disk_type).await;
        let capacity = match size_mb {
            0 => DiskEntry::DEFAULT_CAPACITY_MB,
            size_mb => size_mb,
        };
        self.disks.push(DiskSlot {
            entry: DiskEntry::new(disk_type, Some(path), capacity.to_string()),
            floor_mb: size_mb,
            locked: true,
        });
        Ok(self.disks.len() - 1)
    }

    /// Stores `value`, raised to the disk's floor when it's smaller, and
    /// returns what was stored. Only decimal MB are accepted.
    pub fn set_disk_capacity(&mut self, index: usize, value: &str) -> Result<&str, EditorError> {
        if !DiskEntry::is_decimal_capacity(value) {
            return Err(EditorError::InvalidCapacity(value.to_string()));
        }
        let slot = self.slot_mut(index)?;
        slot.entry.capacity_mb = clamp_to_floor(value, slot.floor_mb);
        Ok(slot.entry.capacity_mb.as_str())
    }

    pub fn set_disk_type(&mut self, index: usize, disk_type: DiskType) -> Result<(), EditorError> {
        let slot = self.slot_mut(index)?;
        if slot.locked {
            return Err(EditorError::DiskTypeLocked(index));
        }
        slot.entry.disk_type = disk_type;
        Ok(())
    }

    /// Drops the disk from the descriptor. The image file is left alone.
    pub fn remove_disk(&mut self, index: usize) -> Result<DiskEntry, EditorError> {
        if index >= self.disks.len() {
            return Err(EditorError::NoSuchDisk(index));
        }
        Ok(self.disks.remove(index).entry)
    }

    /// Validates, renames, creates missing images and saves, in that order.
    /// A failing step stops the sequence and leaves the editor open.
    pub async fn commit<T: ImageTool + Send + Sync>(
        &mut self,
        store: &DescriptorStore,
        provisioner: &DiskProvisioner<T>,
        preallocate_full: bool,
    ) -> Result<CommitReport, EditorError> {
        self.normalize_accelerator();
        let descriptor = self.descriptor();
        validate_name(&descriptor.name)?;

        if let Some(original_name) = self.original_name.as_deref() {
            store.rename(original_name, &descriptor.name).await?;
            self.original_name = Some(descriptor.name.clone());
        }

        let report = provisioner
            .provision_missing(&descriptor.disks, preallocate_full)
            .await?;
        for slot in &mut self.disks {
            if slot
                .entry
                .path
                .as_ref()
                .is_some_and(|path| report.created.contains(path))
            {
                slot.locked = true;
            }
        }

        store.save(&descriptor).await?;
        info!("Committed VM '{}'", descriptor.name);
        self.original_name = Some(descriptor.name.clone());
        self.snapshot = descriptor.clone();
        Ok(CommitReport {
            descriptor,
            created: report.created,
            degraded: report.degraded,
        })
    }

    fn normalize_accelerator(&mut self) {
        let cpu = &mut self.draft.cpu;
        let enabled = cpu.accel_enabled == Some(true);
        cpu.accel_enabled = Some(enabled);
        if !enabled {
            cpu.accelerator = None;
        } else if cpu.accelerator.is_none() {
            cpu.accelerator = Some(Accelerator::Tcg);
        }
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut DiskSlot, EditorError> {
        self.disks.get_mut(index).ok_or(EditorError::NoSuchDisk(index))
    }
}

fn storable_path(path: PathBuf) -> Result<PathBuf, EditorError> {
    match DiskEntry::is_storable_path(&path) {
        true => Ok(path),
        false => Err(EditorError::UnstorablePath(path)),
    }
}

#[cfg(test)]
mod test {
    use std::path::{Path, PathBuf};

    use mockall::predicate;
    use utils::file_system::config_directory::ConfigDirectory;

    use super::*;
    use crate::storage::codec;
    use crate::utils::test_utilities::{
        create_example_image_info, create_sparse_file, MockImageTool,
    };
    use crate::virtualization::image_tool::ImageToolError;

    fn parsed(descriptor: VmDescriptor) -> ParsedDescriptor {
        ParsedDescriptor {
            descriptor,
            ignored: vec![],
        }
    }

    fn store(dir: &Path) -> DescriptorStore {
        DescriptorStore::new(ConfigDirectory::existing(dir.to_path_buf()))
    }

    fn creating_image_tool() -> MockImageTool {
        let mut image_tool = MockImageTool::new();
        image_tool.expect_create().returning(|request| {
            create_sparse_file(&request.path, 1);
            Ok(())
        });
        image_tool
    }

    async fn editor_with_existing_disk(dir: &Path, recorded_capacity: &str) -> DescriptorEditor {
        let path = dir.join("root.qcow2");
        create_sparse_file(&path, 1);
        let mut image_tool = MockImageTool::new();
        image_tool
            .expect_info()
            .with(predicate::eq(path.clone()))
            .returning(|_| Ok(create_example_image_info(20480)));
        let provisioner = DiskProvisioner::new(image_tool);
        let mut descriptor = VmDescriptor::new("vm");
        descriptor
            .disks
            .push(DiskEntry::new(DiskType::Qcow2, Some(path), recorded_capacity));
        DescriptorEditor::open(Some("vm".to_string()), parsed(descriptor), &provisioner).await
    }

    #[tokio::test]
    async fn existing_disk_capacity_has_floor() {
        let dir = tempfile::tempdir().unwrap();
        let mut editor = editor_with_existing_disk(dir.path(), "20480").await;

        assert_eq!(editor.disks()[0].floor_mb(), 20480);
        assert!(editor.disks()[0].is_locked());
        assert_eq!(editor.set_disk_capacity(0, "5000"), Ok("20480"));
        assert_eq!(editor.set_disk_capacity(0, "40960"), Ok("40960"));
        assert_eq!(
            editor.set_disk_type(0, DiskType::Raw),
            Err(EditorError::DiskTypeLocked(0))
        );
    }

    #[tokio::test]
    async fn open_raises_capacity_below_image_size() {
        let dir = tempfile::tempdir().unwrap();
        let editor = editor_with_existing_disk(dir.path(), "4096").await;
        assert_eq!(editor.disks()[0].entry().capacity_mb, "20480");
        assert_eq!(editor.snapshot().disks[0].capacity_mb, "4096");
        assert!(editor.is_dirty());
    }

    #[tokio::test]
    async fn new_disk_is_unrestricted() {
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        assert!(!editor.is_dirty());

        let index = editor.add_disk(DiskType::Raw, Some(PathBuf::from("/vms/data"))).unwrap();

        let slot = &editor.disks()[index];
        assert_eq!(slot.entry().path, Some(PathBuf::from("/vms/data.img")));
        assert_eq!(slot.entry().capacity_mb, "10240");
        assert!(!slot.is_locked());
        assert_eq!(editor.set_disk_capacity(index, "1"), Ok("1"));
        assert_eq!(editor.set_disk_type(index, DiskType::Vmdk), Ok(()));
        assert!(editor.is_dirty());
    }

    #[tokio::test]
    async fn disk_text_that_would_split_the_list_is_rejected() {
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;

        assert_eq!(
            editor.add_disk(DiskType::Qcow2, Some(PathBuf::from("/vms/a;b.qcow2"))),
            Err(EditorError::UnstorablePath(PathBuf::from("/vms/a;b.qcow2")))
        );
        assert_eq!(
            editor
                .import_disk(DiskType::Raw, PathBuf::from("/vms/x;RAW:/etc/hostname"), &provisioner)
                .await,
            Err(EditorError::UnstorablePath(PathBuf::from(
                "/vms/x;RAW:/etc/hostname"
            )))
        );
        assert!(editor.disks().is_empty());

        let index = editor
            .add_disk(DiskType::Raw, Some(PathBuf::from("/vms/new.img")))
            .unwrap();
        for value in ["1;RAW:/etc/hostname:1", "", "-5", "big"] {
            assert_eq!(
                editor.set_disk_capacity(index, value),
                Err(EditorError::InvalidCapacity(value.to_string()))
            );
        }
        assert_eq!(editor.disks()[index].entry().capacity_mb, "10240");
        assert_eq!(
            codec::deserialize(&codec::serialize(&editor.descriptor()))
                .descriptor
                .disks,
            editor.descriptor().disks
        );
    }

    #[tokio::test]
    async fn missing_images_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let editor = editor_with_existing_disk(dir.path(), "20480").await;
        assert!(!editor.has_missing_images());

        std::fs::remove_file(dir.path().join("root.qcow2")).unwrap();
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let reopened =
            DescriptorEditor::open(Some("vm".to_string()), parsed(editor.descriptor()), &provisioner)
                .await;
        assert!(!reopened.is_dirty());
        assert!(reopened.has_missing_images());
    }

    #[tokio::test]
    async fn import_probed_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imported.vmdk");
        create_sparse_file(&path, 1);
        let mut image_tool = MockImageTool::new();
        image_tool
            .expect_info()
            .returning(|_| Ok(create_example_image_info(3072)));
        let provisioner = DiskProvisioner::new(image_tool);
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;

        let index = editor
            .import_disk(DiskType::Vmdk, path.clone(), &provisioner)
            .await
            .unwrap();

        let slot = &editor.disks()[index];
        assert_eq!(slot.entry().capacity_mb, "3072");
        assert_eq!(slot.floor_mb(), 3072);
        assert!(slot.is_locked());
    }

    #[tokio::test]
    async fn import_unreadable_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imported.qcow2");
        create_sparse_file(&path, 1);
        let mut image_tool = MockImageTool::new();
        image_tool
            .expect_info()
            .returning(|_| Err(ImageToolError::InvalidOutput("garbage".to_string())));
        let provisioner = DiskProvisioner::new(image_tool);
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;

        let index = editor
            .import_disk(DiskType::Qcow2, path, &provisioner)
            .await
            .unwrap();

        let slot = &editor.disks()[index];
        assert_eq!(slot.entry().capacity_mb, "10240");
        assert_eq!(slot.floor_mb(), 0);
        assert!(slot.is_locked());
        assert_eq!(editor.set_disk_capacity(index, "100"), Ok("100"));
    }

    #[tokio::test]
    async fn disk_index_out_of_range() {
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        assert_eq!(
            editor.set_disk_capacity(3, "10"),
            Err(EditorError::NoSuchDisk(3))
        );
        assert_eq!(editor.remove_disk(0), Err(EditorError::NoSuchDisk(0)));
    }

    #[tokio::test]
    async fn remove_disk_returns_entry() {
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        editor.add_disk(DiskType::Qcow2, Some(PathBuf::from("/vms/a.qcow2"))).unwrap();
        editor.add_disk(DiskType::Raw, Some(PathBuf::from("/vms/b.img"))).unwrap();

        let removed = editor.remove_disk(0).unwrap();

        assert_eq!(removed.path, Some(PathBuf::from("/vms/a.qcow2")));
        assert_eq!(editor.disks().len(), 1);
        assert_eq!(
            editor.descriptor().disks[0].path,
            Some(PathBuf::from("/vms/b.img"))
        );
    }

    #[tokio::test]
    async fn commit_normalizes_accelerator() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;

        editor.set_accelerator(true, None);
        let report = editor.commit(&store, &provisioner, false).await.unwrap();
        assert_eq!(report.descriptor.cpu.accelerator, Some(Accelerator::Tcg));

        editor.set_accelerator(false, Some(Accelerator::Kvm));
        let report = editor.commit(&store, &provisioner, false).await.unwrap();
        assert_eq!(report.descriptor.cpu.accel_enabled, Some(false));
        assert_eq!(report.descriptor.cpu.accelerator, None);
    }

    #[tokio::test]
    async fn commit_creates_missing_disks_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let provisioner = DiskProvisioner::new(creating_image_tool());
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        let disk_path = dir.path().join("vm-root");
        editor.add_disk(DiskType::Qcow2, Some(disk_path.clone())).unwrap();
        editor.set_ram(2, RamUnit::Gb);

        let report = editor.commit(&store, &provisioner, false).await.unwrap();

        let disk_path = disk_path.with_extension("qcow2");
        assert_eq!(report.created, vec![disk_path.clone()]);
        assert!(disk_path.exists());
        assert!(editor.disks()[0].is_locked());
        assert!(!editor.is_dirty());
        assert_eq!(editor.original_name(), Some("vm"));
        let saved = std::fs::read_to_string(dir.path().join("vm.conf")).unwrap();
        assert_eq!(codec::deserialize(&saved).descriptor, report.descriptor);
        assert_eq!(report.descriptor.ram.as_deref(), Some("2GB"));
    }

    #[tokio::test]
    async fn commit_rejects_empty_name_without_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut image_tool = MockImageTool::new();
        image_tool.expect_create().never();
        let provisioner = DiskProvisioner::new(image_tool);
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        editor.add_disk(DiskType::Raw, Some(dir.path().join("data.img"))).unwrap();
        editor.descriptor_mut().name.clear();

        let result = editor.commit(&store, &provisioner, false).await;

        assert_eq!(result, Err(EditorError::Store(DescriptorStoreError::EmptyName)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn commit_renames_existing_vm() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save(&VmDescriptor::new("old")).await.unwrap();
        let provisioner = DiskProvisioner::new(MockImageTool::new());
        let loaded = store.load("old").await.unwrap();
        let mut editor =
            DescriptorEditor::open(Some("old".to_string()), loaded, &provisioner).await;
        *editor.descriptor_mut().name = "new".to_string();

        editor.commit(&store, &provisioner, false).await.unwrap();

        assert!(!dir.path().join("old.conf").exists());
        assert!(dir.path().join("new.conf").exists());
        assert_eq!(editor.original_name(), Some("new"));
    }

    #[tokio::test]
    async fn commit_stops_on_rename_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save(&VmDescriptor::new("old")).await.unwrap();
        store.save(&VmDescriptor::new("taken")).await.unwrap();
        let mut image_tool = MockImageTool::new();
        image_tool.expect_create().never();
        let provisioner = DiskProvisioner::new(image_tool);
        let loaded = store.load("old").await.unwrap();
        let mut editor =
            DescriptorEditor::open(Some("old".to_string()), loaded, &provisioner).await;
        *editor.descriptor_mut().name = "taken".to_string();
        editor.add_disk(DiskType::Raw, Some(dir.path().join("data.img"))).unwrap();

        let result = editor.commit(&store, &provisioner, false).await;

        assert!(matches!(
            result,
            Err(EditorError::Store(DescriptorStoreError::RenameConflict { .. }))
        ));
        assert!(dir.path().join("old.conf").exists());
        assert!(!dir.path().join("data.img").exists());
        assert_eq!(editor.original_name(), Some("old"));
    }

    #[tokio::test]
    async fn commit_stops_when_disk_creation_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut image_tool = MockImageTool::new();
        image_tool.expect_create().returning(|_| {
            Err(ImageToolError::CommandFailed {
                status: "exit status: 1".to_string(),
                stderr: "No space left on device".to_string(),
            })
        });
        let provisioner = DiskProvisioner::new(image_tool);
        let mut editor =
            DescriptorEditor::open(None, parsed(VmDescriptor::new("vm")), &provisioner).await;
        editor.add_disk(DiskType::Raw, Some(dir.path().join("data.img"))).unwrap();

        let result = editor.commit(&store, &provisioner, false).await;

        assert!(matches!(
            result,
            Err(EditorError::Provisioner(ProvisionerError::CreateFailed { .. }))
        ));
        assert!(!dir.path().join("vm.conf").exists());
    }
}
