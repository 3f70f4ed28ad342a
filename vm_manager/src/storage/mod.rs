use std::path::{Path, PathBuf};

use crate::managers::vm_descriptor::DiskType;

pub mod codec;
pub mod descriptor_store;
pub mod disk_provisioner;

pub const DESCRIPTOR_EXTENSION: &str = "conf";

/// Appends the disk type's default extension when `path` has none.
pub fn with_default_extension(path: &Path, disk_type: &DiskType) -> PathBuf {
    match (path.extension(), disk_type.default_extension()) {
        (None, Some(extension)) => path.with_extension(extension),
        _ => path.to_path_buf(),
    }
}
