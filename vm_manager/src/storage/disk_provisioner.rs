use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::managers::vm_descriptor::{DiskEntry, DiskType, ImageFormat};
use crate::virtualization::image_tool::{CreateImageRequest, ImageTool, Preallocation};

pub const MIB: u64 = 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ProvisionerError {
    #[error("Failed to create disk image {}: {reason}", .path.display())]
    CreateFailed { path: PathBuf, reason: String },
    #[error("Failed to remove disk image {}: {reason}", .path.display())]
    RemoveFailed { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Created without the requested preallocation.
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedDisk {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created: Vec<PathBuf>,
    pub degraded: Vec<DegradedDisk>,
}

/// Replaces a missing, malformed or non-positive capacity with the default.
pub fn coerce_capacity_mb(capacity: &str) -> u64 {
    match capacity.trim().parse::<i64>() {
        Ok(value) if value >= 1 => value as u64,
        _ => DiskEntry::DEFAULT_CAPACITY_MB,
    }
}

/// Raises a numeric `value` below `floor` up to `floor`. Text that isn't a
/// number is returned as entered, and a zero floor disables the check.
pub fn clamp_to_floor(value: &str, floor: u64) -> String {
    if floor == 0 {
        return value.to_string();
    }
    match value.trim().parse::<i64>() {
        Ok(parsed) if parsed < floor as i64 => floor.to_string(),
        _ => value.to_string(),
    }
}

pub struct DiskProvisioner<T: ImageTool> {
    image_tool: T,
}

impl<T: ImageTool + Send + Sync> DiskProvisioner<T> {
    pub fn new(image_tool: T) -> Self {
        Self { image_tool }
    }

    pub fn image_tool(&self) -> &T {
        &self.image_tool
    }

    /// Current size of the image in MB, or 0 when it's missing or can't be read.
    pub async fn probe_size(&self, path: &Path, disk_type: &DiskType) -> u64 {
        if !file_exists(path).await {
            return 0;
        }
        match disk_type {
            DiskType::Raw => match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata.len() / MIB,
                Err(err) => {
                    debug!("Can't stat {}: {}", path.display(), err);
                    0
                }
            },
            DiskType::Qcow2 | DiskType::Vhd | DiskType::Vmdk => {
                match self.image_tool.info(path).await {
                    Ok(info) => info.virtual_size / MIB,
                    Err(err) => {
                        debug!("Can't probe {}: {}", path.display(), err);
                        0
                    }
                }
            }
            DiskType::Other(_) => 0,
        }
    }

    pub async fn create(
        &self,
        path: &Path,
        disk_type: &DiskType,
        capacity: &str,
        preallocate_full: bool,
    ) -> Result<CreateOutcome, ProvisionerError> {
        let format = disk_type.image_format();
        let mut request = CreateImageRequest {
            path: path.to_path_buf(),
            format,
            size_mb: coerce_capacity_mb(capacity),
            preallocation: Preallocation::Off,
        };

        if preallocate_full && format == ImageFormat::Qcow2 {
            request.preallocation = Preallocation::Full;
            match self.image_tool.create(&request).await {
                Ok(()) => {
                    info!(
                        "Created preallocated disk image {} ({}M)",
                        path.display(),
                        request.size_mb
                    );
                    return Ok(CreateOutcome::Created);
                }
                Err(err) => {
                    warn!(
                        "Preallocated creation of {} failed, retrying without preallocation: {}",
                        path.display(),
                        err
                    );
                    request.preallocation = Preallocation::Off;
                    self.create_plain(&request).await?;
                    return Ok(CreateOutcome::Degraded {
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.create_plain(&request).await?;
        Ok(CreateOutcome::Created)
    }

    /// Creates every disk that has a path but no file. Stops at the first
    /// failure; images created before it are kept.
    pub async fn provision_missing(
        &self,
        disks: &[DiskEntry],
        preallocate_full: bool,
    ) -> Result<ProvisionReport, ProvisionerError> {
        let mut report = ProvisionReport::default();
        for disk in disks {
            let Some(path) = disk.path.as_deref() else {
                continue;
            };
            if file_exists(path).await {
                continue;
            }
            let outcome = self
                .create(path, &disk.disk_type, &disk.capacity_mb, preallocate_full)
                .await?;
            if let CreateOutcome::Degraded { reason } = outcome {
                report.degraded.push(DegradedDisk {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            report.created.push(path.to_path_buf());
        }
        Ok(report)
    }

    pub async fn remove_image(&self, path: &Path) -> Result<(), ProvisionerError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("Removed disk image {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("Disk image {} is already gone", path.display());
                Ok(())
            }
            Err(err) => Err(ProvisionerError::RemoveFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }),
        }
    }

    async fn create_plain(&self, request: &CreateImageRequest) -> Result<(), ProvisionerError> {
        self.image_tool
            .create(request)
            .await
            .map_err(|err| ProvisionerError::CreateFailed {
                path: request.path.clone(),
                reason: err.to_string(),
            })?;
        info!(
            "Created disk image {} ({}M)",
            request.path.display(),
            request.size_mb
        );
        Ok(())
    }
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
