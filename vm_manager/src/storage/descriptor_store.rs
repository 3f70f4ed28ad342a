use std::path::Path;

use log::{debug, info, warn};
use thiserror::Error;
use utils::file_system::{
    config_directory::ConfigDirectory,
    fs_repository::{FileRepository, FileRepositoryError},
};

use super::codec::{self, ParsedDescriptor};
use super::DESCRIPTOR_EXTENSION;
use crate::managers::vm_descriptor::VmDescriptor;

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum DescriptorStoreError {
    #[error("VM name can't be empty")]
    EmptyName,
    #[error("VM name '{0}' can't contain path separators or line breaks")]
    InvalidName(String),
    #[error("Can't rename '{from}' to '{to}': {reason}")]
    RenameConflict {
        from: String,
        to: String,
        reason: String,
    },
    #[error("Failed to read descriptor: {0}")]
    Read(String),
    #[error("Failed to write descriptor: {0}")]
    Write(String),
    #[error("Failed to delete descriptor: {0}")]
    Delete(String),
}

const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '\n', '\r'];

pub fn validate_name(name: &str) -> Result<(), DescriptorStoreError> {
    if name.is_empty() {
        return Err(DescriptorStoreError::EmptyName);
    }
    if name.contains(FORBIDDEN_NAME_CHARS) {
        return Err(DescriptorStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// One `<name>.conf` file per VM inside a configuration directory.
pub struct DescriptorStore {
    directory: ConfigDirectory,
}

impl DescriptorStore {
    pub fn new(directory: ConfigDirectory) -> Self {
        Self { directory }
    }

    /// Every readable descriptor, sorted by name. Broken files are skipped.
    pub async fn list(&self) -> Result<Vec<VmDescriptor>, DescriptorStoreError> {
        let files = self
            .directory
            .read_files_with_extension(DESCRIPTOR_EXTENSION)
            .await
            .map_err(|err| DescriptorStoreError::Read(err.to_string()))?;

        let mut descriptors = vec![];
        for file in files {
            let text = match FileRepository::new(&file).read().await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(err) => {
                    warn!("Skipping descriptor {}: {}", file.display(), err);
                    continue;
                }
            };
            let parsed = codec::deserialize(&text);
            if !parsed.has_name() {
                warn!("Skipping descriptor {}: no name", file.display());
                continue;
            }
            log_ignored_lines(&file, &parsed);
            descriptors.push(parsed.descriptor);
        }
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(descriptors)
    }

    /// Reads `<name>.conf`. A missing file gives an empty descriptor named `name`.
    pub async fn load(&self, name: &str) -> Result<ParsedDescriptor, DescriptorStoreError> {
        let repository = self.repository(name);
        let text = repository
            .read()
            .await
            .map_err(|err| DescriptorStoreError::Read(err.to_string()))?;
        let mut parsed = match text {
            Some(text) => codec::deserialize(&text),
            None => {
                debug!("No descriptor for '{}', starting empty", name);
                ParsedDescriptor::default()
            }
        };
        log_ignored_lines(repository.path(), &parsed);
        parsed.descriptor.name = name.to_string();
        Ok(parsed)
    }

    pub async fn exists(&self, name: &str) -> Result<bool, DescriptorStoreError> {
        self.repository(name)
            .exists()
            .await
            .map_err(|err| DescriptorStoreError::Read(err.to_string()))
    }

    pub async fn save(&self, descriptor: &VmDescriptor) -> Result<(), DescriptorStoreError> {
        validate_name(&descriptor.name)?;
        let repository = self.repository(&descriptor.name);
        repository
            .save(&codec::serialize(descriptor))
            .await
            .map_err(|err| DescriptorStoreError::Write(err.to_string()))?;
        info!("Saved descriptor {}", repository.path().display());
        Ok(())
    }

    /// Moves `<old>.conf` to `<new>.conf`. Does nothing unless `old` is set and differs.
    pub async fn rename(&self, old: &str, new: &str) -> Result<(), DescriptorStoreError> {
        if old.is_empty() || old == new {
            return Ok(());
        }
        validate_name(new)?;
        let conflict = |reason: String| DescriptorStoreError::RenameConflict {
            from: old.to_string(),
            to: new.to_string(),
            reason,
        };
        let destination = self.directory.file_path(new, DESCRIPTOR_EXTENSION);
        self.repository(old)
            .move_to(&destination)
            .await
            .map_err(|err| match err {
                FileRepositoryError::AlreadyExists(_) => {
                    conflict(format!("a VM named '{}' already exists", new))
                }
                err => conflict(err.to_string()),
            })?;
        info!("Renamed descriptor '{}' to '{}'", old, new);
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), DescriptorStoreError> {
        validate_name(name)?;
        self.repository(name)
            .remove()
            .await
            .map_err(|err| DescriptorStoreError::Delete(err.to_string()))?;
        info!("Deleted descriptor '{}'", name);
        Ok(())
    }

    fn repository(&self, name: &str) -> FileRepository {
        FileRepository::new(&self.directory.file_path(name, DESCRIPTOR_EXTENSION))
    }
}

fn log_ignored_lines(file: &Path, parsed: &ParsedDescriptor) {
    for line in &parsed.ignored {
        debug!(
            "{}:{}: ignored ({:?}): {}",
            file.display(),
            line.number,
            line.reason,
            line.content
        );
    }
}
