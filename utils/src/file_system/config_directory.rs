use std::{
    io,
    path::{Path, PathBuf},
};

use log::debug;

pub struct ConfigDirectory {
    root_dir: PathBuf,
}

impl ConfigDirectory {
    /// Opens `path`, creating it (and missing parents) first if needed.
    pub async fn new(path: PathBuf) -> Result<Self, io::Error> {
        if tokio::fs::read_dir(&path).await.is_err() {
            debug!("Creating configuration directory: {}", path.display());
            tokio::fs::create_dir_all(&path).await?;
        }
        Ok(Self { root_dir: path })
    }

    /// Wraps a directory owned by someone else without touching the filesystem.
    pub fn existing(path: PathBuf) -> Self {
        Self { root_dir: path }
    }

    pub fn path(&self) -> &Path {
        &self.root_dir
    }

    pub fn file_path(&self, stem: &str, extension: &str) -> PathBuf {
        self.root_dir.join(format!("{}.{}", stem, extension))
    }

    pub async fn read_files_with_extension(
        &self,
        extension: &str,
    ) -> Result<Vec<PathBuf>, io::Error> {
        let mut files = vec![];
        let mut read_dir = tokio::fs::read_dir(&self.root_dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
                continue;
            }
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_file() {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }
}
