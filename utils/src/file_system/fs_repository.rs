use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::warn;
use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};

#[derive(Debug, Error)]
pub enum FileRepositoryError {
    #[error("Failed to create file: {0}")]
    CreationFail(#[source] std::io::Error),
    #[error("Failed to save file: {0}")]
    SaveFail(String),
    #[error("Failed to read file: {0}")]
    ReadFail(String),
    #[error("Destination already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("Failed to move file: {0}")]
    MoveFail(#[source] std::io::Error),
    #[error("Failed to remove file: {0}")]
    RemoveFail(#[source] std::io::Error),
}

/// Whole-file text storage. Every save replaces the previous content.
pub struct FileRepository {
    path: PathBuf,
}

impl FileRepository {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool, FileRepositoryError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|err| FileRepositoryError::ReadFail(err.to_string()))
    }

    /// Returns `None` when the file does not exist. Bytes that aren't valid
    /// UTF-8 are replaced with U+FFFD instead of failing the read.
    pub async fn read(&self) -> Result<Option<String>, FileRepositoryError> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(FileRepositoryError::ReadFail(err.to_string())),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|err| FileRepositoryError::ReadFail(err.to_string()))?;
        let text = match String::from_utf8(buf) {
            Ok(text) => text,
            Err(err) => {
                warn!("{} is not valid UTF-8, decoding lossily", self.path.display());
                String::from_utf8_lossy(err.as_bytes()).into_owned()
            }
        };
        Ok(Some(text))
    }

    pub async fn save(&self, contents: &str) -> Result<(), FileRepositoryError> {
        let mut file = File::create(&self.path)
            .await
            .map_err(FileRepositoryError::CreationFail)?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|err| FileRepositoryError::SaveFail(err.to_string()))?;
        file.flush()
            .await
            .map_err(|err| FileRepositoryError::SaveFail(err.to_string()))?;
        Ok(())
    }

    /// Moves the file to `destination`, refusing to replace an existing file.
    pub async fn move_to(self, destination: &Path) -> Result<Self, FileRepositoryError> {
        let destination_taken = tokio::fs::try_exists(destination)
            .await
            .map_err(FileRepositoryError::MoveFail)?;
        if destination_taken {
            return Err(FileRepositoryError::AlreadyExists(
                destination.to_path_buf(),
            ));
        }
        tokio::fs::rename(&self.path, destination)
            .await
            .map_err(FileRepositoryError::MoveFail)?;
        Ok(Self::new(destination))
    }

    pub async fn remove(self) -> Result<(), FileRepositoryError> {
        tokio::fs::remove_file(&self.path)
            .await
            .map_err(FileRepositoryError::RemoveFail)
    }
}
