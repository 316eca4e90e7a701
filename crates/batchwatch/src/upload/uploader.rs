//! The dependent upload performed once the server finished a file.

use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::blob_store::StoredFile;
use crate::error::UploadError;

/// Uploads one processed file to the durable repository.
///
/// Any `Fn(StoredFile) -> impl Future<Output = Result<(), UploadError>>`
/// closure is an uploader.
#[async_trait]
pub trait DocumentUploader: Send + Sync {
    async fn upload(&self, file: StoredFile) -> Result<(), UploadError>;
}

#[async_trait]
impl<F, Fut> DocumentUploader for F
where
    F: Fn(StoredFile) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UploadError>> + Send + 'static,
{
    async fn upload(&self, file: StoredFile) -> Result<(), UploadError> {
        (self)(file).await
    }
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Uploader writing each file into a repository directory.
///
/// Existing files are never overwritten; a numbered variant
/// (`report_2.pdf`, `report_3.pdf`, ...) is used instead.
pub struct DirectoryUploader {
    target: PathBuf,
}

impl DirectoryUploader {
    pub fn new<P: AsRef<Path>>(target: P) -> Self {
        Self {
            target: target.as_ref().to_path_buf(),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    async fn write_unique(&self, file_name: &str, content: &[u8]) -> Result<PathBuf, UploadError> {
        let (base, ext) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => (&file_name[..dot], Some(&file_name[dot..])),
            _ => (file_name, None),
        };

        for counter in 1..=MAX_NAME_ATTEMPTS {
            let candidate = if counter == 1 {
                file_name.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };
            let path = self.target.join(&candidate);

            // create_new is an atomic check-and-create
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut out) => {
                    out.write_all(content).await.map_err(|e| UploadError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    out.flush().await.map_err(|e| UploadError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(UploadError::Io { path, source: e }),
            }
        }

        Err(UploadError::Rejected(format!(
            "no free name for '{}' in {}",
            file_name,
            self.target.display()
        )))
    }
}

/// Final path component of `name`, so names carrying directories stay
/// inside the repository.
fn repository_file_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("document")
}

#[async_trait]
impl DocumentUploader for DirectoryUploader {
    async fn upload(&self, file: StoredFile) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.target)
            .await
            .map_err(|e| UploadError::Io {
                path: self.target.clone(),
                source: e,
            })?;

        let path = self
            .write_unique(repository_file_name(&file.name), &file.bytes)
            .await?;
        log::info!("Uploaded '{}' to {}", file.name, path.display());
        Ok(())
    }
}
