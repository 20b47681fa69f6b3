//! Persistence of produced archives.
//!
//! Adapters only see opaque files; they never look inside an archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared_types::DumpName;
use tempfile::TempPath;

use self::error::StorageError;
use self::local::{LocalStorage, RemoteAccess};
use self::s3::S3Storage;
use crate::config::core_config::{StorageConfig, StorageType};
use crate::provider::command::direct::DirectProcessRunner;

pub mod error;
pub mod local;
pub mod s3;


#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait DumpStorage: Send + Sync {
    async fn save(
        &self,
        file: &Path,
        filename: &str,
        dump_name: &DumpName,
    ) -> Result<(), StorageError>;

    /// Resolves the most recent artifact stored for `dump_name`.
    async fn retrieve(&self, dump_name: &DumpName) -> Result<RetrievedDump, StorageError>;
}

/// Location of a retrieved artifact. Downloaded copies are removed when
/// this is dropped.
#[derive(Debug)]
pub struct RetrievedDump {
    path: PathBuf,
    _download: Option<TempPath>,
    pub filename: String,
}

impl RetrievedDump {
    pub fn new(path: PathBuf, filename: String) -> Self {
        Self {
            path,
            _download: None,
            filename,
        }
    }

    pub fn downloaded(file: TempPath, filename: String) -> Self {
        Self {
            path: file.to_path_buf(),
            _download: Some(file),
            filename,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn storage_from_config(config: &StorageConfig) -> Result<Arc<dyn DumpStorage>, StorageError> {
    Ok(match config.r#type {
        StorageType::Local => {
            let store_dir = config.local_store_dir.to_owned().ok_or_else(|| {
                StorageError::Config("`localStoreDir` is required for LOCAL storage".to_owned())
            })?;

            let storage = LocalStorage::new(store_dir, config.keep_amount);
            match &config.remote_access {
                Some(remote) => Arc::new(storage.with_remote_access(
                    RemoteAccess::from_config(remote),
                    Arc::new(DirectProcessRunner),
                )),
                None => Arc::new(storage),
            }
        }
        StorageType::S3 => {
            let bucket = config.s3.as_ref().ok_or_else(|| {
                StorageError::Config("`s3` section is required for S3 storage".to_owned())
            })?;

            Arc::new(S3Storage::from_config(bucket, config.keep_amount)?)
        }
    })
}
