use std::path::Path;
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use rand::distributions::{Alphanumeric, DistString};
use secrecy::ExposeSecret;
use shared_types::DumpName;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::error::{StorageError, io_error};
use super::{DumpStorage, RetrievedDump};
use crate::config::core_config::S3StorageConfig;

/// Length of the random key prefix that keeps stored names unguessable.
const KEY_PREFIX_LENGTH: usize = 40;

/// Keeps archives under `<store_dir>/<dump name>/<random>-<filename>` in an
/// object store, pruning all but the `keep_amount` most recent objects.
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    store_dir: ObjectPath,
    keep_amount: usize,
}

impl S3Storage {
    pub fn new(store: Arc<dyn ObjectStore>, store_dir: &str, keep_amount: usize) -> Self {
        Self {
            store,
            store_dir: ObjectPath::from(store_dir),
            keep_amount,
        }
    }

    pub fn from_config(config: &S3StorageConfig, keep_amount: usize) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key.expose_secret());
        }

        Ok(Self::new(
            Arc::new(builder.build()?),
            &config.store_dir,
            keep_amount,
        ))
    }

    fn dump_prefix(&self, dump_name: &DumpName) -> ObjectPath {
        self.store_dir.child(dump_name.as_str())
    }

    /// Stored objects, most recent first.
    async fn stored_objects(&self, dump_name: &DumpName) -> Result<Vec<ObjectMeta>, StorageError> {
        let prefix = self.dump_prefix(dump_name);
        let mut objects: Vec<ObjectMeta> = self.store.list(Some(&prefix)).try_collect().await?;

        objects.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| b.location.cmp(&a.location))
        });

        Ok(objects)
    }
}

#[async_trait::async_trait]
impl DumpStorage for S3Storage {
    async fn save(
        &self,
        file: &Path,
        filename: &str,
        dump_name: &DumpName,
    ) -> Result<(), StorageError> {
        let content = tokio::fs::read(file)
            .await
            .map_err(io_error(format!("reading {}", file.display())))?;

        let random = Alphanumeric.sample_string(&mut rand::thread_rng(), KEY_PREFIX_LENGTH);
        let key = self.dump_prefix(dump_name).child(format!("{random}-{filename}"));
        self.store.put(&key, content.into()).await?;

        for stale in self
            .stored_objects(dump_name)
            .await?
            .into_iter()
            .skip(self.keep_amount.max(1))
        {
            tracing::debug!("Pruning old dump `{}`", stale.location);
            self.store.delete(&stale.location).await?;
        }

        Ok(())
    }

    async fn retrieve(&self, dump_name: &DumpName) -> Result<RetrievedDump, StorageError> {
        let latest = self
            .stored_objects(dump_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(dump_name.to_owned()))?;

        let filename = latest
            .location
            .filename()
            .map(|name| name.split_once('-').map_or(name, |(_, filename)| filename))
            .unwrap_or_default()
            .to_owned();

        let download = NamedTempFile::new()
            .map_err(io_error("creating download file"))?
            .into_temp_path();
        let mut file = tokio::fs::File::create(&download)
            .await
            .map_err(io_error("opening download file"))?;

        let mut chunks = self.store.get(&latest.location).await?.into_stream();
        while let Some(chunk) = chunks.try_next().await? {
            file.write_all(&chunk)
                .await
                .map_err(io_error("writing download file"))?;
        }
        file.flush()
            .await
            .map_err(io_error("writing download file"))?;

        Ok(RetrievedDump::downloaded(download, filename))
    }
}
