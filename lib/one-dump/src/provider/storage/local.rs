use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use shared_types::DumpName;
use tempfile::NamedTempFile;

use super::error::{StorageError, io_error};
use super::{DumpStorage, RetrievedDump};
use crate::config::core_config::RemoteAccessConfig;
use crate::provider::command::{CommandLine, CommandParams, ProcessRunner};

const LIST_TOOL: &str = "ssh";
const COPY_TOOL: &str = "scp";

/// Host keeping the store directory when dumps are retrieved remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAccess {
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
}

impl RemoteAccess {
    pub fn from_config(config: &RemoteAccessConfig) -> Self {
        Self {
            host: config.host.to_owned(),
            user: config.user.to_owned(),
            port: config.port,
        }
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.to_owned(),
        }
    }
}

/// Keeps archives in `<store_dir>/<dump name>/<filename>`, pruning all but
/// the `keep_amount` most recent ones after every save.
///
/// With remote access, saving still writes to the local directory while
/// retrieving lists and copies the newest archive from the remote host.
pub struct LocalStorage {
    store_dir: PathBuf,
    keep_amount: usize,
    remote: Option<(RemoteAccess, Arc<dyn ProcessRunner>)>,
}

impl LocalStorage {
    pub fn new(store_dir: PathBuf, keep_amount: usize) -> Self {
        Self {
            store_dir,
            keep_amount,
            remote: None,
        }
    }

    pub fn with_remote_access(mut self, remote: RemoteAccess, runner: Arc<dyn ProcessRunner>) -> Self {
        self.remote = Some((remote, runner));
        self
    }

    fn dump_dir(&self, dump_name: &DumpName) -> PathBuf {
        self.store_dir.join(dump_name.as_str())
    }

    /// Stored files, most recent first.
    async fn stored_files(dir: &Path) -> Result<Vec<(PathBuf, String)>, StorageError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(io_error(format!("listing {}", dir.display())))?;

        let mut files: Vec<(SystemTime, String, PathBuf)> = vec![];
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(io_error(format!("listing {}", dir.display())))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(io_error(format!("reading {}", entry.path().display())))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map_err(io_error(format!("reading {}", entry.path().display())))?;

            files.push((
                modified,
                entry.file_name().to_string_lossy().into_owned(),
                entry.path(),
            ));
        }

        files.sort_by(|a, b| (b.0, &b.1).cmp(&(a.0, &a.1)));

        Ok(files
            .into_iter()
            .map(|(_, filename, path)| (path, filename))
            .collect())
    }
}

#[async_trait::async_trait]
impl DumpStorage for LocalStorage {
    async fn save(
        &self,
        file: &Path,
        filename: &str,
        dump_name: &DumpName,
    ) -> Result<(), StorageError> {
        let dir = self.dump_dir(dump_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(io_error(format!("creating {}", dir.display())))?;

        let target = dir.join(filename);
        tokio::fs::copy(file, &target)
            .await
            .map_err(io_error(format!("copying to {}", target.display())))?;

        for (path, _) in Self::stored_files(&dir)
            .await?
            .into_iter()
            .skip(self.keep_amount.max(1))
        {
            tracing::debug!("Pruning old dump `{}`", path.display());
            tokio::fs::remove_file(&path)
                .await
                .map_err(io_error(format!("removing {}", path.display())))?;
        }

        Ok(())
    }

    async fn retrieve(&self, dump_name: &DumpName) -> Result<RetrievedDump, StorageError> {
        if let Some((remote, runner)) = &self.remote {
            return self.retrieve_remote(remote, runner.as_ref(), dump_name).await;
        }

        let dir = self.dump_dir(dump_name);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::NotFound(dump_name.to_owned()));
        }

        let (path, filename) = Self::stored_files(&dir)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::NotFound(dump_name.to_owned()))?;

        Ok(RetrievedDump::new(path, filename))
    }
}

impl LocalStorage {
    async fn retrieve_remote(
        &self,
        remote: &RemoteAccess,
        runner: &dyn ProcessRunner,
        dump_name: &DumpName,
    ) -> Result<RetrievedDump, StorageError> {
        let dir = self.dump_dir(dump_name);
        let params = CommandParams::default()
            .with("port", remote.port.to_string())
            .with("destination", remote.destination())
            .with("dir", dir.to_string_lossy());

        let listing = CommandLine::new(LIST_TOOL, "-p :port :destination ls -1t :dir")
            .build(&params)?;
        let output = runner.run(listing).await?;

        let prefix = format!("{dump_name}-");
        let filename = output
            .lines()
            .map(str::trim)
            .find(|name| name.starts_with(&prefix) && !name.contains('/'))
            .ok_or_else(|| StorageError::NotFound(dump_name.to_owned()))?
            .to_owned();

        let download = NamedTempFile::new()
            .map_err(io_error("creating download file"))?
            .into_temp_path();

        tracing::debug!("Copying `{filename}` from {}", remote.host);
        let copy = CommandLine::new(COPY_TOOL, "-P :port :source :target").build(
            &params
                .with(
                    "source",
                    format!("{}:{}", remote.destination(), dir.join(&filename).display()),
                )
                .with("target", download.to_string_lossy()),
        )?;
        runner.run(copy).await?;

        Ok(RetrievedDump::downloaded(download, filename))
    }
}
