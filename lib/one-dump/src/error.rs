use shared_types::DumpName;
use thiserror::Error;

use crate::config::ConfigParsingError;
use crate::model::definition::DefinitionError;
use crate::provider::command::error::CommandError;
use crate::provider::storage::error::StorageError;
use crate::util::archive::ArchiveError;

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("Dump `{0}` does not exist")]
    DumpDoesNotExist(DumpName),
    #[error("No storage defined")]
    NoStorageDefined,

    #[error("Definition error: `{0}`")]
    Definition(#[from] DefinitionError),
    #[error("Command error: `{0}`")]
    Command(#[from] CommandError),
    #[error("Archive error: `{0}`")]
    Archive(#[from] ArchiveError),
    #[error("Storage error: `{0}`")]
    Storage(#[from] StorageError),
    #[error("Config error: `{0}`")]
    Config(#[from] ConfigParsingError),

    #[error("Restore hook failed: `{0}`")]
    Hook(anyhow::Error),
    #[error("IO error while {context}: `{source}`")]
    Io {
        context: &'static str,
        source: std::io::Error,
    },
}

impl DumpError {
    pub(crate) fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Self::Io { context, source }
    }
}
