use shared_types::DumpName;
use thiserror::Error;

use crate::provider::command::error::CommandError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No stored dump found for `{0}`")]
    NotFound(DumpName),
    #[error("Storage configuration error: `{0}`")]
    Config(String),
    #[error("Storage IO error while {context}: `{source}`")]
    Io {
        context: String,
        source: std::io::Error,
    },
    #[error("Remote storage command error: `{0}`")]
    Command(#[from] CommandError),
    #[error("Object store error: `{0}`")]
    ObjectStore(#[from] object_store::Error),
}

pub(super) fn io_error(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> StorageError {
    move |source| StorageError::Io {
        context: context.into(),
        source,
    }
}
