use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unresolved placeholder `:{placeholder}` in `{tool}` arguments")]
    UnresolvedPlaceholder { tool: String, placeholder: String },
    #[error("Failed to spawn `{tool}`: `{source}`")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },
    #[error("IO error while running `{tool}`: `{source}`")]
    Io {
        tool: String,
        source: std::io::Error,
    },
    #[error("`{tool}` failed with exit code {exit_code:?}: {stderr}")]
    Failed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("Unexpected output of `{tool}`: {reason}")]
    UnexpectedOutput { tool: String, reason: String },
}
