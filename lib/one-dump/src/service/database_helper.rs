use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::provider::command::error::CommandError;
use crate::provider::command::{CommandLine, CommandParams, ProcessRunner};
use crate::provider::connection::{CONNECTION_ARGS, ConnectionResolver};

pub const QUERY_TOOL: &str = "psql";
pub const RESTORE_TOOL: &str = "pg_restore";

const TERMINATE_CONNECTIONS: &str = "SELECT pid, pg_terminate_backend(pid) AS terminated FROM pg_stat_activity WHERE pid <> pg_backend_pid();";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
}

/// Maintenance operations against the target database.
pub struct DatabaseHelper {
    runner: Arc<dyn ProcessRunner>,
    connection: Arc<ConnectionResolver>,
}

impl DatabaseHelper {
    pub fn new(runner: Arc<dyn ProcessRunner>, connection: Arc<ConnectionResolver>) -> Self {
        Self { runner, connection }
    }

    /// Best effort: terminates every other backend connected to the server.
    /// Failures are logged and ignored.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn terminate_other_connections(&self) -> Result<(), CommandError> {
        let connection = self.connection.caller_identity();

        let invocation = CommandLine::new(
            QUERY_TOOL,
            &format!("-c :command {CONNECTION_ARGS} --dbname :database"),
        )
        .envs(connection.env())
        .tolerate_failure()
        .build(
            &connection
                .command_params()
                .with("command", TERMINATE_CONNECTIONS),
        )?;

        self.runner.run(invocation).await?;
        Ok(())
    }

    pub async fn restore_tool_version(&self) -> Result<ToolVersion, CommandError> {
        let invocation = CommandLine::new(RESTORE_TOOL, "--version")
            .envs(self.connection.caller_identity().env())
            .build(&CommandParams::default())?;

        let output = self.runner.run(invocation).await?;
        parse_tool_version(RESTORE_TOOL, &output)
    }
}

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.(\d+))?").expect("valid version pattern"));

/// Extracts the first `major[.minor]` number, e.g. `pg_restore (PostgreSQL) 16.2` -> 16.2.
pub(crate) fn parse_tool_version(tool: &str, output: &str) -> Result<ToolVersion, CommandError> {
    let unexpected = || CommandError::UnexpectedOutput {
        tool: tool.to_owned(),
        reason: format!("no version number in `{}`", output.trim()),
    };

    let captures = VERSION.captures(output).ok_or_else(unexpected)?;
    let major = captures[1].parse().map_err(|_| unexpected())?;
    let minor = match captures.get(2) {
        Some(minor) => minor.as_str().parse().map_err(|_| unexpected())?,
        None => 0,
    };

    Ok(ToolVersion { major, minor })
}
