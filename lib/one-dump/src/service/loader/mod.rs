//! Restores archives produced by the dumper into the configured database.
//!
//! Tool runs are strictly sequential. A partial archive is extracted and
//! checked against its definition before anything touches the database.

use std::path::Path;
use std::sync::Arc;

use self::inflate::{has_content, validate_inflated};
use crate::config::core_config::BookkeepingConfig;
use crate::error::DumpError;
use crate::model::definition::{DumpDefinition, DumpKind, PartialSpec};
use crate::provider::command::{CommandLine, ProcessRunner};
use crate::provider::connection::{CONNECTION_ARGS, ConnectionParams, ConnectionResolver};
use crate::service::database_helper::{DatabaseHelper, QUERY_TOOL, RESTORE_TOOL, ToolVersion};
use crate::util::archive::{ArchiveError, extract_tar_gz};
use crate::util::sql::{quote_identifier, quote_literal};

pub mod inflate;


/// Oldest `pg_restore` whose dumps recreate the `public` schema themselves.
const SCHEMA_RECREATING_VERSION: ToolVersion = ToolVersion {
    major: 11,
    minor: 0,
};

const MARKER_TIMESTAMP: &str = "2000-01-01 00:00:00";

/// Re-establishes application connections after a restore.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait::async_trait]
pub trait ReconnectHook: Send + Sync {
    async fn reconnect(&self) -> anyhow::Result<()>;
}

pub struct NoReconnect;

#[async_trait::async_trait]
impl ReconnectHook for NoReconnect {
    async fn reconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct Loader {
    runner: Arc<dyn ProcessRunner>,
    connection: Arc<ConnectionResolver>,
    helper: DatabaseHelper,
    bookkeeping: BookkeepingConfig,
    restore_jobs: u32,
    reconnect: Arc<dyn ReconnectHook>,
}

impl Loader {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        connection: Arc<ConnectionResolver>,
        bookkeeping: BookkeepingConfig,
        restore_jobs: u32,
        reconnect: Arc<dyn ReconnectHook>,
    ) -> Self {
        Self {
            helper: DatabaseHelper::new(runner.clone(), connection.clone()),
            runner,
            connection,
            bookkeeping,
            restore_jobs: restore_jobs.max(1),
            reconnect,
        }
    }

    pub fn with_reconnect_hook(mut self, reconnect: Arc<dyn ReconnectHook>) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Restores `archive`, resets the environment marker, reconnects and
    /// finally runs the definition's after-restore callback.
    #[tracing::instrument(level = "debug", skip(self, definition), err(Debug))]
    pub async fn load(&self, definition: &DumpDefinition, archive: &Path) -> Result<(), DumpError> {
        let connection = self.connection.caller_identity();
        let version = self.helper.restore_tool_version().await?;

        match &definition.kind {
            DumpKind::Full => {
                self.load_full_database(&connection, version, archive)
                    .await?
            }
            DumpKind::Partial(spec) => {
                self.load_partial_database(&connection, version, spec, archive)
                    .await?
            }
        }

        self.reset_environment_marker(&connection).await?;
        self.reconnect.reconnect().await.map_err(DumpError::Hook)?;

        if let Some(after_restore) = definition.after_restore() {
            after_restore().map_err(DumpError::Hook)?;
        }

        tracing::info!("Restored `{}`", archive.display());
        Ok(())
    }

    async fn load_full_database(
        &self,
        connection: &ConnectionParams,
        version: ToolVersion,
        archive: &Path,
    ) -> Result<(), DumpError> {
        self.ensure_schema_compatibility(connection, version)
            .await?;
        self.pg_restore(connection, "", archive).await
    }

    async fn load_partial_database(
        &self,
        connection: &ConnectionParams,
        version: ToolVersion,
        spec: &PartialSpec,
        archive: &Path,
    ) -> Result<(), DumpError> {
        let scratch = tempfile::tempdir().map_err(DumpError::io("creating scratch directory"))?;

        let source = archive.to_owned();
        let destination = scratch.path().to_owned();
        let paths = tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&source).map_err(|source| ArchiveError::Io {
                context: "open archive".to_owned(),
                source,
            })?;
            extract_tar_gz(file, &destination)
        })
        .await
        .map_err(|error| DumpError::Io {
            context: "extracting archive",
            source: std::io::Error::other(error),
        })??;

        let inflated = validate_inflated(spec, &paths)?;
        tracing::debug!("Extracted {} archive members", paths.len());

        self.ensure_schema_compatibility(connection, version)
            .await?;

        self.pg_restore(connection, "", &inflated.schema).await?;
        self.pg_restore(connection, "--data-only", &inflated.tables)
            .await?;

        for export in &inflated.sql_exports {
            self.copy_from_csv(connection, &export.table, &export.path)
                .await?;
        }

        if has_content(&inflated.sequences)? {
            self.pg_restore(connection, "--data-only", &inflated.sequences)
                .await?;
        }

        Ok(())
    }

    /// Newer tools recreate `public` themselves and fail if it exists; older
    /// ones expect it to be there.
    async fn ensure_schema_compatibility(
        &self,
        connection: &ConnectionParams,
        version: ToolVersion,
    ) -> Result<(), DumpError> {
        let command = if version >= SCHEMA_RECREATING_VERSION {
            "DROP SCHEMA IF EXISTS public"
        } else {
            "CREATE SCHEMA IF NOT EXISTS public"
        };

        self.psql(connection, &[command], None).await
    }

    /// Without a container the archive path is passed directly so that
    /// `--jobs` can be used; inside a container it is streamed through stdin.
    async fn pg_restore(
        &self,
        connection: &ConnectionParams,
        options: &str,
        archive: &Path,
    ) -> Result<(), DumpError> {
        let invocation = CommandLine::new(
            RESTORE_TOOL,
            &format!("{CONNECTION_ARGS} {options} -j :jobs --no-owner --dbname :database :path"),
        )
        .container_template(&format!(
            "{CONNECTION_ARGS} {options} --no-owner --dbname :database"
        ))
        .envs(connection.env())
        .stdin(archive)
        .build(
            &connection
                .command_params()
                .with("jobs", self.restore_jobs.to_string())
                .with("path", archive.to_string_lossy()),
        )?;

        self.runner.run(invocation).await?;
        Ok(())
    }

    /// Loads a CSV export into `table` with its triggers disabled.
    async fn copy_from_csv(
        &self,
        connection: &ConnectionParams,
        table: &str,
        csv: &Path,
    ) -> Result<(), DumpError> {
        let table = quote_identifier(table);
        let disable = format!("ALTER TABLE {table} DISABLE TRIGGER ALL");
        let copy = format!("COPY {table} FROM STDIN DELIMITER ',' CSV HEADER");
        let enable = format!("ALTER TABLE {table} ENABLE TRIGGER ALL");

        self.psql(connection, &[disable.as_str(), copy.as_str(), enable.as_str()], Some(csv))
            .await
    }

    async fn reset_environment_marker(&self, connection: &ConnectionParams) -> Result<(), DumpError> {
        let BookkeepingConfig {
            environment_table,
            environment_key,
            environment_value,
            ..
        } = &self.bookkeeping;

        let table = quote_identifier(environment_table);
        let key = quote_literal(environment_key);
        let value = quote_literal(environment_value);
        let timestamp = quote_literal(MARKER_TIMESTAMP);

        let command = format!(
            "DELETE FROM {table} WHERE key = {key}; \
             INSERT INTO {table} (key, value, created_at, updated_at) \
             VALUES ({key}, {value}, {timestamp}, {timestamp})"
        );

        self.psql(connection, &[command.as_str()], None).await
    }

    /// Runs each command with its own `-c`, stopping at the first error.
    async fn psql(
        &self,
        connection: &ConnectionParams,
        commands: &[&str],
        stdin: Option<&Path>,
    ) -> Result<(), DumpError> {
        let mut command_line = CommandLine::new(
            QUERY_TOOL,
            &format!("{CONNECTION_ARGS} -v ON_ERROR_STOP=1 -d :database"),
        )
        .args(commands.iter().flat_map(|command| ["-c", *command]))
        .envs(connection.env());

        if let Some(stdin) = stdin {
            command_line = command_line.stdin(stdin);
        }

        let invocation = command_line.build(&connection.command_params())?;
        self.runner.run(invocation).await?;
        Ok(())
    }
}
