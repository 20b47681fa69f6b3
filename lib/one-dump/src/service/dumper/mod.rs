use std::path::{Path, PathBuf};
use std::sync::Arc;

use shared_types::DumpName;
use tempfile::{NamedTempFile, TempPath};
use time::{OffsetDateTime, UtcOffset};

use crate::error::DumpError;
use crate::model::definition::{DumpDefinition, DumpKind, PartialSpec};
use crate::provider::command::{CommandLine, ProcessRunner};
use crate::provider::connection::{CONNECTION_ARGS, ConnectionParams, ConnectionResolver};
use crate::service::database_helper::QUERY_TOOL;
use crate::util::archive::{SCHEMA_MEMBER, SEQUENCES_MEMBER, TABLES_MEMBER, create_tar_gz};
use crate::util::sql::quote_identifier;


pub const DUMP_TOOL: &str = "pg_dump";

/// Names come back quoted, ready to be used as exact `-t` patterns.
const LIST_SEQUENCES: &str = "SELECT format('%I.%I', sequence_schema, sequence_name) FROM information_schema.sequences ORDER BY 1";

/// A produced archive; the file is deleted when this is dropped.
#[derive(Debug)]
pub struct DumpArtifact {
    file: TempPath,
    pub filename: String,
}

impl DumpArtifact {
    pub fn path(&self) -> &Path {
        &self.file
    }
}

pub struct Dumper {
    runner: Arc<dyn ProcessRunner>,
    connection: Arc<ConnectionResolver>,
}

impl Dumper {
    pub fn new(runner: Arc<dyn ProcessRunner>, connection: Arc<ConnectionResolver>) -> Self {
        Self { runner, connection }
    }

    #[tracing::instrument(level = "debug", skip(self, definition), err(Debug))]
    pub async fn run(
        &self,
        dump_name: &DumpName,
        definition: &DumpDefinition,
    ) -> Result<DumpArtifact, DumpError> {
        let now = OffsetDateTime::now_utc();
        let connection = self.connection.server_identity();

        let artifact = match &definition.kind {
            DumpKind::Full => self.dump_full_database(&connection, dump_name, now).await?,
            DumpKind::Partial(spec) => {
                self.dump_partial_database(&connection, spec, dump_name, now)
                    .await?
            }
        };

        tracing::info!("Created dump `{}`", artifact.filename);
        Ok(artifact)
    }

    async fn dump_full_database(
        &self,
        connection: &ConnectionParams,
        dump_name: &DumpName,
        now: OffsetDateTime,
    ) -> Result<DumpArtifact, DumpError> {
        let file = NamedTempFile::new()
            .map_err(DumpError::io("creating dump file"))?
            .into_temp_path();

        self.pg_dump(connection, "", &[], &file).await?;

        Ok(DumpArtifact {
            file,
            filename: archive_filename(dump_name, now, "dump"),
        })
    }

    async fn dump_partial_database(
        &self,
        connection: &ConnectionParams,
        spec: &PartialSpec,
        dump_name: &DumpName,
        now: OffsetDateTime,
    ) -> Result<DumpArtifact, DumpError> {
        let scratch = tempfile::tempdir().map_err(DumpError::io("creating scratch directory"))?;
        let mut members: Vec<(String, PathBuf)> = vec![];

        let schema = scratch.path().join(SCHEMA_MEMBER);
        self.pg_dump(connection, "--schema-only", &[], &schema)
            .await?;
        members.push((SCHEMA_MEMBER.to_owned(), schema));

        let tables = scratch.path().join(TABLES_MEMBER);
        let table_patterns: Vec<String> = spec
            .full_tables_to_export()
            .into_iter()
            .map(quote_identifier)
            .collect();
        self.pg_dump(connection, "", &table_patterns, &tables)
            .await?;
        members.push((TABLES_MEMBER.to_owned(), tables));

        for (name, export) in spec.sql_exports() {
            let member = name.csv_member();
            let path = scratch.path().join(&member);
            self.copy_to_csv(connection, &export.query(), &path).await?;
            members.push((member, path));
        }

        let sequences_path = scratch.path().join(SEQUENCES_MEMBER);
        let sequences = self.list_sequences(connection).await?;
        if sequences.is_empty() {
            tokio::fs::write(&sequences_path, b"")
                .await
                .map_err(DumpError::io("writing empty sequences member"))?;
        } else {
            self.pg_dump(connection, "", &sequences, &sequences_path)
                .await?;
        }
        members.push((SEQUENCES_MEMBER.to_owned(), sequences_path));

        let (file, path) = NamedTempFile::new()
            .map_err(DumpError::io("creating archive file"))?
            .into_parts();
        tokio::task::spawn_blocking(move || create_tar_gz(&members, file))
            .await
            .map_err(|error| DumpError::Io {
                context: "packing archive",
                source: std::io::Error::other(error),
            })??;

        Ok(DumpArtifact {
            file: path,
            filename: archive_filename(dump_name, now, "tar.gz"),
        })
    }

    /// Custom-format dump without privileges or ownership, restricted to
    /// `objects` when any are given. `pg_dump` reads each object as a pattern,
    /// so names must already be quoted to match case-sensitively.
    async fn pg_dump(
        &self,
        connection: &ConnectionParams,
        options: &str,
        objects: &[String],
        output: &Path,
    ) -> Result<(), DumpError> {
        let invocation = CommandLine::new(
            DUMP_TOOL,
            &format!("{CONNECTION_ARGS} -x --no-owner {options} -Fc :database"),
        )
        .args(
            objects
                .iter()
                .flat_map(|object| ["-t", object.as_str()]),
        )
        .envs(connection.env())
        .stdout_to(output)
        .build(&connection.command_params())?;

        self.runner.run(invocation).await?;
        Ok(())
    }

    async fn copy_to_csv(
        &self,
        connection: &ConnectionParams,
        query: &str,
        output: &Path,
    ) -> Result<(), DumpError> {
        let invocation = CommandLine::new(
            QUERY_TOOL,
            &format!("{CONNECTION_ARGS} -v ON_ERROR_STOP=1 -d :database -c :command"),
        )
        .envs(connection.env())
        .stdout_to(output)
        .build(
            &connection
                .command_params()
                .with("command", format!("COPY ({query}) TO STDOUT DELIMITER ',' CSV HEADER")),
        )?;

        self.runner.run(invocation).await?;
        Ok(())
    }

    async fn list_sequences(&self, connection: &ConnectionParams) -> Result<Vec<String>, DumpError> {
        let invocation = CommandLine::new(
            QUERY_TOOL,
            &format!(
                "{CONNECTION_ARGS} -v ON_ERROR_STOP=1 -d :database --tuples-only --no-align -c :command"
            ),
        )
        .envs(connection.env())
        .build(&connection.command_params().with("command", LIST_SEQUENCES))?;

        let output = self.runner.run(invocation).await?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect())
    }
}

/// `<dump name>-<YYYYMMDD-HHMM>.<extension>`, in UTC.
pub(crate) fn archive_filename(dump_name: &DumpName, now: OffsetDateTime, extension: &str) -> String {
    let now = now.to_offset(UtcOffset::UTC);

    format!(
        "{dump_name}-{:04}{:02}{:02}-{:02}{:02}.{extension}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute()
    )
}
