use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use shared_types::ExportName;
use strum::{Display, EnumString};
use thiserror::Error;

/// Produces the SQL text of a raw export; evaluated at dump time.
pub type SqlProducer = Arc<dyn Fn() -> String + Send + Sync>;

/// Runs after a successful restore, once the connection was re-established.
pub type AfterRestoreCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Invalid dump type `{0}`, use `partial` or `full`")]
    InvalidDumpType(String),
    #[error("Invalid dump definition: {0}")]
    InvalidDumpDefinition(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DumpType {
    Full,
    Partial,
}

#[derive(Clone)]
pub struct SqlExport {
    pub table: String,
    producer: SqlProducer,
}

impl SqlExport {
    pub fn new(table: impl Into<String>, producer: SqlProducer) -> Self {
        Self {
            table: table.into(),
            producer,
        }
    }

    pub fn query(&self) -> String {
        (self.producer)()
    }
}

impl fmt::Debug for SqlExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlExport")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

/// Shape of a partial dump: whole tables plus named raw-SQL exports.
#[derive(Debug, Clone)]
pub struct PartialSpec {
    pub(crate) tables: IndexSet<String>,
    pub(crate) sql_exports: IndexMap<ExportName, SqlExport>,
    pub(crate) schema_version_table: String,
}

impl PartialSpec {
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn sql_exports(&self) -> impl Iterator<Item = (&ExportName, &SqlExport)> {
        self.sql_exports.iter()
    }

    /// Declared tables followed by the schema-version bookkeeping table.
    pub fn full_tables_to_export(&self) -> Vec<&str> {
        self.tables()
            .chain(std::iter::once(self.schema_version_table.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum DumpKind {
    Full,
    Partial(PartialSpec),
}

#[derive(Clone)]
pub struct DumpDefinition {
    pub kind: DumpKind,
    pub(crate) after_restore: Option<AfterRestoreCallback>,
}

impl DumpDefinition {
    pub fn dump_type(&self) -> DumpType {
        match self.kind {
            DumpKind::Full => DumpType::Full,
            DumpKind::Partial(_) => DumpType::Partial,
        }
    }

    pub fn after_restore(&self) -> Option<&AfterRestoreCallback> {
        self.after_restore.as_ref()
    }
}

impl fmt::Debug for DumpDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DumpDefinition")
            .field("kind", &self.kind)
            .field("after_restore", &self.after_restore.is_some())
            .finish()
    }
}
