use std::path::{Path, PathBuf};

use shared_types::ExportName;

use crate::model::definition::PartialSpec;
use crate::util::archive::{ArchiveError, SCHEMA_MEMBER, SEQUENCES_MEMBER, TABLES_MEMBER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflatedSqlExport {
    pub name: ExportName,
    pub table: String,
    pub path: PathBuf,
}

/// Extracted members of a partial archive, checked against its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflatedArchive {
    pub schema: PathBuf,
    pub tables: PathBuf,
    pub sequences: PathBuf,
    pub sql_exports: Vec<InflatedSqlExport>,
}

/// Matches extracted files to the members `spec` requires.
///
/// Every missing member is reported, not just the first one. Extra members
/// are ignored.
pub fn validate_inflated(
    spec: &PartialSpec,
    paths: &[PathBuf],
) -> Result<InflatedArchive, ArchiveError> {
    let mut missing = vec![];
    let mut find = |member: &str| {
        let found = paths
            .iter()
            .find(|path| path.file_name().is_some_and(|name| name == member))
            .cloned();
        if found.is_none() {
            missing.push(member.to_owned());
        }
        found
    };

    let schema = find(SCHEMA_MEMBER);
    let tables = find(TABLES_MEMBER);
    let sequences = find(SEQUENCES_MEMBER);
    let sql_exports: Vec<_> = spec
        .sql_exports()
        .filter_map(|(name, export)| {
            find(&name.csv_member()).map(|path| InflatedSqlExport {
                name: name.to_owned(),
                table: export.table.to_owned(),
                path,
            })
        })
        .collect();

    match (schema, tables, sequences) {
        (Some(schema), Some(tables), Some(sequences)) if missing.is_empty() => {
            Ok(InflatedArchive {
                schema,
                tables,
                sequences,
                sql_exports,
            })
        }
        _ => Err(ArchiveError::MissingMembers(missing)),
    }
}

/// An empty sequences member means the database had no sequences.
pub(super) fn has_content(path: &Path) -> Result<bool, ArchiveError> {
    std::fs::metadata(path)
        .map(|metadata| metadata.len() > 0)
        .map_err(|source| ArchiveError::Io {
            context: format!("read size of {}", path.display()),
            source,
        })
}
