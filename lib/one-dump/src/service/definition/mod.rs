//! Declaration of what a dump contains.
//!
//! A [`DefinitionBuilder`] is created with the dump type and a configuration
//! function. The function is only run by [`DefinitionBuilder::evaluate`],
//! once; later calls hand out the same [`DumpDefinition`]. The registry
//! evaluates every builder when it is declared.

use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use indexmap::{IndexMap, IndexSet};
use shared_types::ExportName;

use crate::config::core_config::{BookkeepingConfig, DumpDefinitionConfig};
use crate::model::definition::{
    AfterRestoreCallback, DefinitionError, DumpDefinition, DumpKind, DumpType, PartialSpec,
    SqlExport,
};


pub type DefinitionFn = Box<dyn Fn(&mut DefinitionScope) -> Result<(), DefinitionError> + Send + Sync>;

/// Mutable staging area handed to the configuration function.
pub struct DefinitionScope {
    dump_type: DumpType,
    schema_version_table: String,
    tables: IndexSet<String>,
    sql_exports: IndexMap<ExportName, SqlExport>,
    after_restore: Option<AfterRestoreCallback>,
}

impl DefinitionScope {
    fn new(dump_type: DumpType, schema_version_table: String) -> Self {
        Self {
            dump_type,
            schema_version_table,
            tables: IndexSet::new(),
            sql_exports: IndexMap::new(),
            after_restore: None,
        }
    }

    /// Exports a whole table.
    pub fn table(&mut self, name: impl Into<String>) -> Result<&mut Self, DefinitionError> {
        let name = name.into();
        self.ensure_partial("tables")?;

        if name == self.schema_version_table {
            return Err(DefinitionError::InvalidDumpDefinition(format!(
                "table `{name}` is always exported"
            )));
        }
        if !self.tables.insert(name.to_owned()) {
            return Err(DefinitionError::InvalidDumpDefinition(format!(
                "table `{name}` already defined"
            )));
        }

        Ok(self)
    }

    /// Exports the result of a query as `<export_name>.csv`, loaded back into `table`.
    pub fn sql(
        &mut self,
        table: impl Into<String>,
        export_name: &str,
        producer: impl Fn() -> String + Send + Sync + 'static,
    ) -> Result<&mut Self, DefinitionError> {
        self.ensure_partial("sql exports")?;

        let export_name = ExportName::from_str(export_name)
            .map_err(|error| DefinitionError::InvalidDumpDefinition(error.to_string()))?;
        if self.sql_exports.contains_key(&export_name) {
            return Err(DefinitionError::InvalidDumpDefinition(format!(
                "sql `{export_name}` already defined"
            )));
        }

        self.sql_exports
            .insert(export_name, SqlExport::new(table, Arc::new(producer)));
        Ok(self)
    }

    /// Sets the callback run after a restore. The last call wins.
    pub fn on_after_restore(
        &mut self,
        callback: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> &mut Self {
        self.after_restore = Some(Arc::new(callback));
        self
    }

    fn ensure_partial(&self, what: &str) -> Result<(), DefinitionError> {
        match self.dump_type {
            DumpType::Partial => Ok(()),
            DumpType::Full => Err(DefinitionError::InvalidDumpDefinition(format!(
                "{what} cannot be declared for a full dump"
            ))),
        }
    }

    fn into_definition(self) -> DumpDefinition {
        let kind = match self.dump_type {
            DumpType::Full => DumpKind::Full,
            DumpType::Partial => DumpKind::Partial(PartialSpec {
                tables: self.tables,
                sql_exports: self.sql_exports,
                schema_version_table: self.schema_version_table,
            }),
        };

        DumpDefinition {
            kind,
            after_restore: self.after_restore,
        }
    }
}

pub struct DefinitionBuilder {
    dump_type: DumpType,
    schema_version_table: String,
    definition_fn: Option<DefinitionFn>,
    evaluated: OnceLock<Arc<DumpDefinition>>,
}

impl DefinitionBuilder {
    /// Fails with [`DefinitionError::InvalidDumpType`] unless `dump_type` is
    /// `full` or `partial`.
    pub fn new(
        dump_type: &str,
        definition_fn: Option<DefinitionFn>,
    ) -> Result<Self, DefinitionError> {
        let dump_type = DumpType::from_str(dump_type)
            .map_err(|_| DefinitionError::InvalidDumpType(dump_type.to_owned()))?;

        Ok(Self {
            dump_type,
            schema_version_table: BookkeepingConfig::default().schema_version_table,
            definition_fn,
            evaluated: OnceLock::new(),
        })
    }

    pub fn from_config(config: &DumpDefinitionConfig) -> Result<Self, DefinitionError> {
        let DumpDefinitionConfig { r#type, tables, sql } = config.to_owned();

        Self::new(
            &r#type,
            Some(Box::new(move |scope: &mut DefinitionScope| {
                for table in &tables {
                    scope.table(table.as_str())?;
                }
                for export in &sql {
                    let query = export.query.to_owned();
                    scope.sql(export.table.as_str(), &export.name, move || query.to_owned())?;
                }
                Ok(())
            })),
        )
    }

    pub fn with_schema_version_table(mut self, table: impl Into<String>) -> Self {
        self.schema_version_table = table.into();
        self
    }

    pub fn dump_type(&self) -> DumpType {
        self.dump_type
    }

    /// Runs the configuration function on first call and caches the result.
    ///
    /// A failing configuration function leaves nothing cached.
    pub fn evaluate(&self) -> Result<Arc<DumpDefinition>, DefinitionError> {
        if let Some(definition) = self.evaluated.get() {
            return Ok(definition.clone());
        }

        let mut scope = DefinitionScope::new(self.dump_type, self.schema_version_table.to_owned());
        if let Some(definition_fn) = &self.definition_fn {
            definition_fn(&mut scope)?;
        }

        Ok(self
            .evaluated
            .get_or_init(|| Arc::new(scope.into_definition()))
            .clone())
    }
}
