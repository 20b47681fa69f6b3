//! Entry point tying dump definitions to the dump and restore pipelines.
//!
//! A registry is an owned value; callers that need process-wide access keep
//! one instance around and use [`DumpRegistry::reset`] between test runs.

use std::sync::Arc;

use indexmap::IndexMap;
use shared_types::DumpName;

use crate::config::core_config::{BookkeepingConfig, DumpConfig};
use crate::error::DumpError;
use crate::model::definition::{DefinitionError, DumpDefinition, DumpType};
use crate::provider::command::{ProcessRunner, process_runner_from_config};
use crate::provider::connection::ConnectionResolver;
use crate::provider::storage::{DumpStorage, storage_from_config};
use crate::service::database_helper::DatabaseHelper;
use crate::service::definition::{DefinitionBuilder, DefinitionScope};
use crate::service::dumper::Dumper;
use crate::service::loader::{Loader, NoReconnect, ReconnectHook};


pub struct DumpRegistry {
    dumps: IndexMap<DumpName, DefinitionBuilder>,
    storage: Option<Arc<dyn DumpStorage>>,
    schema_version_table: String,
    dumper: Dumper,
    loader: Loader,
    helper: DatabaseHelper,
}

impl DumpRegistry {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        connection: Arc<ConnectionResolver>,
        bookkeeping: BookkeepingConfig,
        restore_jobs: u32,
    ) -> Self {
        Self {
            dumps: IndexMap::new(),
            storage: None,
            schema_version_table: bookkeeping.schema_version_table.to_owned(),
            dumper: Dumper::new(runner.clone(), connection.clone()),
            loader: Loader::new(
                runner.clone(),
                connection.clone(),
                bookkeeping,
                restore_jobs,
                Arc::new(NoReconnect),
            ),
            helper: DatabaseHelper::new(runner, connection),
        }
    }

    /// Builds the runner, connection resolver and storage from `config` and
    /// registers every dump declared there.
    pub fn from_config(config: &DumpConfig) -> Result<Self, DumpError> {
        let runner = process_runner_from_config(config.container.as_ref());
        let connection = Arc::new(ConnectionResolver::from_config(
            config.database.to_owned(),
            config.container.to_owned(),
        ));

        let mut registry = Self::new(
            runner,
            connection,
            config.bookkeeping.to_owned(),
            config.restore_jobs,
        );

        if let Some(storage) = &config.storage {
            registry.set_storage(storage_from_config(storage)?);
        }

        for (name, definition) in &config.dumps {
            registry.register(name.to_owned(), DefinitionBuilder::from_config(definition)?)?;
        }

        Ok(registry)
    }

    pub fn with_reconnect_hook(mut self, reconnect: Arc<dyn ReconnectHook>) -> Self {
        self.loader = self.loader.with_reconnect_hook(reconnect);
        self
    }

    /// Declares a dump. `definition_fn` runs right away, so an invalid
    /// definition fails here and is not kept. A dump with the same name is
    /// replaced.
    pub fn define_dump(
        &mut self,
        name: DumpName,
        dump_type: &str,
        definition_fn: impl Fn(&mut DefinitionScope) -> Result<(), DefinitionError>
        + Send
        + Sync
        + 'static,
    ) -> Result<(), DumpError> {
        let builder = DefinitionBuilder::new(dump_type, Some(Box::new(definition_fn)))?;
        self.register(name, builder)
    }

    /// Evaluates `builder` and keeps it only if its definition is valid.
    pub fn register(&mut self, name: DumpName, builder: DefinitionBuilder) -> Result<(), DumpError> {
        let builder = builder.with_schema_version_table(self.schema_version_table.as_str());
        builder.evaluate()?;

        self.dumps.insert(name, builder);
        Ok(())
    }

    pub fn set_storage(&mut self, storage: Arc<dyn DumpStorage>) {
        self.storage = Some(storage);
    }

    pub fn clear_dumps(&mut self) {
        self.dumps.clear();
    }

    /// Forgets every declared dump and the storage.
    pub fn reset(&mut self) {
        self.clear_dumps();
        self.storage = None;
    }

    /// Declared dumps in declaration order.
    pub fn dumps(&self) -> impl Iterator<Item = (&DumpName, DumpType)> {
        self.dumps
            .iter()
            .map(|(name, builder)| (name, builder.dump_type()))
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn create_dump(&self, name: &DumpName) -> Result<(), DumpError> {
        let (definition, storage) = self.prepare(name)?;

        let artifact = self.dumper.run(name, &definition).await?;
        storage
            .save(artifact.path(), &artifact.filename, name)
            .await?;

        tracing::info!("Stored dump `{}`", artifact.filename);
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err(Debug))]
    pub async fn load_dump(&self, name: &DumpName) -> Result<(), DumpError> {
        let (definition, storage) = self.prepare(name)?;

        let retrieved = storage.retrieve(name).await?;
        tracing::debug!("Loading `{}`", retrieved.filename);

        self.loader.load(&definition, retrieved.path()).await
    }

    pub async fn terminate_other_connections(&self) -> Result<(), DumpError> {
        Ok(self.helper.terminate_other_connections().await?)
    }

    fn prepare(
        &self,
        name: &DumpName,
    ) -> Result<(Arc<DumpDefinition>, &Arc<dyn DumpStorage>), DumpError> {
        let builder = self
            .dumps
            .get(name)
            .ok_or_else(|| DumpError::DumpDoesNotExist(name.to_owned()))?;
        let storage = self.storage.as_ref().ok_or(DumpError::NoStorageDefined)?;

        Ok((builder.evaluate()?, storage))
    }
}
