use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use one_dump::DumpRegistry;
use one_dump::config::core_config::{BookkeepingConfig, DatabaseConfig};
use one_dump::provider::command::error::CommandError;
use one_dump::provider::command::{Invocation, ProcessRunner, StdoutTarget};
use one_dump::provider::connection::ConnectionResolver;
use one_dump::provider::storage::local::LocalStorage;
use shared_types::DumpName;
use tempfile::TempDir;

/// Stands in for the PostgreSQL tools: answers the version probe and the
/// sequence listing, and writes a line naming the call into redirected stdout.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    calls: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptedRunner {
    /// Returns and forgets the invocations recorded so far.
    pub fn take_calls(&self) -> Vec<Invocation> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: Invocation) -> Result<String, CommandError> {
        let output = if invocation.args == ["--version"] {
            "pg_restore (PostgreSQL) 16.2\n"
        } else if invocation
            .args
            .iter()
            .any(|arg| arg.contains("information_schema.sequences"))
        {
            "public.users_id_seq\n"
        } else {
            ""
        };

        if let StdoutTarget::File(path) = &invocation.stdout {
            tokio::fs::write(
                path,
                format!("{} {}\n", invocation.tool, invocation.args.join(" ")),
            )
            .await
            .unwrap();
        }

        self.calls.lock().unwrap().push(invocation);
        Ok(output.to_owned())
    }
}

pub struct TestContext {
    pub registry: DumpRegistry,
    pub runner: ScriptedRunner,
    pub store: TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let runner = ScriptedRunner::default();
        let store = tempfile::tempdir().unwrap();

        let mut registry = DumpRegistry::new(
            Arc::new(runner.clone()),
            Arc::new(ConnectionResolver::from_config(
                DatabaseConfig {
                    username: "app".to_owned(),
                    password: Some("secret".into()),
                    host: None,
                    port: None,
                    database: "app_dev".to_owned(),
                },
                None,
            )),
            BookkeepingConfig::default(),
            4,
        );
        registry.set_storage(Arc::new(LocalStorage::new(store.path().to_owned(), 2)));

        Self {
            registry,
            runner,
            store,
        }
    }

    pub fn stored_files(&self, dump_name: &str) -> Vec<PathBuf> {
        let dir = self.store.path().join(dump_name);
        if !dir.exists() {
            return vec![];
        }

        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

pub fn dump_name(value: &str) -> DumpName {
    value.parse().unwrap()
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
