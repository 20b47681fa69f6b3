use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;

use crate::config::core_config::{ContainerConfig, DatabaseConfig};
use crate::provider::command::CommandParams;


pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5432;

/// Connection arguments shared by every tool invocation.
pub const CONNECTION_ARGS: &str = "--host=:host --port=:port";

/// Yields the current database configuration; called once per operation.
pub type ConnectionProvider = Arc<dyn Fn() -> DatabaseConfig + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<SecretString>,
    pub database: String,
}

impl ConnectionParams {
    /// Credentials in the form the PostgreSQL tools read them.
    pub fn env(&self) -> BTreeMap<String, SecretString> {
        let mut env = BTreeMap::from([(
            "PGUSER".to_owned(),
            SecretString::from(self.username.as_str()),
        )]);
        if let Some(password) = &self.password {
            env.insert("PGPASSWORD".to_owned(), password.clone());
        }
        env
    }

    pub fn command_params(&self) -> CommandParams {
        CommandParams::default()
            .with("host", self.host.as_str())
            .with("port", self.port.to_string())
            .with("database", self.database.as_str())
    }
}

pub struct ConnectionResolver {
    provider: ConnectionProvider,
    container: Option<ContainerConfig>,
}

impl ConnectionResolver {
    pub fn new(provider: ConnectionProvider, container: Option<ContainerConfig>) -> Self {
        Self {
            provider,
            container,
        }
    }

    pub fn from_config(database: DatabaseConfig, container: Option<ContainerConfig>) -> Self {
        Self::new(Arc::new(move || database.clone()), container)
    }

    /// Identity used for restore-direction operations; container credentials
    /// take precedence when configured.
    pub fn caller_identity(&self) -> ConnectionParams {
        let config = (self.provider)();
        let container = self.container.as_ref();

        ConnectionParams {
            host: container
                .and_then(|c| c.pg_host.clone())
                .or(config.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: container
                .and_then(|c| c.pg_port)
                .or(config.port)
                .unwrap_or(DEFAULT_PORT),
            username: container
                .and_then(|c| c.pg_user.clone())
                .unwrap_or(config.username),
            password: container
                .and_then(|c| c.pg_password.clone())
                .or(config.password),
            database: config.database,
        }
    }

    /// Identity used for dump-direction operations, always the raw provider values.
    pub fn server_identity(&self) -> ConnectionParams {
        let config = (self.provider)();

        ConnectionParams {
            host: config.host.unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: config.port.unwrap_or(DEFAULT_PORT),
            username: config.username,
            password: config.password,
            database: config.database,
        }
    }
}
