use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(feature = "config_env")]
use figment::providers::Env;
#[cfg(feature = "config_json")]
use figment::providers::Json;
#[cfg(feature = "config_yaml")]
use figment::providers::Yaml;
#[cfg(any(feature = "config_json", feature = "config_yaml"))]
use figment::providers::{Data, Format};
use indexmap::IndexMap;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shared_types::DumpName;
use strum::{AsRefStr, Display, EnumString};

use super::ConfigParsingError;

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppCustomConfigSerdeDTO<Custom> {
    #[serde(default)]
    pub(super) app: Custom,
}

#[derive(Debug, Clone)]
pub struct AppConfig<Custom> {
    pub core: DumpConfig,
    pub app: Custom,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub container: Option<ContainerConfig>,
    #[serde(default)]
    pub bookkeeping: BookkeepingConfig,
    #[serde(default = "default_restore_jobs")]
    pub restore_jobs: u32,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    #[serde(default)]
    pub dumps: IndexMap<DumpName, DumpDefinitionConfig>,
}

fn default_restore_jobs() -> u32 {
    4
}

/// Connection parameters of the database being dumped or restored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
}

/// Target for running the database tools inside a container.
///
/// The `pg*` fields only override the caller identity, the server identity
/// always comes from [`DatabaseConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    #[serde(default = "default_container_runtime")]
    pub runtime: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default)]
    pub pg_user: Option<String>,
    #[serde(default)]
    pub pg_password: Option<SecretString>,
    #[serde(default)]
    pub pg_host: Option<String>,
    #[serde(default)]
    pub pg_port: Option<u16>,
}

fn default_container_runtime() -> String {
    "docker".to_owned()
}

impl ContainerConfig {
    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BookkeepingConfig {
    pub schema_version_table: String,
    pub environment_table: String,
    pub environment_key: String,
    pub environment_value: String,
}

impl Default for BookkeepingConfig {
    fn default() -> Self {
        Self {
            schema_version_table: "schema_migrations".to_owned(),
            environment_table: "ar_internal_metadata".to_owned(),
            environment_key: "environment".to_owned(),
            environment_value: "development".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr, Deserialize)]
pub enum StorageType {
    #[serde(rename = "LOCAL")]
    #[strum(serialize = "LOCAL")]
    Local,
    #[serde(rename = "S3")]
    #[strum(serialize = "S3")]
    S3,
}

/// Where produced archives are kept. `localStoreDir` is required for
/// `LOCAL`, the `s3` section for `S3`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub r#type: StorageType,
    #[serde(default = "default_keep_amount")]
    pub keep_amount: usize,
    #[serde(default)]
    pub local_store_dir: Option<PathBuf>,
    /// Retrieve local dumps from another host over ssh.
    #[serde(default)]
    pub remote_access: Option<RemoteAccessConfig>,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteAccessConfig {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

/// Bucket settings; credentials fall back to the usual `AWS_*` variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default)]
    pub store_dir: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<SecretString>,
}

fn default_keep_amount() -> usize {
    3
}

/// Declarative dump definition, as written in the config files.
///
/// `type` is kept as a plain string so that an unknown value is reported the
/// same way as for programmatic definitions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpDefinitionConfig {
    #[serde(default = "default_dump_type")]
    pub r#type: String,
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub sql: Vec<SqlExportConfig>,
}

fn default_dump_type() -> String {
    "partial".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlExportConfig {
    pub table: String,
    pub name: String,
    pub query: String,
}

pub enum InputFormat {
    #[cfg(feature = "config_yaml")]
    Yaml(Data<Yaml>),
    #[cfg(feature = "config_json")]
    Json(Data<Json>),
}

impl InputFormat {
    #[cfg(feature = "config_yaml")]
    pub fn yaml_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Yaml(Yaml::file(p))
    }

    #[cfg(feature = "config_yaml")]
    pub fn yaml_str(s: impl AsRef<str>) -> InputFormat {
        InputFormat::Yaml(Yaml::string(s.as_ref()))
    }

    #[cfg(feature = "config_json")]
    pub fn json_file(p: impl AsRef<Path>) -> InputFormat {
        InputFormat::Json(Json::file(p))
    }
}

impl<Custom> AppConfig<Custom>
where
    Custom: DeserializeOwned + Default,
{
    pub fn from_files(files: &[impl AsRef<Path>]) -> Result<Self, ConfigParsingError> {
        let mut inputs: Vec<InputFormat> = Vec::with_capacity(files.len());

        for path in files {
            #[cfg(feature = "config_yaml")]
            if path
                .as_ref()
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
            {
                inputs.push(InputFormat::yaml_file(path));
                continue;
            }

            #[cfg(feature = "config_json")]
            if path.as_ref().extension() == Some("json".as_ref()) {
                inputs.push(InputFormat::json_file(path));
                continue;
            }

            return Err(ConfigParsingError::GeneralParsingError(format!(
                "Unsupported file or missing file extension: {:?}",
                path.as_ref().to_str()
            )));
        }

        AppConfig::parse(inputs)
    }

    #[cfg(feature = "config_yaml")]
    pub fn from_yaml(
        configs: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self, ConfigParsingError> {
        AppConfig::parse(configs.into_iter().map(InputFormat::yaml_str))
    }

    pub fn parse(
        inputs: impl IntoIterator<Item = InputFormat>,
    ) -> Result<Self, ConfigParsingError> {
        let mut figment = Figment::new();

        for data in inputs {
            figment = match data {
                #[cfg(feature = "config_yaml")]
                InputFormat::Yaml(content) => figment.merge(content),
                #[cfg(feature = "config_json")]
                InputFormat::Json(content) => figment.merge(content),
            };
        }

        #[cfg(feature = "config_env")]
        {
            figment = figment.merge(Env::prefixed("DUMP_").split("__").lowercase(false));
        }

        let core = figment
            .extract::<DumpConfig>()
            .map_err(|e| ConfigParsingError::GeneralParsingError(e.to_string()))?;
        let custom = figment
            .extract::<AppCustomConfigSerdeDTO<Custom>>()
            .map_err(|e| ConfigParsingError::GeneralParsingError(e.to_string()))?;

        Ok(Self {
            core,
            app: custom.app,
        })
    }
}
