#![cfg(feature = "config_yaml")]

use one_dump::DumpRegistry;
use one_dump::config::core_config::AppConfig;
use one_dump::model::definition::DumpType;
use serde::Deserialize;
use similar_asserts::assert_eq;

#[derive(Debug, Default, Deserialize)]
struct NoAppConfig {}

#[test]
fn test_registry_from_yaml_config() {
    let store = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
database:
  username: app
  database: app_dev
storage:
  type: LOCAL
  localStoreDir: {}
dumps:
  nightly:
    tables: [users]
  everything:
    type: full
"#,
        store.path().display()
    );

    let config = AppConfig::<NoAppConfig>::from_yaml([yaml]).unwrap();
    let registry = DumpRegistry::from_config(&config.core).unwrap();

    let dumps: Vec<(String, DumpType)> = registry
        .dumps()
        .map(|(name, dump_type)| (name.to_string(), dump_type))
        .collect();
    assert_eq!(
        dumps,
        vec![
            ("nightly".to_owned(), DumpType::Partial),
            ("everything".to_owned(), DumpType::Full),
        ]
    );
}
