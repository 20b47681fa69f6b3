use std::collections::BTreeMap;

use one_dump::DumpError;
use one_dump::util::archive::extract_tar_gz;
use similar_asserts::assert_eq;

use crate::utils::{TestContext, dump_name, file_name};

#[tokio::test]
async fn test_create_partial_dump_stores_archive() {
    let mut context = TestContext::new();
    context
        .registry
        .define_dump(dump_name("nightly"), "partial", |scope| {
            scope.table("users")?.table("orders")?;
            scope.sql("users", "active_users", || {
                "SELECT * FROM users WHERE active".to_owned()
            })?;
            Ok(())
        })
        .unwrap();

    context
        .registry
        .create_dump(&dump_name("nightly"))
        .await
        .unwrap();

    let stored = context.stored_files("nightly");
    assert_eq!(stored.len(), 1);
    let filename = file_name(&stored[0]);
    assert!(filename.starts_with("nightly-"));
    assert!(filename.ends_with(".tar.gz"));

    let target = tempfile::tempdir().unwrap();
    let members: BTreeMap<String, String> =
        extract_tar_gz(std::fs::File::open(&stored[0]).unwrap(), target.path())
            .unwrap()
            .iter()
            .map(|path| (file_name(path), std::fs::read_to_string(path).unwrap()))
            .collect();

    assert_eq!(
        members.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["active_users.csv", "schema.dump", "sequences.dump", "tables.dump"]
    );
    assert!(members["schema.dump"].contains("--schema-only"));
    assert!(
        members["tables.dump"]
            .ends_with("-t \"users\" -t \"orders\" -t \"schema_migrations\"\n")
    );
    assert!(members["sequences.dump"].ends_with("-t public.users_id_seq\n"));
    assert!(members["active_users.csv"].starts_with("psql "));
}

#[tokio::test]
async fn test_create_full_dump_stores_single_file() {
    let mut context = TestContext::new();
    context
        .registry
        .define_dump(dump_name("everything"), "full", |_| Ok(()))
        .unwrap();

    context
        .registry
        .create_dump(&dump_name("everything"))
        .await
        .unwrap();

    let stored = context.stored_files("everything");
    assert_eq!(stored.len(), 1);
    assert!(file_name(&stored[0]).ends_with(".dump"));
    assert_eq!(
        std::fs::read_to_string(&stored[0]).unwrap(),
        "pg_dump --host=127.0.0.1 --port=5432 -x --no-owner -Fc app_dev\n"
    );

    let calls = context.runner.take_calls();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].args.iter().any(|arg| arg.contains("secret")));
}

#[tokio::test]
async fn test_create_undeclared_dump() {
    let context = TestContext::new();

    let result = context.registry.create_dump(&dump_name("nightly")).await;

    assert!(matches!(result, Err(DumpError::DumpDoesNotExist(_))));
    assert!(context.stored_files("nightly").is_empty());
    assert!(context.runner.take_calls().is_empty());
}
