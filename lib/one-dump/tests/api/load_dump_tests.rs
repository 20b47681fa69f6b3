use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use one_dump::DumpError;
use one_dump::provider::storage::error::StorageError;
use one_dump::util::archive::ArchiveError;
use similar_asserts::assert_eq;

use crate::utils::{TestContext, dump_name};

#[tokio::test]
async fn test_partial_dump_round_trip() {
    let restored = Arc::new(AtomicBool::new(false));
    let flag = restored.clone();

    let mut context = TestContext::new();
    context
        .registry
        .define_dump(dump_name("nightly"), "partial", move |scope| {
            let flag = flag.clone();
            scope
                .table("users")?
                .sql("users", "active_users", || "SELECT 1".to_owned())?
                .on_after_restore(move || {
                    flag.store(true, Ordering::SeqCst);
                    Ok(())
                });
            Ok(())
        })
        .unwrap();

    context
        .registry
        .create_dump(&dump_name("nightly"))
        .await
        .unwrap();
    context.runner.take_calls();

    context
        .registry
        .load_dump(&dump_name("nightly"))
        .await
        .unwrap();

    let calls = context.runner.take_calls();
    let tools: Vec<&str> = calls.iter().map(|call| call.tool.as_str()).collect();
    assert_eq!(
        tools,
        vec![
            "pg_restore",
            "psql",
            "pg_restore",
            "pg_restore",
            "psql",
            "pg_restore",
            "psql"
        ]
    );
    assert!(calls[4].stdin.is_some());
    assert!(restored.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_load_full_dump_from_local_storage() {
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
    context.runner.take_calls();

    context
        .registry
        .load_dump(&dump_name("everything"))
        .await
        .unwrap();

    let calls = context.runner.take_calls();
    let stored = context.stored_files("everything");
    assert_eq!(
        calls[2].args.last().map(String::as_str),
        stored[0].to_str()
    );
    assert!(
        calls[3]
            .args
            .last()
            .unwrap()
            .contains("VALUES ('environment', 'development'")
    );
}

#[tokio::test]
async fn test_load_without_stored_dump() {
    let mut context = TestContext::new();
    context
        .registry
        .define_dump(dump_name("nightly"), "partial", |_| Ok(()))
        .unwrap();

    let result = context.registry.load_dump(&dump_name("nightly")).await;

    assert!(matches!(
        result,
        Err(DumpError::Storage(StorageError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_load_rejects_archive_missing_declared_export() {
    let mut context = TestContext::new();
    context
        .registry
        .define_dump(dump_name("nightly"), "partial", |scope| {
            scope.table("users")?;
            Ok(())
        })
        .unwrap();
    context
        .registry
        .create_dump(&dump_name("nightly"))
        .await
        .unwrap();

    context
        .registry
        .define_dump(dump_name("nightly"), "partial", |scope| {
            scope
                .table("users")?
                .sql("users", "recent_users", || "SELECT 1".to_owned())?;
            Ok(())
        })
        .unwrap();
    context.runner.take_calls();

    let result = context.registry.load_dump(&dump_name("nightly")).await;

    assert!(matches!(
        result,
        Err(DumpError::Archive(ArchiveError::MissingMembers(missing))) if missing == ["recent_users.csv"]
    ));
    let calls = context.runner.take_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec!["--version".to_owned()]);
}
