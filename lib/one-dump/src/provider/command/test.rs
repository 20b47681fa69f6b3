use std::collections::BTreeMap;

use secrecy::SecretString;

use super::container::ContainerProcessRunner;
use super::direct::DirectProcessRunner;
use super::error::CommandError;
use super::{CommandLine, CommandParams, ProcessRunner, StdoutTarget};

fn connection_params() -> CommandParams {
    CommandParams::default()
        .with("host", "db.internal")
        .with("port", "5433")
        .with("database", "app")
}

fn env(user: &str, password: &str) -> BTreeMap<String, SecretString> {
    BTreeMap::from([
        ("PGUSER".to_owned(), SecretString::from(user)),
        ("PGPASSWORD".to_owned(), SecretString::from(password)),
    ])
}

#[test]
fn test_build_substitutes_placeholders_per_argument() {
    let invocation = CommandLine::new("pg_dump", "--host=:host --port=:port -x -Fc :database")
        .args(["-t", "users"])
        .build(&connection_params())
        .unwrap();

    assert_eq!(invocation.tool, "pg_dump");
    assert_eq!(
        invocation.args,
        vec![
            "--host=db.internal",
            "--port=5433",
            "-x",
            "-Fc",
            "app",
            "-t",
            "users"
        ]
    );
    assert_eq!(invocation.container_args, None);
    assert_eq!(invocation.stdout, StdoutTarget::Capture);
}

#[test]
fn test_build_keeps_substituted_value_as_single_argument() {
    let sql = "SELECT 1; DROP TABLE users; -- $(rm -rf /)";
    let invocation = CommandLine::new("psql", "-d :database -c :command")
        .build(&connection_params().with("command", sql))
        .unwrap();

    assert_eq!(invocation.args, vec!["-d", "app", "-c", sql]);
}

#[test]
fn test_build_does_not_substitute_extra_args() {
    let invocation = CommandLine::new("pg_dump", ":database")
        .args([":host"])
        .build(&connection_params())
        .unwrap();

    assert_eq!(invocation.args, vec!["app", ":host"]);
}

#[test]
fn test_build_fails_on_unresolved_placeholder() {
    let result = CommandLine::new("psql", "-d :database -c :command").build(&connection_params());

    assert!(matches!(
        result,
        Err(CommandError::UnresolvedPlaceholder { tool, placeholder })
            if tool == "psql" && placeholder == "command"
    ));
}

#[test]
fn test_build_resolves_container_template() {
    let invocation = CommandLine::new("pg_restore", "--dbname :database :path")
        .container_template("--dbname :database")
        .stdin("/tmp/dump")
        .build(&connection_params().with("path", "/tmp/dump"))
        .unwrap();

    assert_eq!(invocation.args, vec!["--dbname", "app", "/tmp/dump"]);
    assert_eq!(
        invocation.container_args,
        Some(vec!["--dbname".to_owned(), "app".to_owned()])
    );
    assert_eq!(invocation.stdin, Some("/tmp/dump".into()));
}

#[test]
fn test_colon_without_name_is_literal() {
    let invocation = CommandLine::new("psql", "a: :1 ::database")
        .build(&connection_params())
        .unwrap();

    assert_eq!(invocation.args, vec!["a:", ":1", ":app"]);
}

#[test]
fn test_container_exec_args() {
    let runner = ContainerProcessRunner::new("docker".to_owned(), "pg-container".to_owned());
    let invocation = CommandLine::new("pg_restore", "--host=:host -j 4 :database")
        .container_template("--host=:host :database")
        .envs(env("postgres", "secret"))
        .build(&connection_params())
        .unwrap();

    assert_eq!(
        runner.exec_args(&invocation),
        vec![
            "exec",
            "-e",
            "PGPASSWORD=secret",
            "-e",
            "PGUSER=postgres",
            "-i",
            "pg-container",
            "pg_restore",
            "--host=db.internal",
            "app",
        ]
    );
}

#[test]
fn test_container_exec_args_fall_back_to_direct_args() {
    let runner = ContainerProcessRunner::new("podman".to_owned(), "db".to_owned());
    let invocation = CommandLine::new("psql", "--version")
        .build(&CommandParams::default())
        .unwrap();

    assert_eq!(
        runner.exec_args(&invocation),
        vec!["exec", "-i", "db", "psql", "--version"]
    );
}

#[tokio::test]
async fn test_direct_runner_captures_stdout_and_env() {
    let invocation = CommandLine::new("sh", "-c :script")
        .envs(env("dumper", "secret"))
        .build(&CommandParams::default().with("script", "echo \"$PGUSER\""))
        .unwrap();

    let output = DirectProcessRunner.run(invocation).await.unwrap();
    assert_eq!(output, "dumper\n");
}

#[tokio::test]
async fn test_direct_runner_reports_exit_code_and_stderr() {
    let invocation = CommandLine::new("sh", "-c :script")
        .build(&CommandParams::default().with("script", "echo broken >&2; exit 3"))
        .unwrap();

    let error = DirectProcessRunner.run(invocation).await.unwrap_err();
    assert!(matches!(
        error,
        CommandError::Failed { tool, exit_code: Some(3), stderr }
            if tool == "sh" && stderr == "broken"
    ));
}

#[tokio::test]
async fn test_direct_runner_tolerates_failure_when_asked() {
    let invocation = CommandLine::new("sh", "-c :script")
        .tolerate_failure()
        .build(&CommandParams::default().with("script", "exit 1"))
        .unwrap();

    assert_eq!(DirectProcessRunner.run(invocation).await.unwrap(), "");

    let invocation = CommandLine::new("definitely-not-an-installed-tool", "")
        .tolerate_failure()
        .build(&CommandParams::default())
        .unwrap();

    assert_eq!(DirectProcessRunner.run(invocation).await.unwrap(), "");
}

#[tokio::test]
async fn test_direct_runner_missing_tool() {
    let invocation = CommandLine::new("definitely-not-an-installed-tool", "")
        .build(&CommandParams::default())
        .unwrap();

    assert!(matches!(
        DirectProcessRunner.run(invocation).await,
        Err(CommandError::Spawn { .. })
    ));
}

#[tokio::test]
async fn test_direct_runner_redirects_stdin_and_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.csv");
    let output = dir.path().join("output.csv");
    std::fs::write(&input, "id,name\n1,Pepe\n").unwrap();

    let invocation = CommandLine::new("cat", "")
        .stdin(&input)
        .stdout_to(&output)
        .build(&CommandParams::default())
        .unwrap();

    let captured = DirectProcessRunner.run(invocation).await.unwrap();
    assert_eq!(captured, "");
    assert_eq!(std::fs::read_to_string(output).unwrap(), "id,name\n1,Pepe\n");
}
