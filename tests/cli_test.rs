use assert_fs::prelude::*;
use predicates::prelude::*;

#[tokio::test]
async fn test_help_runs_without_configuration() {
    let status = tokio::process::Command::new(env!("CARGO_BIN_EXE_schema_crawler"))
        .arg("--help")
        .status()
        .await
        .unwrap();

    assert!(status.success());
}

#[tokio::test]
async fn test_missing_env_file_is_created_from_template() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child(".env.example")
        .write_str("OPENAI_API_KEY=\n")
        .unwrap();

    let status = tokio::process::Command::new(env!("CARGO_BIN_EXE_schema_crawler"))
        .arg("check")
        .current_dir(temp.path())
        .status()
        .await
        .unwrap();

    // The template is copied into place and the process refuses to start
    assert!(!status.success());
    temp.child(".env").assert(predicate::path::exists());
    temp.child(".env").assert("OPENAI_API_KEY=\n");
}

#[tokio::test]
async fn test_unknown_subcommand_fails() {
    let status = tokio::process::Command::new(env!("CARGO_BIN_EXE_schema_crawler"))
        .arg("definitely-not-a-command")
        .status()
        .await
        .unwrap();

    assert!(!status.success());
}
