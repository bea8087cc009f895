use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

fn users_table_schema() -> &'static str {
    r#"[
  {
    "kind": "table",
    "database": "app",
    "name": "users",
    "columns": [{"name": "id", "type": "UInt64"}],
    "engine": "MergeTree",
    "primaryKey": ["id"],
    "orderBy": ["id"]
  }
]"#
}

#[test]
#[serial_test::serial(check)]
fn status_reports_zero_pending_on_a_fresh_project() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("status").current_dir(temp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0 pending"));

    Ok(())
}

#[test]
#[serial_test::serial(check)]
fn check_fails_with_exit_code_1_when_migrations_are_pending() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;
    let mut generate = Command::cargo_bin("chkit")?;
    generate
        .arg("generate")
        .arg("--name")
        .arg("add_users")
        .current_dir(temp.path());
    generate.assert().success();

    // The migration was written but never applied: still pending.
    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("check").current_dir(temp.path());
    cmd.assert().failure().code(1);

    Ok(())
}

#[test]
#[serial_test::serial(check)]
fn check_passes_on_a_fresh_project_with_nothing_pending() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("check").current_dir(temp.path());
    cmd.assert().success();

    Ok(())
}

#[test]
#[serial_test::serial(check)]
fn migrate_without_execute_previews_pending_migrations() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;
    let mut generate = Command::cargo_bin("chkit")?;
    generate
        .arg("generate")
        .arg("--name")
        .arg("add_users")
        .current_dir(temp.path());
    generate.assert().success();

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("migrate").current_dir(temp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 pending migration"));

    Ok(())
}

#[test]
#[serial_test::serial(check)]
fn migrate_execute_without_clickhouse_config_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;
    let mut generate = Command::cargo_bin("chkit")?;
    generate
        .arg("generate")
        .arg("--name")
        .arg("add_users")
        .current_dir(temp.path());
    generate.assert().success();

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("migrate").arg("--execute").current_dir(temp.path());
    cmd.assert().failure();

    Ok(())
}
