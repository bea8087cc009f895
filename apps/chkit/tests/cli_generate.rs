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
    "columns": [
      {"name": "id", "type": "UInt64"},
      {"name": "email", "type": "String"}
    ],
    "engine": "MergeTree",
    "primaryKey": ["id"],
    "orderBy": ["id"]
  }
]"#
}

#[test]
#[serial_test::serial(generate)]
fn generate_with_no_schema_json_reports_no_changes() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("generate").current_dir(temp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No tables matched selector").not());

    Ok(())
}

#[test]
#[serial_test::serial(generate)]
fn generate_from_empty_snapshot_writes_a_migration_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("generate").arg("--name").arg("add_users");
    cmd.current_dir(temp.path());
    cmd.assert().success();

    let migrations_dir = temp.child("migrations");
    let entries: Vec<_> = std::fs::read_dir(migrations_dir.path())?.collect::<Result<_, _>>()?;
    assert_eq!(entries.len(), 1, "expected exactly one migration file");
    let sql = std::fs::read_to_string(entries[0].path())?;
    assert!(sql.contains("CREATE TABLE") || sql.to_uppercase().contains("CREATE TABLE"));

    Ok(())
}

#[test]
#[serial_test::serial(generate)]
fn generate_dryrun_does_not_write_a_migration_file() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("generate").arg("--dryrun").current_dir(temp.path());
    cmd.assert().success();

    temp.child("migrations")
        .assert(predicate::path::is_dir());
    let entries: Vec<_> = std::fs::read_dir(temp.child("migrations").path())?.collect::<Result<_, _>>()?;
    assert!(entries.is_empty(), "dryrun must not write a migration file");

    Ok(())
}

#[test]
#[serial_test::serial(generate)]
fn generate_with_empty_table_scope_short_circuits() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    let mut init = Command::cargo_bin("chkit")?;
    init.arg("init").current_dir(temp.path());
    init.assert().success();

    temp.child("schema.json").write_str(users_table_schema())?;

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("--table")
        .arg("")
        .arg("--json")
        .arg("generate")
        .current_dir(temp.path());
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("No tables matched selector"));

    Ok(())
}
