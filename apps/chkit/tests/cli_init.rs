use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
#[serial_test::serial(init)]
fn init_creates_migrations_dir_meta_dir_and_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();

    temp.child("migrations").assert(predicate::path::missing());
    temp.child(".chkit").assert(predicate::path::missing());
    temp.child("chkit.toml").assert(predicate::path::missing());

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("init").current_dir(temp.path());
    cmd.assert().success();

    temp.child("migrations").assert(predicate::path::is_dir());
    temp.child(".chkit").assert(predicate::path::is_dir());
    temp.child("chkit.toml").assert(predicate::path::exists());

    Ok(())
}

#[test]
#[serial_test::serial(init)]
fn init_is_idempotent_and_does_not_overwrite_existing_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("chkit.toml")
        .write_str("migrationsDir = \"db\"\nmetaDir = \"db/.chkit\"\n")?;

    let mut cmd = Command::cargo_bin("chkit")?;
    cmd.arg("init").current_dir(temp.path());
    cmd.assert().success();

    let contents = std::fs::read_to_string(temp.child("chkit.toml").path())?;
    assert!(contents.contains("migrationsDir = \"db\""));

    Ok(())
}
