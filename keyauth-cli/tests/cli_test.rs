//! Tests for the keyauth CLI commands

use keyauth_cli::{key_difficulty, CliConfig, KeyCommand};
use keyauth_common::{Component, Logger};
use keyauth_keys::{difficulty, IdentityOrigin, KeyScheme};
use std::fs;
use tempfile::TempDir;

fn logger() -> Logger {
    Logger::new_root(Component::Cli, "cli-test")
}

fn config_for(temp_dir: &TempDir) -> CliConfig {
    CliConfig {
        key_dir: Some(temp_dir.path().join("keys")),
        ..CliConfig::default()
    }
}

#[test]
fn test_config_save_and_load() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_dir = temp_dir.path().to_path_buf();

    assert!(!CliConfig::exists(&config_dir));
    assert!(CliConfig::load(&config_dir).is_err());
    assert_eq!(
        CliConfig::load_or_default(&config_dir).unwrap(),
        CliConfig::default()
    );

    let config = CliConfig {
        scheme: KeyScheme::Rsa,
        app_id: Some("node-1".to_string()),
        difficulty: 3,
        ..config_for(&temp_dir)
    };
    config.save(&config_dir).expect("Failed to save config");
    assert!(CliConfig::exists(&config_dir));

    let loaded = CliConfig::load(&config_dir).expect("Failed to load config");
    assert_eq!(loaded, config);
}

#[test]
fn test_corrupt_config_is_reported() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp_dir.path().join("keyauth.json"), "{ not json").unwrap();
    assert!(CliConfig::load(temp_dir.path()).is_err());
}

#[test]
fn test_init_creates_config_and_identity() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let config_dir = temp_dir.path().join("config");
    let command = KeyCommand::new(config_dir.clone(), config_for(&temp_dir), &logger());

    let summary = command.init(false).unwrap().expect("identity created");
    assert!(CliConfig::exists(&config_dir));
    assert_eq!(summary.scheme, KeyScheme::Ecc);
    assert_eq!(summary.key_id, summary.public_key);
    assert!(temp_dir.path().join("keys").join("private_key.pem").is_file());

    // a second init without force leaves things alone
    assert!(command.init(false).unwrap().is_none());

    let shown = command.show().unwrap();
    assert_eq!(shown.key_id, summary.key_id);
    assert_eq!(shown.difficulty, difficulty(&shown.key_id));
}

#[test]
fn test_generate_raises_difficulty() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let command = KeyCommand::new(
        temp_dir.path().to_path_buf(),
        config_for(&temp_dir),
        &logger(),
    );
    let before = command.show().unwrap();
    let after = command.generate(Some(4)).unwrap();
    assert_ne!(before.key_id, after.key_id);
    assert!(after.difficulty >= 4);
    assert_eq!(command.show().unwrap().key_id, after.key_id);
}

#[test]
fn test_generate_on_fresh_directory_mines_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let command = KeyCommand::new(
        temp_dir.path().to_path_buf(),
        config_for(&temp_dir),
        &logger(),
    );

    // the identity created while opening already meets the target
    let generated = command.generate(Some(3)).unwrap();
    assert_eq!(generated.origin, IdentityOrigin::Generated);
    assert!(generated.difficulty >= 3);

    let shown = command.show().unwrap();
    assert_eq!(shown.key_id, generated.key_id);
    assert_eq!(shown.origin, IdentityOrigin::Loaded);
}

#[test]
fn test_export_then_import_into_another_identity() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let source = KeyCommand::new(
        temp_dir.path().to_path_buf(),
        CliConfig {
            app_id: Some("source".to_string()),
            ..config_for(&temp_dir)
        },
        &logger(),
    );
    let target = KeyCommand::new(
        temp_dir.path().to_path_buf(),
        CliConfig {
            app_id: Some("target".to_string()),
            ..config_for(&temp_dir)
        },
        &logger(),
    );

    let exported_private = temp_dir.path().join("export").join("id.pem");
    let exported_public = temp_dir.path().join("export").join("id.pubkey");
    source.export(&exported_private, &exported_public).unwrap();
    let source_id = source.show().unwrap().key_id;

    assert_ne!(target.show().unwrap().key_id, source_id);
    assert_eq!(target.import(&exported_private).unwrap().key_id, source_id);
    assert!(target.import(&temp_dir.path().join("missing.pem")).is_err());
    assert_eq!(target.show().unwrap().key_id, source_id);
}

#[test]
fn test_difficulty_of_foreign_key_id() {
    assert_eq!(key_difficulty("abc"), difficulty("abc"));
}
