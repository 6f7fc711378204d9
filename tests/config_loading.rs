use std::io::Write;

use dagflow_core::config::{AppConfig, OverwritePolicy};
use dagflow_core::FlowError;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
fail_fast = false
fail_on_missing_input = true
overwrite_policy = "first_wins"

[store]
path = "/var/lib/dagflow/runs.db"

[gateway]
bind = "0.0.0.0:9999"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(!config.engine.fail_fast);
    assert!(config.engine.fail_on_missing_input);
    assert_eq!(config.engine.overwrite_policy, OverwritePolicy::FirstWins);
    assert_eq!(
        config.store_path(),
        std::path::PathBuf::from("/var/lib/dagflow/runs.db")
    );

    let gw = config.gateway.expect("gateway present");
    assert_eq!(gw.bind, "0.0.0.0:9999");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("DAGFLOW_TEST_BIND", "127.0.0.1:4040");

    let toml_content = r#"
[gateway]
bind = "${DAGFLOW_TEST_BIND}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.gateway.expect("gateway present").bind, "127.0.0.1:4040");

    std::env::remove_var("DAGFLOW_TEST_BIND");
}

#[test]
fn test_empty_config_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert!(config.engine.fail_fast);
    assert!(!config.engine.fail_on_missing_input);
    assert_eq!(config.engine.overwrite_policy, OverwritePolicy::LastWins);
    assert!(config.gateway.is_none());
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let err = AppConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, FlowError::ConfigNotFound(_)));
}

#[test]
fn test_invalid_overwrite_policy_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine]\noverwrite_policy = \"random\"\n")
        .expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, FlowError::Config(_)));
}
