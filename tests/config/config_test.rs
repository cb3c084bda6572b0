//! Coverage for config parsing, env overrides, and validation.

use std::collections::HashMap;
use std::path::Path;

use keygate::config::{Config, ConfigError, MAX_CACHE_TTL_SECS};

const SECURED: &str = r#"
[security]
enabled = true
master_principal = "keygate"

[security.authorization]
enabled = true
extension = "in-memory"
cache_max_entries = 500
cache_ttl_secs = 30

[security.authorization.extension_properties]
realm = "EXAMPLE.COM"

[bootstrap]
timeout_secs = 10
"#;

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("keygate.toml");
    std::fs::write(&path, contents).expect("write config");
    path
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn file_values_are_loaded() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);

    let config = Config::load_with(Some(&path), env_of(&[])).expect("load");
    let authz = &config.security.authorization;
    assert!(config.security.authorization_enabled());
    assert_eq!(authz.extension.as_deref(), Some("in-memory"));
    assert_eq!(authz.cache_max_entries, 500);
    assert_eq!(authz.cache_ttl_secs, 30);
    assert_eq!(
        authz.extension_properties.get("realm").map(String::as_str),
        Some("EXAMPLE.COM")
    );
    assert_eq!(config.bootstrap.timeout_secs, 10);
    assert_eq!(config.bootstrap.poll_interval_ms, 50);
}

#[test]
fn env_beats_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);

    let env = env_of(&[
        ("KEYGATE_AUTHORIZATION_ENABLED", "false"),
        ("KEYGATE_CACHE_MAX_ENTRIES", "0"),
        ("KEYGATE_MASTER_PRINCIPAL", "admin"),
        ("KEYGATE_LOG_LEVEL", "debug"),
    ]);
    let config = Config::load_with(Some(&path), env).expect("load");
    assert!(!config.security.authorization_enabled());
    assert_eq!(config.security.authorization.cache_max_entries, 0);
    assert_eq!(config.security.master_principal.as_deref(), Some("admin"));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn unparsable_env_value_is_ignored() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);

    let config = Config::load_with(Some(&path), env_of(&[("KEYGATE_CACHE_TTL_SECS", "soon")]))
        .expect("load");
    assert_eq!(config.security.authorization.cache_ttl_secs, 30);
}

#[test]
fn config_path_env_is_discovered() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);
    let path_str = path.to_str().expect("utf-8 path");

    let config = Config::load_with(None, env_of(&[("KEYGATE_CONFIG_PATH", path_str)]))
        .expect("load");
    assert_eq!(config.security.authorization.cache_max_entries, 500);
}

#[test]
fn negative_cache_size_is_invalid() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        tmp.path(),
        "[security.authorization]\ncache_max_entries = -1\n",
    );

    let err = Config::load_with(Some(&path), env_of(&[])).expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cache_max_entries")));
}

#[test]
fn negative_cache_size_from_env_is_invalid() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);

    let err = Config::load_with(Some(&path), env_of(&[("KEYGATE_CACHE_MAX_ENTRIES", "-10")]))
        .expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn zero_ttl_with_cache_is_invalid() {
    let toml = "[security.authorization]\ncache_max_entries = 10\ncache_ttl_secs = 0\n";
    let config = Config::from_toml(toml).expect("parse");
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn oversized_ttl_is_invalid() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), SECURED);

    let err = Config::load_with(
        Some(&path),
        env_of(&[("KEYGATE_CACHE_TTL_SECS", &u64::MAX.to_string())]),
    )
    .expect_err("invalid");
    assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("cache_ttl_secs")));
}

#[test]
fn ttl_at_the_cap_is_accepted() {
    let toml = format!(
        "[security.authorization]\ncache_max_entries = 10\ncache_ttl_secs = {MAX_CACHE_TTL_SECS}\n"
    );
    let config = Config::from_toml(&toml).expect("parse");
    assert!(config.validate().is_ok());
}

#[test]
fn empty_master_principal_is_invalid() {
    let config = Config::from_toml("[security]\nmaster_principal = \"  \"\n").expect("parse");
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn missing_explicit_file_is_a_read_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let err = Config::load_with(Some(&tmp.path().join("absent.toml")), env_of(&[]))
        .expect_err("missing");
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = write_config(tmp.path(), "[security\nenabled = ");
    let err = Config::load_with(Some(&path), env_of(&[])).expect_err("malformed");
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn config_serializes_for_check_output() {
    let config = Config::from_toml(SECURED).expect("parse");
    let json = serde_json::to_value(&config).expect("serialize");
    assert_eq!(json["security"]["authorization"]["extension"], "in-memory");
    assert_eq!(json["bootstrap"]["timeout_secs"], 10);
}
