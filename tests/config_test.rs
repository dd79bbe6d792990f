//! Tests for config loading from files and the environment

use serial_test::serial;
use std::io::Write;

use bgpfinder::config::Config;

const ENV_KEYS: &[&str] = &[
    "POSTGRES_HOST",
    "POSTGRES_PORT",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_DB",
    "BGPFINDER_USE_DB",
    "BGPFINDER_SYNC",
    "BGPFINDER_PORT",
    "BGPFINDER_RATE_LIMIT",
    "BGPFINDER_LOG_LEVEL",
    "BGPFINDER_LOG_FORMAT",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_from_env_reads_postgres_variables() {
    clear_env();
    std::env::set_var("BGPFINDER_USE_DB", "true");
    std::env::set_var("POSTGRES_HOST", "db.internal");
    std::env::set_var("POSTGRES_PORT", "6543");
    std::env::set_var("POSTGRES_USER", "bgp");
    std::env::set_var("POSTGRES_PASSWORD", "secret");
    std::env::set_var("POSTGRES_DB", "bgpfinder");

    let config = Config::from_env().unwrap();
    assert!(config.database.enabled);
    assert_eq!(config.database.host, "db.internal");
    assert_eq!(config.database.port, 6543);
    assert_eq!(config.database.dbname.as_deref(), Some("bgpfinder"));
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_missing_credentials_fail_validation() {
    clear_env();
    std::env::set_var("BGPFINDER_USE_DB", "1");
    std::env::set_var("POSTGRES_USER", "bgp");

    let config = Config::from_env().unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("POSTGRES_PASSWORD"), "{err}");

    clear_env();
}

#[test]
#[serial]
fn test_from_file_with_env_override() {
    clear_env();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[http]
rate_limit = 5

[server]
host = "127.0.0.1"
port = 9000

[sync]
backfill_from = 1704067200
"#
    )
    .unwrap();

    std::env::set_var("BGPFINDER_PORT", "9100");
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.http.rate_limit, 5);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.sync.backfill_from, 1_704_067_200);
    assert_eq!(config.archives.ris_data_url, "https://data.ris.ripe.net/");
    assert!(config.validate().is_ok());

    clear_env();
}

#[test]
#[serial]
fn test_logging_from_env() {
    clear_env();
    std::env::set_var("BGPFINDER_LOG_LEVEL", "debug");
    std::env::set_var("BGPFINDER_LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, "json");
    assert_eq!(
        config.logging.filter_directives(false),
        "bgpfinder=debug,bgpf=debug,warn"
    );
    assert!(config.validate().is_ok());

    std::env::set_var("BGPFINDER_LOG_FORMAT", "yaml");
    assert!(Config::from_env().unwrap().validate().is_err());

    clear_env();
}

#[test]
#[serial]
fn test_from_file_errors() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());

    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[server\nport = ").unwrap();
    let err = Config::from_file(&bad).unwrap_err().to_string();
    assert!(err.contains("Failed to parse"), "{err}");
}

#[test]
#[serial]
fn test_invalid_archive_url_rejected() {
    clear_env();
    let mut config = Config::from_env().unwrap();
    config.archives.routeviews_url = "not a url".into();
    assert!(config.validate().is_err());
}
