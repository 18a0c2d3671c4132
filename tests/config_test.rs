use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tollgate::{Config, GateBuilder, TollgateError};

const FULL_CONFIG: &str = r#"
[limiter]
tokens_per_second = 0.5
burst_capacity = 3
adaptive = false
min_rate = 0.1
max_rate = 1.0
success_threshold = 5
failure_threshold = 3

[backoff]
base_backoff_secs = 2.5
max_backoff_secs = 30
multiplier = 1.5
jitter_factor = 0.2
max_retries = 3

[cache]
max_memory_entries = 250
ttl_secs = 600
namespace = "listings"
require_durable = true

[http]
base_url = "https://api.example.com/search"
timeout_secs = 10
api_key_header = "x-rapidapi-key"

[http.headers]
"x-rapidapi-host" = "api.example.com"
"#;

#[test]
fn full_config_parses() {
    let config = Config::from_toml_str(FULL_CONFIG).unwrap();

    assert_eq!(config.limiter.tokens_per_second, 0.5);
    assert_eq!(config.limiter.burst_capacity, 3);
    assert!(!config.limiter.adaptive);
    assert_eq!(config.limiter.effective_min_rate(), 0.1);
    assert_eq!(config.limiter.effective_max_rate(), 1.0);
    assert_eq!(config.limiter.failure_threshold, 3);

    assert_eq!(config.backoff.base_backoff, Duration::from_millis(2500));
    assert_eq!(config.backoff.max_retries, 3);

    assert_eq!(config.cache.max_memory_entries, 250);
    assert_eq!(config.cache.ttl, Duration::from_secs(600));
    assert_eq!(config.cache.namespace.as_deref(), Some("listings"));
    assert!(config.cache.require_durable);

    assert_eq!(
        config.http.base_url.as_deref(),
        Some("https://api.example.com/search")
    );
    assert_eq!(config.http.timeout, Duration::from_secs(10));
    assert_eq!(config.http.api_key_header, "x-rapidapi-key");
    assert_eq!(
        config.http.headers.get("x-rapidapi-host").map(String::as_str),
        Some("api.example.com")
    );
}

#[test]
fn load_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[limiter]\nburst_capacity = 7\n").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.limiter.burst_capacity, 7);
    assert_eq!(config.limiter.tokens_per_second, 0.2);
}

#[test]
fn missing_file_is_configuration_error() {
    let err = Config::load(&PathBuf::from("/definitely/not/here.toml")).unwrap_err();
    assert!(matches!(err, TollgateError::Configuration(_)));
}

#[test]
fn invalid_values_are_rejected() {
    for toml in [
        "[limiter]\ntokens_per_second = 0\n",
        "[limiter]\nburst_capacity = 0\n",
        "[limiter]\ntokens_per_second = 2.0\nmax_rate = 1.0\n",
        "[backoff]\nmultiplier = 0.5\n",
        "[cache]\nmax_memory_entries = 0\n",
        "[cache]\nunknown_key = 1\n",
    ] {
        assert!(Config::from_toml_str(toml).is_err(), "accepted: {toml}");
    }
}

#[test]
fn builder_from_config_builds_http_gate() {
    let config = Config::from_toml_str(FULL_CONFIG).unwrap();
    let gate = GateBuilder::from_config(config).build().unwrap();

    assert_eq!(gate.transport_name(), "http");
    assert_eq!(gate.controller().current_rate(), 0.5);
    assert_eq!(gate.controller().bucket().capacity(), 3);
    let cache = gate.cache().unwrap();
    assert_eq!(cache.default_ttl(), Duration::from_secs(600));
    assert!(cache.disk_dir().is_none());
}

#[test]
fn builder_without_base_url_fails() {
    let err = GateBuilder::from_config(Config::default()).build().unwrap_err();
    assert!(matches!(err, TollgateError::Configuration(_)));
}
