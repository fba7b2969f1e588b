// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn empty_config_gets_defaults() {
    let config = Config::from_str("{}").unwrap();
    assert_eq!(config.events.bus.workers, 4);
    assert_eq!(config.events.bus.queue_size, 100);
    assert_eq!(config.events.sse.min_retry_backoff, Duration::from_secs(1));
    assert_eq!(config.events.sse.retry_multiplier, 2.0);
    assert_eq!(config.reconciler.rate_limit_rps, 10.0);
    assert_eq!(config.reconciler.debounce, Duration::from_millis(250));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    assert!(!config.events.webhook.enabled);
    assert!(config.events.scheduler.enabled);
    assert!(!config.events.scheduler.geo.enabled);
    assert_eq!(config.events.scheduler.geo.timezone, "UTC");
}

#[test]
fn full_config_parses() {
    let yaml = r#"
hue:
  bridge: 192.168.1.10
  token: secret-app-key
  timeout: 3s
events:
  sse:
    enabled: true
    min_retry_backoff: 500ms
    max_retry_backoff: 30s
    retry_multiplier: 1.5
    max_reconnects: 12
  webhook:
    enabled: true
    host: 0.0.0.0
    port: 9090
  scheduler:
    enabled: true
    geo:
      enabled: true
      name: "Berlin"
      timezone: Europe/Berlin
      http_timeout: 5s
      use_cache: true
reconciler:
  enabled: true
  periodic_interval: 2m
  rate_limit_rps: 5
  debounce: 100ms
ledger:
  enabled: true
  retention_period: 720h
  retention_interval: 1h
database:
  path: /var/lib/lume/lume.db
shutdown_timeout: 15s
"#;
    let config = Config::from_str(yaml).unwrap();
    assert_eq!(config.hue.bridge, "192.168.1.10");
    assert_eq!(config.hue.timeout, Duration::from_secs(3));
    assert_eq!(config.events.sse.min_retry_backoff, Duration::from_millis(500));
    assert_eq!(config.events.sse.max_reconnects, 12);
    assert_eq!(config.events.webhook.port, 9090);
    assert_eq!(config.events.scheduler.geo.timezone, "Europe/Berlin");
    assert_eq!(config.reconciler.periodic_interval, Duration::from_secs(120));
    assert_eq!(config.ledger.retention_period, Duration::from_secs(720 * 3600));
    assert_eq!(config.database.path, PathBuf::from("/var/lib/lume/lume.db"));
}

#[test]
fn unknown_fields_are_rejected() {
    assert!(Config::from_str("nonsense_key: true").is_err());
    assert!(Config::from_str("hue:\n  bridgee: x").is_err());
}

#[test]
fn bad_duration_is_rejected() {
    assert!(Config::from_str("shutdown_timeout: fast").is_err());
    assert!(Config::from_str("shutdown_timeout: 10").is_err());
}

#[yare::parameterized(
    plain        = { "host: ${WEBHOOK_HOST}", "host: 10.0.0.1" },
    with_default = { "port: ${MISSING_VAR:8080}", "port: 8080" },
    set_over_default = { "host: ${WEBHOOK_HOST:fallback}", "host: 10.0.0.1" },
    multiple     = { "${WEBHOOK_HOST}:${MISSING_VAR:80}", "10.0.0.1:80" },
    empty_default = { "tag: ${MISSING_VAR:}", "tag: " },
    no_substitution = { "plain: text", "plain: text" },
)]
fn env_substitution(input: &str, expected: &str) {
    let lookup = |name: &str| match name {
        "WEBHOOK_HOST" => Some("10.0.0.1".to_string()),
        _ => None,
    };
    assert_eq!(substitute_env(input, lookup).unwrap(), expected);
}

#[test]
fn missing_variable_without_default_errors() {
    let err = substitute_env("x: ${NOPE}", |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::MissingVar(name) if name == "NOPE"));
}

#[test]
fn unterminated_substitution_errors() {
    let err = substitute_env("x: ${NOPE", |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::UnterminatedVar));
}
