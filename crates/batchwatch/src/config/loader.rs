use std::path::Path;

use crate::config::schema::{CoordinatorConfig, ReconnectPolicy};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CoordinatorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<CoordinatorConfig, ConfigError> {
    let config: CoordinatorConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

pub fn validate_config(config: &CoordinatorConfig) -> Result<(), ConfigError> {
    // Validate event stream endpoint
    let base_url = config.event_stream.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(format!(
            "eventStream.baseUrl must be an http(s) URL, got '{}'",
            crate::sanitize::redact_url(base_url)
        )));
    }

    if let ReconnectPolicy::Backoff {
        initial_delay_ms,
        max_delay_ms,
        ..
    } = config.event_stream.reconnect
    {
        if initial_delay_ms == 0 || max_delay_ms == 0 {
            return Err(invalid("reconnect delays must be greater than zero"));
        }
        if max_delay_ms < initial_delay_ms {
            return Err(invalid(format!(
                "reconnect maxDelayMs ({}) is smaller than initialDelayMs ({})",
                max_delay_ms, initial_delay_ms
            )));
        }
    }

    // Validate simulation parameters
    let sim = &config.simulation;
    if sim.tick_interval_ms == 0 {
        return Err(invalid("simulation.tickIntervalMs must be greater than zero"));
    }
    if sim.ceiling == 0 || sim.ceiling > 99 {
        return Err(invalid(format!(
            "simulation.ceiling must be between 1 and 99, got {}",
            sim.ceiling
        )));
    }
    if sim.step == 0 || sim.step > sim.ceiling {
        return Err(invalid(format!(
            "simulation.step must be between 1 and the ceiling ({}), got {}",
            sim.ceiling, sim.step
        )));
    }

    if config.notifications.capacity == 0 {
        return Err(invalid("notifications.capacity must be greater than zero"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(
            r#"{ "eventStream": { "baseUrl": "https://api.example.com" } }"#,
        )
        .unwrap();
        assert_eq!(config.event_stream.base_url, "https://api.example.com");
        assert!(config.event_stream.user_id.is_none());
        assert_eq!(config.simulation.ceiling, 95);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "eventStream": {
                "baseUrl": "http://localhost:8080/api",
                "userId": "user-7",
                "reconnect": { "mode": "backoff", "initialDelayMs": 500, "maxDelayMs": 8000 }
            },
            "simulation": { "tickIntervalMs": 250, "step": 5, "ceiling": 90 },
            "storage": {
                "databasePath": "/tmp/bw/state.db",
                "blobDirectory": "/tmp/bw/blobs"
            },
            "notifications": { "capacity": 16 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.event_stream.user_id.as_deref(), Some("user-7"));
        assert_eq!(config.simulation.tick_interval_ms, 250);
        assert_eq!(config.simulation.step, 5);
        assert_eq!(config.storage.blob_directory, Path::new("/tmp/bw/blobs"));
        assert_eq!(config.notifications.capacity, 16);
        assert!(matches!(
            config.event_stream.reconnect,
            ReconnectPolicy::Backoff { max_attempts: None, .. }
        ));
    }

    #[test]
    fn test_missing_base_url() {
        let result = load_config_from_str(r#"{ "eventStream": {} }"#);
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_non_http_base_url() {
        let result = load_config_from_str(r#"{ "eventStream": { "baseUrl": "ws://x" } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_simulation() {
        for simulation in [
            r#"{ "tickIntervalMs": 0 }"#,
            r#"{ "ceiling": 100 }"#,
            r#"{ "ceiling": 0 }"#,
            r#"{ "step": 0 }"#,
            r#"{ "step": 50, "ceiling": 40 }"#,
        ] {
            let json = format!(
                r#"{{ "eventStream": {{ "baseUrl": "https://x" }}, "simulation": {} }}"#,
                simulation
            );
            let result = load_config_from_str(&json);
            assert!(
                matches!(result, Err(ConfigError::Validation { .. })),
                "accepted {}",
                simulation
            );
        }
    }

    #[test]
    fn test_invalid_backoff() {
        let result = load_config_from_str(
            r#"{ "eventStream": { "baseUrl": "https://x",
                 "reconnect": { "mode": "backoff", "initialDelayMs": 1000, "maxDelayMs": 10 } } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config(dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batchwatch.json");
        std::fs::write(&path, r#"{ "eventStream": { "baseUrl": "https://x" } }"#).unwrap();
        assert!(load_config(&path).is_ok());
    }
}
