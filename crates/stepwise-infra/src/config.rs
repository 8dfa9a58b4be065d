//! Engine configuration loader for Stepwise.
//!
//! Reads `config.toml` from the data directory (`~/.stepwise/` in production)
//! and deserializes it into [`EngineConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::Path;

use stepwise_types::config::EngineConfig;

/// Smallest step timeout accepted from a config file.
const MIN_STEP_TIMEOUT_MS: u64 = 1;

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`EngineConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config
///   with zero values clamped to usable minimums.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => sanitize(config),
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            EngineConfig::default()
        }
    }
}

fn sanitize(mut config: EngineConfig) -> EngineConfig {
    if config.step_timeout_ms < MIN_STEP_TIMEOUT_MS {
        tracing::warn!("step_timeout_ms must be positive, using {MIN_STEP_TIMEOUT_MS}");
        config.step_timeout_ms = MIN_STEP_TIMEOUT_MS;
    }
    if config.max_steps == 0 {
        tracing::warn!("max_steps must be positive, using 1");
        config.max_steps = 1;
    }
    // The broadcast channel rejects a zero capacity.
    config.event_capacity = config.event_capacity.max(1);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_engine_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
step_timeout_ms = 5000
max_steps = 200
user_agent = "acme-flows/2.0"
"#,
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.step_timeout_ms, 5_000);
        assert_eq!(config.max_steps, 200);
        assert_eq!(config.user_agent, "acme-flows/2.0");
        assert_eq!(config.http_timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn load_engine_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn load_engine_config_clamps_zero_values() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "step_timeout_ms = 0\nmax_steps = 0\nevent_capacity = 0\n",
        )
        .await
        .unwrap();

        let config = load_engine_config(tmp.path()).await;
        assert_eq!(config.step_timeout_ms, 1);
        assert_eq!(config.max_steps, 1);
        assert_eq!(config.event_capacity, 1);
    }
}
