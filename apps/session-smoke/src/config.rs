//! Environment-backed runtime configuration for `session-smoke`.

use std::{env, error::Error, fmt, path::PathBuf, time::Duration};

use chat_core::SessionTuning;

const DEFAULT_DATA_DIR: &str = "./.chat-session-smoke-store";

/// Runtime configuration used by the smoke driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeConfig {
    /// Directory holding persisted per-conversation interface state.
    pub data_dir: PathBuf,
    /// Session tuning forwarded to `spawn_session`.
    pub tuning: SessionTuning,
    /// Artificial latency of the in-memory collaborators. `None` answers synchronously.
    pub platform_latency: Option<Duration>,
    /// Discard persisted interface state before the run.
    pub reset_state: bool,
}

impl SmokeConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let data_dir = optional_trimmed_env("CHAT_SESSION_DATA_DIR", &mut lookup)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let defaults = SessionTuning::default();
        let tuning = SessionTuning {
            history_fetch_count: parse_positive_usize(
                "CHAT_SESSION_HISTORY_FETCH_COUNT",
                defaults.history_fetch_count,
                &mut lookup,
            )?,
            toast_duration_ms: parse_positive_u64(
                "CHAT_SESSION_TOAST_DURATION_MS",
                defaults.toast_duration_ms,
                &mut lookup,
            )?,
            window_max_items: parse_positive_usize(
                "CHAT_SESSION_WINDOW_MAX_ITEMS",
                defaults.window_max_items,
                &mut lookup,
            )?,
            recording_tick_ms: parse_positive_u64(
                "CHAT_SESSION_RECORDING_TICK_MS",
                defaults.recording_tick_ms,
                &mut lookup,
            )?,
            ..defaults
        };

        let platform_latency = parse_optional_u64("CHAT_SESSION_PLATFORM_LATENCY_MS", &mut lookup)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let reset_state = match optional_trimmed_env("CHAT_SESSION_RESET_STATE", &mut lookup) {
            None => false,
            Some(value) => parse_flag("CHAT_SESSION_RESET_STATE", value)?,
        };

        Ok(Self {
            data_dir,
            tuning,
            platform_latency,
            reset_state,
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_optional_u64<F>(key: &'static str, lookup: &mut F) -> Result<Option<u64>, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(None);
    };
    value
        .parse::<u64>()
        .map(Some)
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn parse_positive_u64<F>(key: &'static str, default: u64, lookup: &mut F) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    match parse_optional_u64(key, lookup)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::InvalidValue {
            key,
            value: "0".to_owned(),
            reason: "must be at least 1".to_owned(),
        }),
        Some(value) => Ok(value),
    }
}

fn parse_positive_usize<F>(
    key: &'static str,
    default: usize,
    lookup: &mut F,
) -> Result<usize, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = parse_positive_u64(key, default as u64, lookup)?;
    usize::try_from(value).map_err(|err| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: err.to_string(),
    })
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected a boolean".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from_pairs(pairs: &[(&str, &str)]) -> Result<SmokeConfig, ConfigError> {
        let map = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();
        SmokeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = config_from_pairs(&[]).expect("empty config should parse");

        assert_eq!(cfg.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(cfg.tuning, SessionTuning::default());
        assert_eq!(cfg.platform_latency, None);
        assert!(!cfg.reset_state);
    }

    #[test]
    fn parses_tuning_overrides() {
        let cfg = config_from_pairs(&[
            ("CHAT_SESSION_DATA_DIR", " /tmp/session "),
            ("CHAT_SESSION_HISTORY_FETCH_COUNT", "20"),
            ("CHAT_SESSION_TOAST_DURATION_MS", "1500"),
            ("CHAT_SESSION_WINDOW_MAX_ITEMS", "80"),
            ("CHAT_SESSION_RECORDING_TICK_MS", "100"),
            ("CHAT_SESSION_PLATFORM_LATENCY_MS", "15"),
            ("CHAT_SESSION_RESET_STATE", "yes"),
        ])
        .expect("config should parse");

        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/session"));
        assert_eq!(cfg.tuning.history_fetch_count, 20);
        assert_eq!(cfg.tuning.toast_duration_ms, 1_500);
        assert_eq!(cfg.tuning.window_max_items, 80);
        assert_eq!(cfg.tuning.recording_tick_ms, 100);
        assert_eq!(
            cfg.tuning.command_buffer,
            SessionTuning::default().command_buffer
        );
        assert_eq!(cfg.platform_latency, Some(Duration::from_millis(15)));
        assert!(cfg.reset_state);
    }

    #[test]
    fn zero_latency_means_synchronous_answers() {
        let cfg = config_from_pairs(&[("CHAT_SESSION_PLATFORM_LATENCY_MS", "0")])
            .expect("config should parse");
        assert_eq!(cfg.platform_latency, None);
    }

    #[test]
    fn rejects_zero_tuning_values() {
        let err = config_from_pairs(&[("CHAT_SESSION_WINDOW_MAX_ITEMS", "0")])
            .expect_err("zero window should be rejected");
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "CHAT_SESSION_WINDOW_MAX_ITEMS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            }
        );
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = config_from_pairs(&[("CHAT_SESSION_RECORDING_TICK_MS", "fast")])
            .expect_err("non-numeric tick should be rejected");
        assert!(err.to_string().contains("CHAT_SESSION_RECORDING_TICK_MS"));

        let err = config_from_pairs(&[("CHAT_SESSION_RESET_STATE", "maybe")])
            .expect_err("invalid flag should be rejected");
        assert!(err.to_string().contains("expected a boolean"));
    }
}
