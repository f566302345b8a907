use std::path::Path;
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

pub const ENV_QUEUE_NAME: &str = "LEXI_QUEUE_NAME";
pub const ENV_SLOW_WARN_MS: &str = "LEXI_QUEUE_SLOW_WARN_MS";

fn default_name() -> String {
    "serial".to_string()
}

/// Tunables for a [`SerialQueue`](crate::SerialQueue).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Label attached to every log line the queue emits.
    #[serde(default = "default_name")]
    #[schemars(length(min = 1))]
    pub name: String,
    /// Warn once when a single task has been running longer than this many
    /// milliseconds. The task is not interrupted.
    #[serde(default)]
    #[schemars(range(min = 1))]
    pub slow_task_warn_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            slow_task_warn_ms: None,
        }
    }
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema_value = config_schema_json();
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing [`QueueConfig`].
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(QueueConfig);
    serde_json::to_value(&schema).expect("schema json")
}

/// Checks an already-parsed TOML table against the queue schema.
pub fn validate_toml(raw: &toml::Value) -> Result<(), QueueError> {
    let json_value =
        serde_json::to_value(raw).map_err(|err| QueueError::Parse(err.to_string()))?;
    let validation_errors: Vec<String> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(QueueError::Invalid(validation_errors));
    }
    Ok(())
}

impl QueueConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, QueueError> {
        let raw: toml::Value =
            toml::from_str(content).map_err(|err| QueueError::Parse(err.to_string()))?;
        validate_toml(&raw)?;
        let cfg: QueueConfig =
            toml::from_str(content).map_err(|err| QueueError::Parse(err.to_string()))?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Applies `LEXI_QUEUE_*` overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<(), QueueError> {
        if let Ok(name) = std::env::var(ENV_QUEUE_NAME) {
            let name = name.trim();
            if !name.is_empty() {
                self.name = name.to_string();
            }
        }
        if let Ok(raw) = std::env::var(ENV_SLOW_WARN_MS) {
            self.slow_task_warn_ms = match raw.trim() {
                "" | "0" | "off" => None,
                value => Some(value.parse::<u64>().map_err(|_| {
                    QueueError::Invalid(vec![format!(
                        "{ENV_SLOW_WARN_MS} must be a whole number of milliseconds, got {value:?}"
                    )])
                })?),
            };
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_slow_task_warning(mut self, after: Duration) -> Self {
        let ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
        self.slow_task_warn_ms = Some(ms.max(1));
        self
    }

    pub(crate) fn slow_task_threshold(&self) -> Option<Duration> {
        self.slow_task_warn_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard(Vec<(&'static str, Option<String>)>);

    impl EnvGuard {
        fn set(pairs: &[(&'static str, &str)]) -> Self {
            let saved = pairs
                .iter()
                .map(|(k, _)| (*k, std::env::var(k).ok()))
                .collect();
            for (k, v) in pairs {
                std::env::set_var(k, v);
            }
            Self(saved)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, val) in self.0.drain(..) {
                match val {
                    Some(v) => std::env::set_var(key, v),
                    None => std::env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = QueueConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, QueueConfig::default());
    }

    #[test]
    fn parses_all_fields() {
        let cfg = QueueConfig::from_toml_str("name = \"bot\"\nslow_task_warn_ms = 250\n").unwrap();
        assert_eq!(cfg.name, "bot");
        assert_eq!(cfg.slow_task_threshold(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let err = QueueConfig::from_toml_str("capacity = 10\n").unwrap_err();
        assert!(matches!(err, QueueError::Invalid(_)), "{err}");

        let err = QueueConfig::from_toml_str("name = \"\"\n").unwrap_err();
        assert!(matches!(err, QueueError::Invalid(_)), "{err}");

        let err = QueueConfig::from_toml_str("slow_task_warn_ms = \"soon\"\n").unwrap_err();
        assert!(matches!(err, QueueError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = QueueConfig::from_toml_str("name = ").unwrap_err();
        assert!(matches!(err, QueueError::Parse(_)), "{err}");
    }

    #[test]
    fn slow_warning_saturates_instead_of_wrapping() {
        let huge = QueueConfig::default().with_slow_task_warning(Duration::MAX);
        assert_eq!(huge.slow_task_warn_ms, Some(u64::MAX));
        let zero = QueueConfig::default().with_slow_task_warning(Duration::ZERO);
        assert_eq!(zero.slow_task_warn_ms, Some(1));
        let plain = QueueConfig::default().with_slow_task_warning(Duration::from_millis(250));
        assert_eq!(plain.slow_task_threshold(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        std::fs::write(&path, "name = \"from-file\"\n").unwrap();
        let cfg = QueueConfig::load(&path).unwrap();
        assert_eq!(cfg.name, "from-file");

        let missing = QueueConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, QueueError::Io(_)));
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        let _guard = EnvGuard::set(&[(ENV_QUEUE_NAME, "env-queue"), (ENV_SLOW_WARN_MS, "40")]);
        let mut cfg = QueueConfig::default();
        cfg.apply_env().unwrap();
        assert_eq!(cfg.name, "env-queue");
        assert_eq!(cfg.slow_task_warn_ms, Some(40));
    }

    #[test]
    #[serial]
    fn env_override_can_disable_warning() {
        let _guard = EnvGuard::set(&[(ENV_SLOW_WARN_MS, "off")]);
        let mut cfg = QueueConfig::default().with_slow_task_warning(Duration::from_secs(1));
        cfg.apply_env().unwrap();
        assert_eq!(cfg.slow_task_warn_ms, None);
    }

    #[test]
    #[serial]
    fn env_override_rejects_garbage() {
        let _guard = EnvGuard::set(&[(ENV_SLOW_WARN_MS, "later")]);
        let mut cfg = QueueConfig::default();
        assert!(matches!(cfg.apply_env(), Err(QueueError::Invalid(_))));
    }

    #[test]
    fn schema_mentions_fields() {
        let schema = config_schema_json();
        let props = schema.get("properties").unwrap();
        assert!(props.get("name").is_some());
        assert!(props.get("slow_task_warn_ms").is_some());
    }
}
