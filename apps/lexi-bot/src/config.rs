use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use lexi_queue::QueueConfig;
use serde::{Deserialize, Serialize};

pub const ENV_WORDS_PATH: &str = "LEXI_WORDS_PATH";
pub const ENV_STORE_PATH: &str = "LEXI_STORE_PATH";
pub const ENV_SAVE_INTERVAL_SECS: &str = "LEXI_SAVE_INTERVAL_SECS";
pub const ENV_HARD_UNLOCK: &str = "LEXI_HARD_UNLOCK";
pub const ENV_LOG_DIR: &str = lexi_otel::ENV_LOG_DIR;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub words_path: PathBuf,
    pub store_path: PathBuf,
    /// Periodic store flush; 0 disables it (the store is still saved on shutdown).
    pub save_interval_secs: u64,
    /// Easy words a user must request before hard words are offered.
    pub hard_unlock_threshold: u32,
    pub log_dir: Option<PathBuf>,
    pub queue: QueueConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            words_path: PathBuf::from("easy-words.txt"),
            store_path: PathBuf::from("user_db.json"),
            save_interval_secs: 600,
            hard_unlock_threshold: 15,
            log_dir: None,
            queue: QueueConfig::default().with_name("bot"),
        }
    }
}

/// Command-line overrides; these win over the environment and the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// TOML config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Word list, one word per line
    #[arg(long)]
    pub words: Option<PathBuf>,
    /// JSON user store
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// Seconds between store flushes (0 disables)
    #[arg(long)]
    pub save_interval_secs: Option<u64>,
    /// Directory for the persistent log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(content)?;
        if let Some(queue) = raw.get("queue") {
            lexi_queue::validate_toml(queue)?;
        }
        Ok(toml::from_str(content)?)
    }

    /// File (if given), then `LEXI_*` environment, then command-line flags.
    pub fn resolve(args: &ConfigArgs) -> Result<Self> {
        let mut cfg = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.apply_args(args);
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value(ENV_WORDS_PATH) {
            self.words_path = PathBuf::from(path);
        }
        if let Some(path) = env_value(ENV_STORE_PATH) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(secs) = env_value(ENV_SAVE_INTERVAL_SECS) {
            self.save_interval_secs = secs
                .parse()
                .with_context(|| format!("{ENV_SAVE_INTERVAL_SECS}={secs:?}"))?;
        }
        if let Some(threshold) = env_value(ENV_HARD_UNLOCK) {
            self.hard_unlock_threshold = threshold
                .parse()
                .with_context(|| format!("{ENV_HARD_UNLOCK}={threshold:?}"))?;
        }
        if let Some(dir) = env_value(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        self.queue.apply_env()?;
        Ok(())
    }

    fn apply_args(&mut self, args: &ConfigArgs) {
        if let Some(words) = &args.words {
            self.words_path = words.clone();
        }
        if let Some(store) = &args.store {
            self.store_path = store.clone();
        }
        if let Some(secs) = args.save_interval_secs {
            self.save_interval_secs = secs;
        }
        if let Some(dir) = &args.log_dir {
            self.log_dir = Some(dir.clone());
        }
    }

    pub fn save_interval(&self) -> Option<Duration> {
        (self.save_interval_secs > 0).then(|| Duration::from_secs(self.save_interval_secs))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
