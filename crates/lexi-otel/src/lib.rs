use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

pub const ENV_LOG_DIR: &str = "LEXI_LOG_DIR";
pub const ENV_LOG_ROTATION: &str = "LEXI_LOG_ROTATION";
pub const LIFECYCLE_TARGET: &str = "lexi.lifecycle";

const DEFAULT_PREFIX: &str = "lexi";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
}

impl Rotation {
    /// Unknown values fall back to daily rotation.
    pub fn from_slug(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "minutely" => Rotation::Minutely,
            "hourly" => Rotation::Hourly,
            _ => Rotation::Daily,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogOptions {
    /// Directory for the persistent log file; console only when `None`.
    pub log_dir: Option<PathBuf>,
    pub rotation: Rotation,
    pub file_prefix: String,
    /// Filter used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            rotation: Rotation::default(),
            file_prefix: DEFAULT_PREFIX.to_string(),
            default_filter: "info".to_string(),
        }
    }
}

impl LogOptions {
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Some(dir) = std::env::var(ENV_LOG_DIR).ok().filter(|d| !d.trim().is_empty()) {
            opts.log_dir = Some(PathBuf::from(dir));
        }
        if let Ok(rotation) = std::env::var(ENV_LOG_ROTATION) {
            opts.rotation = Rotation::from_slug(&rotation);
        }
        opts
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(opts: &LogOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.default_filter.as_str()));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    match opts.log_dir.as_deref() {
        Some(dir) => {
            let writer = file_writer(dir, &opts.file_prefix, opts.rotation);
            let (nb, guard) = tracing_appender::non_blocking(writer);
            let _ = FILE_GUARD.set(guard);
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(nb)
                .with_filter(file_targets());
            let _ = registry.with(file_layer).try_init();
        }
        None => {
            let _ = registry.try_init();
        }
    }
}

/// The log file keeps warnings, errors and lifecycle markers.
fn file_targets() -> Targets {
    Targets::new()
        .with_target(LIFECYCLE_TARGET, tracing::Level::INFO)
        .with_default(tracing::Level::WARN)
}

fn file_writer(
    dir: &Path,
    prefix: &str,
    rotation: Rotation,
) -> tracing_appender::rolling::RollingFileAppender {
    if std::fs::create_dir_all(dir).is_err() {
        tracing::warn!(directory = %dir.display(), "failed to create log directory");
    }
    match rotation {
        Rotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        Rotation::Minutely => tracing_appender::rolling::minutely(dir, prefix),
        Rotation::Daily => tracing_appender::rolling::daily(dir, prefix),
    }
}

/// Records that the process (re)started.
pub fn mark_restart() {
    tracing::info!(
        target: LIFECYCLE_TARGET,
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "APPLICATION RESTARTED"
    );
}
