//! Structured logging (§10.1), configured once at process start from a
//! `LoggerSettings` struct. `RUST_LOG` is honored through `EnvFilter` on
//! top of the configured default level.

use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggerLevel {
    #[serde(alias = "DEBUG", alias = "debug")]
    Debug,
    #[serde(alias = "INFO", alias = "info")]
    Info,
    #[serde(alias = "WARN", alias = "warn")]
    Warn,
    #[serde(alias = "ERROR", alias = "error")]
    Error,
}

impl LoggerLevel {
    pub fn to_tracing_level(self) -> LevelFilter {
        match self {
            LoggerLevel::Debug => LevelFilter::DEBUG,
            LoggerLevel::Info => LevelFilter::INFO,
            LoggerLevel::Warn => LevelFilter::WARN,
            LoggerLevel::Error => LevelFilter::ERROR,
        }
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        LoggerLevel::Info
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl Default for LogFormat {
    fn default() -> Self {
        LogFormat::Text
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct LoggerSettings {
    #[serde(default)]
    pub level: LoggerLevel,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub stdout: bool,
}

/// Installs the global `tracing` subscriber. Call exactly once at process
/// start, before the Tokio runtime is built.
pub fn setup_logging(settings: &LoggerSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_tracing_level().to_string()));

    if settings.stdout {
        install(env_filter, settings.format, tracing_subscriber::fmt::layer().with_writer(std::io::stdout));
    } else {
        install(env_filter, settings.format, tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    }
}

fn install<W>(
    env_filter: EnvFilter,
    format: LogFormat,
    layer: tracing_subscriber::fmt::Layer<tracing_subscriber::Registry, tracing_subscriber::fmt::format::DefaultFields, tracing_subscriber::fmt::format::Format, W>,
) where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = layer.with_target(true).with_level(true);
    if format == LogFormat::Json {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.compact())
            .try_init();
    }
}
