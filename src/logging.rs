//! Logging bootstrap for the hosting process

use crate::config::LogConfig;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global tracing subscriber.
///
/// Logs go to stdout (as JSON lines when `config.json` is set), and
/// additionally to a daily rolling `trunkstore.log` when `config.dir` is
/// set. `RUST_LOG` directives are honored on top of the configured level.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let log_level = config
        .level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    let file_layer = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, "trunkstore.log");
            Some(fmt::layer().with_writer(file_appender).with_ansi(false))
        }
        None => None,
    };

    let stdout_layer = (!config.json).then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(config.ansi)
    });
    let json_layer = config
        .json
        .then(|| fmt::layer().json().with_writer(std::io::stdout));

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(json_layer)
        .with(file_layer)
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .try_init()?;

    Ok(())
}
