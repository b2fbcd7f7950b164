use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::error::FegridError;

/// Maps a level name to a tracing level, falling back to info
pub fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs a stderr subscriber so that stdout carries only program output
pub fn init(level_name: &str) -> Result<(), FegridError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(level_name))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    match tracing::subscriber::set_global_default(subscriber) {
        Ok(()) => Ok(()),
        Err(err) => Err(FegridError::Input(format!(
            "Unable to install log subscriber: {err}"
        ))),
    }
}
