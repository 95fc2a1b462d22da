use flexi_logger::FlexiLoggerError;
use std::io;
use std::time::Duration;
use thiserror::Error;
use zbus::fdo;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum App {
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Playback controller is not running")]
    ControllerUnavailable,

    #[error("Decoder failure: {0}")]
    DecoderFailure(String),

    #[error("Decoder was not ready after {0:?}")]
    PrepareTimeout(Duration),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logger initialization error: {0}")]
    Logger(String),

    #[error("GStreamer initialization error: {0}")]
    Init(String),

    #[error("ZBus error: {0}")]
    ZBus(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<io::Error> for App {
    fn from(error: io::Error) -> Self {
        App::Io(error.to_string())
    }
}

impl From<toml::de::Error> for App {
    fn from(error: toml::de::Error) -> Self {
        App::Config(error.to_string())
    }
}

impl From<FlexiLoggerError> for App {
    fn from(error: FlexiLoggerError) -> Self {
        App::Logger(error.to_string())
    }
}

impl From<zbus::Error> for App {
    fn from(error: zbus::Error) -> Self {
        App::ZBus(error.to_string())
    }
}

impl From<serde_json::Error> for App {
    fn from(error: serde_json::Error) -> Self {
        App::Serialization(error.to_string())
    }
}

impl From<App> for fdo::Error {
    fn from(error: App) -> Self {
        match error {
            App::UnsupportedCommand(_) => fdo::Error::NotSupported(error.to_string()),
            App::InvalidArgument(_) => fdo::Error::InvalidArgs(error.to_string()),
            _ => fdo::Error::Failed(error.to_string()),
        }
    }
}
