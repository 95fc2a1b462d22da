use std::io::Error as IoError;
use thiserror::Error;
use zbus::Error as ZbusError;

#[derive(Error, Debug)]
pub enum App {
    #[error("playbridge is not running, start it with `pbctl start`")]
    ControllerUnavailable,
    #[error("I/O operation failed")]
    Io(#[from] IoError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Zbus error")]
    Zbus(#[from] ZbusError),
    #[error("Malformed status reply")]
    Status(#[from] serde_json::Error),
}
