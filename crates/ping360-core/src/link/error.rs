//! Link errors

use thiserror::Error;

use super::{LinkConfigError, LinkType};

/// Errors that can occur while opening or driving a link
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Invalid link configuration: {0}")]
    Config(#[from] LinkConfigError),

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Link is closed")]
    Closed,

    #[error("{0} links are not supported")]
    Unsupported(LinkType),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<tokio_serial::Error> for LinkError {
    fn from(e: tokio_serial::Error) -> Self {
        LinkError::SerialError(e.to_string())
    }
}
