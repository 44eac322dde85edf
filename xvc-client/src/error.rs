use std::{
    error::Error,
    fmt::Display,
    io::{self},
};

use xvc_protocol::error::ReadError;

/// Errors returned by the XVC clients.
#[derive(Debug)]
pub enum ClientError {
    Io(io::Error),
    Protocol(ReadError),
    /// The server did not answer within the configured read/write timeout.
    Timeout,
    /// The address did not resolve to any socket address.
    NoAddress,
    /// The data register did not hold a valid IDCODE.
    InvalidIdCode(u32),
    UnexpectedResponse(String),
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

impl From<io::Error> for ClientError {
    fn from(value: io::Error) -> Self {
        if is_timeout(&value) {
            ClientError::Timeout
        } else {
            ClientError::Io(value)
        }
    }
}

impl From<ReadError> for ClientError {
    fn from(value: ReadError) -> Self {
        match value {
            ReadError::IoError(err) => err.into(),
            other => ClientError::Protocol(other),
        }
    }
}

impl Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(error) => write!(f, "{}", error),
            ClientError::Protocol(error) => write!(f, "Protocol error: {}", error),
            ClientError::Timeout => write!(f, "Timed out waiting for the XVC server"),
            ClientError::NoAddress => write!(f, "Address did not resolve"),
            ClientError::InvalidIdCode(raw) => write!(f, "Invalid IDCODE {:08X}", raw),
            ClientError::UnexpectedResponse(what) => write!(f, "Unexpected response: {}", what),
        }
    }
}

impl Error for ClientError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ClientError::Io(err) => Some(err),
            ClientError::Protocol(err) => Some(err),
            _ => None,
        }
    }
}
