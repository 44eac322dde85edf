use std::{
    error::Error,
    fmt::Display,
    io::{self},
    num::ParseIntError,
    str::Utf8Error,
};

/// Errors that may occur when encoding or decoding XVC messages.
#[derive(Debug)]
pub enum ReadError {
    IoError(io::Error),
    InvalidCommand(String),
    InvalidCommandPrefix(String),
    UnsupportedVersion(String),
    InvalidFormat(String),
    TooManyBytes {
        max: usize,
        got: usize,
    },
    /// The TMS or TDI vector of a shift does not match its bit count.
    VectorLength {
        num_bits: u32,
        expected: usize,
        tms: usize,
        tdi: usize,
    },
    /// The peer sent bytes while no request was outstanding.
    Unsolicited(usize),
    /// The stream ended in the middle of a reply.
    Truncated {
        expected: usize,
        got: usize,
    },
}

impl ReadError {
    /// Whether the error means that the peer went away or stopped answering.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ReadError::IoError(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            ReadError::Truncated { .. } => true,
            _ => false,
        }
    }
}

impl From<io::Error> for ReadError {
    fn from(value: io::Error) -> Self {
        ReadError::IoError(value)
    }
}

impl From<Utf8Error> for ReadError {
    fn from(value: Utf8Error) -> Self {
        ReadError::InvalidFormat(format!("Invalid UTF8: {}", value))
    }
}

impl From<ParseIntError> for ReadError {
    fn from(value: ParseIntError) -> Self {
        ReadError::InvalidFormat(format!("Invalid integer: {}", value))
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IoError(error) => write!(f, "{}", error),
            ReadError::InvalidCommand(cmd) => write!(f, "Received invalid command {}", cmd),
            ReadError::UnsupportedVersion(version) => write!(f, "Unsupported version {}", version),
            ReadError::InvalidFormat(format) => write!(f, "{}", format),
            ReadError::InvalidCommandPrefix(prefix) => {
                write!(f, "Received invalid command with prefix {}", prefix)
            }
            ReadError::TooManyBytes { max, got } => {
                write!(f, "Message too large! Maximum is {}, but got {}", max, got)
            }
            ReadError::VectorLength {
                num_bits,
                expected,
                tms,
                tdi,
            } => write!(
                f,
                "Shift of {} bits needs {} byte vectors, got TMS {} and TDI {}",
                num_bits, expected, tms, tdi
            ),
            ReadError::Unsolicited(len) => {
                write!(f, "Received {} bytes without an outstanding request", len)
            }
            ReadError::Truncated { expected, got } => write!(
                f,
                "Connection closed after {} of {} reply bytes",
                got, expected
            ),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadError::IoError(err) => Some(err),
            _ => None,
        }
    }
}
