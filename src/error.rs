use std::fmt;

use thiserror::Error;

/// Exception reported by the server, possibly wrapping a chain of causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerException {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    pub nested: Option<Box<ServerException>>,
}

impl ServerException {
    /// Iterate over this exception and every nested cause, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ServerException> {
        std::iter::successors(Some(self), |e| e.nested.as_deref())
    }
}

impl fmt::Display for ServerException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code: {}. ", self.code)?;
        if self.name != "DB::Exception" {
            write!(f, "{}. ", self.name)?;
        }
        write!(f, "{}", self.message)?;
        if !self.stack_trace.is_empty() {
            write!(f, ". Stack trace:\n\n{}", self.stack_trace)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.nested.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Socket timeout: {0}")]
    SocketTimeout(String),

    #[error("Unexpected EOF while reading from stream")]
    UnexpectedEof,

    #[error("Unexpected packet from server: {0}")]
    UnexpectedPacket(String),

    #[error("Unknown packet {code} from server")]
    UnknownPacket { code: u64 },

    #[error(
        "Simultaneous queries on single connection detected: the previous \
         result stream was not fully consumed"
    )]
    PartiallyConsumedQuery,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(
        "Checksum doesn't match: expected {expected:032x}, got {actual:032x}"
    )]
    ChecksumMismatch { expected: u128, actual: u128 },

    #[error("Unknown compression method: 0x{0:02x}")]
    UnknownCompressionMethod(u8),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Unknown type {0}")]
    UnknownType(String),

    #[error(
        "Type mismatch in column '{column}': value {value} does not fit \
         {expected}"
    )]
    TypeMismatch { column: String, expected: String, value: String },

    #[error(
        "Too large string size in column '{column}': {size} bytes, fixed \
         size is {max}"
    )]
    TooLargeStringSize { column: String, size: usize, max: usize },

    #[error("Logical error: {0}")]
    Logical(String),

    #[error("Server exception: {0}")]
    Server(ServerException),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Build a type mismatch error; the column name is attached later by the
    /// block codec.
    pub(crate) fn mismatch(
        expected: impl Into<String>,
        value: impl fmt::Debug,
    ) -> Self {
        Error::TypeMismatch {
            column: String::new(),
            expected: expected.into(),
            value: format!("{:?}", value),
        }
    }

    /// Attach a column name to value-level errors that don't carry one yet.
    pub fn with_column(self, name: &str) -> Self {
        match self {
            Error::TypeMismatch { column, expected, value }
                if column.is_empty() =>
            {
                Error::TypeMismatch { column: name.to_string(), expected, value }
            }
            Error::TooLargeStringSize { column, size, max }
                if column.is_empty() =>
            {
                Error::TooLargeStringSize {
                    column: name.to_string(),
                    size,
                    max,
                }
            }
            other => other,
        }
    }

    /// Whether the connection can no longer be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Io(_)
            | Error::Network(_)
            | Error::SocketTimeout(_)
            | Error::UnexpectedEof
            | Error::UnexpectedPacket(_)
            | Error::UnknownPacket { .. }
            | Error::Protocol(_)
            | Error::ChecksumMismatch { .. }
            | Error::UnknownCompressionMethod(_)
            | Error::Compression(_)
            | Error::UnknownType(_) => true,
            #[cfg(feature = "tls")]
            Error::Tls(_) => true,
            Error::PartiallyConsumedQuery
            | Error::TypeMismatch { .. }
            | Error::TooLargeStringSize { .. }
            | Error::Logical(_)
            | Error::Server(_)
            | Error::InvalidArgument(_) => false,
        }
    }

    /// The server exception carried by this error, if any.
    pub fn server_exception(&self) -> Option<&ServerException> {
        match self {
            Error::Server(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ServerException> for Error {
    fn from(e: ServerException) -> Self {
        Error::Server(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
