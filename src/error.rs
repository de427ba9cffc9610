use std::net::TcpStream;

use serde::Deserialize;
use thiserror::Error as ThisError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{ClientHandshake, HandshakeError};

/// Result implementation for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the crate.
///
/// Every failure crossing the crate boundary is one of these variants,
/// so callers get a single family to match on.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Exasol query error: {0}")]
    Database(ExaError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("{0}")]
    State(&'static str),
}

impl Error {
    /// Whether retrying the operation that produced this error can help.
    /// Only transient connection establishment failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration related errors.
///
/// These indicate a bad credential descriptor or column setting and are
/// never retried.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("{0} is not a valid protocol version")]
    UnknownProtocolVersion(String),
    #[error("{0} is not a valid row separator")]
    UnknownRowSeparator(String),
    #[error("unexpected type {0} for column quote setting")]
    InvalidQuoteConfig(&'static str),
    #[error("malformed bulk load request: {0}")]
    MalformedBulkLoad(String),
}

/// Connection related errors.
///
/// Raised while establishing or talking over the physical connection.
/// Retryability is decided here, once, when the transport error is
/// first observed.
#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("Invalid DSN provided")]
    InvalidDsn,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Websocket(#[from] tungstenite::error::Error),
    #[error(transparent)]
    Handshake(#[from] HandshakeError<ClientHandshake<MaybeTlsStream<TcpStream>>>),
    #[error(transparent)]
    Cryptography(#[from] rsa::errors::Error),
    #[error(transparent)]
    Pkcs1(#[from] rsa::pkcs1::Error),
    #[cfg(feature = "native-tls")]
    #[error(transparent)]
    Tls(#[from] __native_tls::Error),
    #[cfg(feature = "native-tls")]
    #[error(transparent)]
    TlsHandshake(#[from] __native_tls::HandshakeError<TcpStream>),
    #[error("encryption requested but the native-tls feature is disabled")]
    TlsUnavailable,
    #[error("Malformed server response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    MessageParse(#[from] serde_json::error::Error),
    #[error("{0}")]
    Server(ExaError),
    #[error("connection attempts exhausted after {attempts} tries")]
    Exhausted {
        attempts: u32,
        source: Box<ConnectionError>,
    },
}

impl ConnectionError {
    /// Transient failures worth another attempt. DSN, TLS setup and
    /// cryptography problems will not fix themselves and fail fast.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Websocket(_)
                | Self::Handshake(_)
                | Self::InvalidResponse(_)
                | Self::MessageParse(_)
                | Self::Server(_)
        )
    }
}

/// Error object returned by the Exasol server inside a response.
#[derive(Debug, Deserialize, ThisError)]
#[error("{code}: {text}")]
pub struct ExaError {
    pub(crate) text: String,
    #[serde(rename = "sqlCode")]
    pub(crate) code: String,
}

impl ExaError {
    pub fn message(&self) -> &str {
        &self.text
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// Data decoding errors raised while materializing a result set or
/// reading a bulk load file.
#[derive(Debug, ThisError)]
pub enum DataError {
    #[error("cannot parse {0:?} as DECIMAL: {1}")]
    Decimal(String, rust_decimal::Error),
    #[error("cannot parse {0:?} as TIMESTAMP")]
    Timestamp(String),
    #[error("cannot read bulk load file {0}: {1}")]
    BulkLoadRead(String, csv::Error),
}
