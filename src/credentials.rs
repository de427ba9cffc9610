use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_QUERY_TIMEOUT, DEFAULT_RETRIES, DEFAULT_SOCKET_TIMEOUT,
    TIMESTAMP_FORMAT_DEFAULT,
};
use crate::error::{ConfigError, Error, Result};

/// Enum listing the protocol versions that can be used when
/// establishing a websocket connection to Exasol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProtocolVersion {
    V1,
    V2,
    V3,
}

impl Display for ProtocolVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "1"),
            ProtocolVersion::V2 => write!(f, "2"),
            ProtocolVersion::V3 => write!(f, "3"),
        }
    }
}

/// Serialized to the numeric form the websocket API expects.
impl Serialize for ProtocolVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::V1 => serializer.serialize_u64(1),
            Self::V2 => serializer.serialize_u64(2),
            Self::V3 => serializer.serialize_u64(3),
        }
    }
}

impl FromStr for ProtocolVersion {
    type Err = Error;

    /// Parses the profile-level token, case-insensitively.
    /// An unrecognized token is a hard configuration error.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            "v3" => Ok(Self::V3),
            _ => Err(ConfigError::UnknownProtocolVersion(s.to_owned()).into()),
        }
    }
}

/// Row separator used when reading bulk load files.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
pub enum RowSeparator {
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "CRLF")]
    Crlf,
}

impl RowSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lf => "LF",
            Self::Crlf => "CRLF",
        }
    }
}

impl Default for RowSeparator {
    /// Follows the host platform line ending convention.
    fn default() -> Self {
        if cfg!(windows) {
            Self::Crlf
        } else {
            Self::Lf
        }
    }
}

impl Display for RowSeparator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowSeparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LF" => Ok(Self::Lf),
            "CRLF" => Ok(Self::Crlf),
            _ => Err(ConfigError::UnknownRowSeparator(s.to_owned()).into()),
        }
    }
}

/// Profile parameters describing one logical Exasol target.
///
/// Constructed once at startup by the profile loader and never mutated;
/// every other component reads it by reference. Exactly one of
/// password, access token or refresh token is expected to be populated,
/// which the profile loader validates before handing the descriptor over.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub dsn: String,
    #[serde(alias = "dbname")]
    pub database: String,
    pub schema: String,
    #[serde(default)]
    pub user: String,
    #[serde(default, alias = "pass")]
    pub password: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
    #[serde(default)]
    pub compression: bool,
    #[serde(default = "default_true")]
    pub encryption: bool,
    #[serde(default = "default_true")]
    pub validate_server_certificate: bool,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub row_separator: RowSeparator,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

fn default_connection_timeout() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT
}

fn default_socket_timeout() -> u64 {
    DEFAULT_SOCKET_TIMEOUT
}

fn default_query_timeout() -> u64 {
    DEFAULT_QUERY_TIMEOUT
}

fn default_true() -> bool {
    true
}

fn default_protocol_version() -> String {
    "v3".to_owned()
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_timestamp_format() -> String {
    TIMESTAMP_FORMAT_DEFAULT.to_owned()
}

impl Credentials {
    /// Derives the pool lookup key from the identity-relevant fields.
    ///
    /// Two descriptors sharing (dsn, user, database, schema) always map
    /// to the same key; a difference in any of them yields a different
    /// key up to hash collisions.
    pub fn pool_key(&self) -> String {
        let mut hasher = Sha256::new();

        for part in [&self.dsn, &self.user, &self.database, &self.schema] {
            hasher.update(part.as_bytes());
            // Field delimiter so ("ab", "c") and ("a", "bc") differ.
            hasher.update([0u8]);
        }

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Parses the protocol version token from the profile.
    pub fn parse_protocol_version(&self) -> Result<ProtocolVersion> {
        self.protocol_version.parse()
    }
}

/// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("dsn", &self.dsn)
            .field("user", &self.user)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("connection_timeout", &self.connection_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("compression", &self.compression)
            .field("encryption", &self.encryption)
            .field(
                "validate_server_certificate",
                &self.validate_server_certificate,
            )
            .field("protocol_version", &self.protocol_version)
            .field("retries", &self.retries)
            .field("row_separator", &self.row_separator)
            .field("timestamp_format", &self.timestamp_format)
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_credentials() -> Credentials {
    serde_json::from_value(serde_json::json!({
        "dsn": "localhost:8563",
        "user": "test_user",
        "pass": "test_pass",
        "database": "TEST_DB",
        "schema": "TEST_SCHEMA",
    }))
    .unwrap()
}
