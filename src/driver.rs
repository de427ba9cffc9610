use std::collections::VecDeque;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::credentials::{Credentials, ProtocolVersion, RowSeparator};
use crate::error::Result;

/// One row of raw wire values.
pub type Row = Vec<Value>;

/// TLS policy handed to the driver when opening a connection.
///
/// `AcceptAnyCertificate` keeps the channel encrypted without
/// authenticating the server.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SslOptions {
    Disabled,
    ValidateCertificate,
    AcceptAnyCertificate,
}

/// Bulk load request handed to the driver session.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRequest {
    pub schema: String,
    pub table: String,
    /// Explicit column list, already carrying per-column quoting.
    /// `None` is the legacy path falling back to the file header.
    pub columns: Option<Vec<String>>,
    pub path: PathBuf,
    pub skip_header: bool,
    pub row_separator: RowSeparator,
}

/// Factory boundary for physical connections.
///
/// The wire protocol lives entirely behind this trait; everything above
/// it (pool, opener, cursor) only sees sessions.
pub trait Driver: Send + Sync {
    fn connect(
        &self,
        credentials: &Credentials,
        protocol_version: ProtocolVersion,
        ssl: SslOptions,
    ) -> Result<Box<dyn DriverSession>>;
}

/// One authenticated database session.
pub trait DriverSession: Send {
    /// Executes a single statement and returns its full result.
    fn execute(&mut self, sql: &str) -> Result<QueryResult>;

    /// File-based bulk insert. Returns the number of loaded rows.
    fn import_file(&mut self, request: &ImportRequest) -> Result<u64>;

    fn is_closed(&self) -> bool;

    /// Best-effort abort of the currently executing statement.
    /// Fire-and-forget; completion is not awaited.
    fn abort_query(&mut self);

    fn close(&mut self) -> Result<()>;
}

/// The result of one executed statement.
#[derive(Debug)]
pub enum QueryResult {
    ResultSet(ResultSet),
    RowCount(u64),
}

impl QueryResult {
    pub fn row_count(&self) -> u64 {
        match self {
            Self::ResultSet(rs) => rs.total_rows,
            Self::RowCount(n) => *n,
        }
    }
}

/// A fully fetched result set.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: VecDeque<Row>,
    pub total_rows: u64,
}

/// Name and datatype of one result set column.
#[derive(Debug, Clone, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "dataType")]
    pub datatype: DataType,
}

/// Datatype description as reported by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct DataType {
    #[serde(rename = "type")]
    pub type_name: String,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub size: Option<usize>,
}
