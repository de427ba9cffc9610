//! Database connectivity layer for an Exasol SQL transformation adapter.
//!
//! The crate covers the plumbing between a SQL compiler and a running
//! Exasol cluster: a process-wide [ConnectionPool] of reusable websocket
//! sessions, a retrying [ConnectionManager] that opens and releases
//! [Connection]s, a [Cursor] that decodes the compiler's statement
//! conventions (multi-statement batches, CSV bulk loads), a [Table]
//! materializer that restores native numerics and timestamps from their
//! wire form, and an [IdentifierQuoter] backed by the server's reserved
//! word catalog.
//!
//! The wire protocol itself lives behind the [Driver] trait;
//! [WebSocketDriver] is the production implementation.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use exasol_adapter::{
//!     Connection, ConnectionManager, Credentials, Result, Table, WebSocketDriver,
//! };
//!
//! fn main() -> Result<()> {
//!     let credentials: Credentials = serde_json::from_str(
//!         r#"{
//!             "dsn": "exasol.example.com:8563",
//!             "user": "sys",
//!             "password": "exasol",
//!             "database": "db",
//!             "schema": "analytics"
//!         }"#,
//!     )
//!     .unwrap();
//!
//!     let manager = ConnectionManager::new(Arc::new(WebSocketDriver));
//!     let mut connection = Connection::new("model_build", Arc::new(credentials));
//!
//!     manager.open(&mut connection)?;
//!
//!     let mut cursor = connection.cursor()?;
//!     cursor.execute("SELECT * FROM orders", None)?;
//!     let table = Table::from_cursor(&mut cursor, Some(100))?;
//!     println!("{} rows", table.len());
//!
//!     manager.release(&mut connection);
//!     Ok(())
//! }
//! ```

mod connection;
pub mod constants;
mod credentials;
mod cursor;
mod driver;
mod error;
mod manager;
mod pool;
mod quoting;
mod response;
mod table;
#[cfg(test)]
mod testing;
mod websocket;

pub use crate::connection::{Connection, ConnectionState};
pub use crate::credentials::{Credentials, ProtocolVersion, RowSeparator};
pub use crate::cursor::{AdapterResponse, ColumnDescription, CsvSource, Cursor, Request};
pub use crate::driver::{
    Column, DataType, Driver, DriverSession, ImportRequest, QueryResult, ResultSet, Row,
    SslOptions,
};
pub use crate::error::{ConfigError, ConnectionError, DataError, Error, ExaError, Result};
pub use crate::manager::ConnectionManager;
pub use crate::pool::{warm_size_from_env, ConnectionPool};
pub use crate::quoting::{quote, IdentifierQuoter};
pub use crate::table::{Cell, Table};
pub use crate::websocket::WebSocketDriver;
