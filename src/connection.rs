use std::fmt;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::credentials::{Credentials, RowSeparator};
use crate::cursor::Cursor;
use crate::driver::{DriverSession, QueryResult};
use crate::error::{Error, Result};

/// Caller-visible connection lifecycle.
///
/// A connection starts out unopened, is opened (fresh or adopted from
/// the pool), and is closed when released; release returns the physical
/// handle to the pool rather than tearing it down.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    Init,
    Open,
    Closed,
}

/// A logical connection owned by exactly one caller at a time.
///
/// Ownership of the physical [Handle] transfers fully at checkout and
/// checkin; the adapter never shares one handle across callers.
pub struct Connection {
    pub name: String,
    pub credentials: Arc<Credentials>,
    pub(crate) state: ConnectionState,
    pub(crate) handle: Option<Handle>,
}

impl Connection {
    pub fn new<T>(name: T, credentials: Arc<Credentials>) -> Self
    where
        T: Into<String>,
    {
        Self {
            name: name.into(),
            credentials,
            state: ConnectionState::Init,
            handle: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Creates a statement dispatcher bound to this connection.
    pub fn cursor(&mut self) -> Result<Cursor<'_>> {
        match self.handle.as_mut() {
            Some(handle) if self.state == ConnectionState::Open => Ok(Cursor::new(handle)),
            _ => Err(Error::State("connection is not open")),
        }
    }

    pub(crate) fn handle_mut(&mut self) -> Result<&mut Handle> {
        match self.handle.as_mut() {
            Some(handle) if self.state == ConnectionState::Open => Ok(handle),
            _ => Err(Error::State("connection is not open")),
        }
    }
}

impl Debug for Connection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("handle", &self.handle.is_some())
            .finish()
    }
}

/// The physical session plus the two adapter-level attributes that the
/// underlying driver knows nothing about.
pub struct Handle {
    pub(crate) session: Box<dyn DriverSession>,
    pub row_separator: RowSeparator,
    pub timestamp_format: String,
}

impl Handle {
    pub(crate) fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.session.execute(sql)
    }

    /// A trivial round trip confirming the handle is still usable.
    /// Any failure means invalid; nothing propagates from here.
    pub(crate) fn validate(&mut self) -> bool {
        if self.session.is_closed() {
            return false;
        }

        match self.session.execute("SELECT 1") {
            Ok(_) => true,
            Err(e) => {
                log::debug!("connection validation failed: {}", e);
                false
            }
        }
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    pub(crate) fn abort_query(&mut self) {
        self.session.abort_query();
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("row_separator", &self.row_separator)
            .field("timestamp_format", &self.timestamp_format)
            .field("closed", &self.is_closed())
            .finish()
    }
}
