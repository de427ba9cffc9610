//! Shared in-memory doubles standing in for the websocket driver.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::Handle;
use crate::constants::TIMESTAMP_FORMAT_DEFAULT;
use crate::credentials::{Credentials, ProtocolVersion, RowSeparator};
use crate::driver::{
    Column, DataType, Driver, DriverSession, ImportRequest, QueryResult, ResultSet, Row,
    SslOptions,
};
use crate::error::{ConnectionError, Error, ExaError, Result};

/// Builds a fully fetched result set from `(name, type)` column pairs
/// and row-major data.
pub(crate) fn result_set(
    columns: &[(&str, &str)],
    rows: Vec<Row>,
) -> QueryResult {
    let total_rows = rows.len() as u64;
    let columns = columns
        .iter()
        .map(|(name, type_name)| Column {
            name: (*name).to_owned(),
            datatype: DataType {
                type_name: (*type_name).to_owned(),
                precision: None,
                scale: None,
                size: None,
            },
        })
        .collect();

    QueryResult::ResultSet(ResultSet {
        columns,
        rows: rows.into(),
        total_rows,
    })
}

/// Scripted driver session recording every statement it sees.
///
/// Executes pop scripted results in order and fall back to a zero row
/// count once the script runs dry.
pub(crate) struct MockSession {
    closed: bool,
    failing: bool,
    results: VecDeque<QueryResult>,
    executed: Arc<Mutex<Vec<String>>>,
    imports: Arc<Mutex<Vec<ImportRequest>>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            closed: false,
            failing: false,
            results: VecDeque::new(),
            executed: Arc::new(Mutex::new(Vec::new())),
            imports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The session reports itself as already closed.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    /// Every execute and close fails with a scripted server error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_results(mut self, results: Vec<QueryResult>) -> Self {
        self.results = results.into();
        self
    }

    /// Shared log of executed statements, usable after the session has
    /// been moved into a [Handle].
    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }

    /// Shared log of received bulk load requests.
    pub fn imports(&self) -> Arc<Mutex<Vec<ImportRequest>>> {
        Arc::clone(&self.imports)
    }

    pub fn into_handle(self) -> Handle {
        Handle {
            session: Box::new(self),
            row_separator: RowSeparator::default(),
            timestamp_format: TIMESTAMP_FORMAT_DEFAULT.to_owned(),
        }
    }

    fn scripted_error() -> Error {
        Error::Database(ExaError {
            text: "scripted failure".to_owned(),
            code: "42000".to_owned(),
        })
    }
}

impl DriverSession for MockSession {
    fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_owned());

        if self.failing {
            return Err(Self::scripted_error());
        }

        Ok(self
            .results
            .pop_front()
            .unwrap_or(QueryResult::RowCount(0)))
    }

    fn import_file(&mut self, request: &ImportRequest) -> Result<u64> {
        self.imports.lock().unwrap().push(request.clone());
        Ok(1)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn abort_query(&mut self) {
        self.executed.lock().unwrap().push("<abortQuery>".to_owned());
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;

        if self.failing {
            return Err(Self::scripted_error());
        }

        Ok(())
    }
}

/// One scripted outcome of a [MockDriver::connect] call.
pub(crate) enum ConnectOutcome {
    Session(MockSession),
    /// A transient connectivity failure.
    Retryable,
    /// A failure that must not be retried.
    Fatal,
}

/// Scripted connection factory counting its connect calls.
///
/// Outcomes are consumed in order; once the script runs dry the driver
/// falls back to its default behavior.
pub(crate) struct MockDriver {
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
    connects: Arc<AtomicUsize>,
    fail_by_default: bool,
}

impl MockDriver {
    /// Hands out a fresh working session on every connect.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            connects: Arc::new(AtomicUsize::new(0)),
            fail_by_default: false,
        }
    }

    /// Fails every connect with a retryable error.
    pub fn always_failing() -> Self {
        Self {
            fail_by_default: true,
            ..Self::new()
        }
    }

    pub fn scripted(outcomes: Vec<ConnectOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::new()
        }
    }

    /// Shared connect counter, usable after the driver has been moved
    /// into a manager.
    pub fn connect_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }

    fn transient_error() -> ConnectionError {
        ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "scripted refusal",
        ))
    }
}

impl Driver for MockDriver {
    fn connect(
        &self,
        _credentials: &Credentials,
        _protocol_version: ProtocolVersion,
        _ssl: SslOptions,
    ) -> Result<Box<dyn DriverSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        match self.outcomes.lock().unwrap().pop_front() {
            Some(ConnectOutcome::Session(session)) => Ok(Box::new(session)),
            Some(ConnectOutcome::Retryable) => Err(Self::transient_error().into()),
            Some(ConnectOutcome::Fatal) => Err(ConnectionError::InvalidDsn.into()),
            None if self.fail_by_default => Err(Self::transient_error().into()),
            None => Ok(Box::new(MockSession::new())),
        }
    }
}
