use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::connection::Handle;
use crate::constants::{CSV_IMPORT_PREFIX, STATEMENT_SEPARATOR};
use crate::driver::{ImportRequest, QueryResult, Row};
use crate::error::{ConfigError, Error, Result};

/// What a piece of incoming SQL actually asks for, decoded from the
/// sentinel conventions of the statement compiler.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// `0CSV|schema.table` or `0CSV|schema.table|col1,col2` stands in
    /// for a bulk load of a staged CSV file.
    BulkLoad {
        schema: String,
        table: String,
        columns: Option<Vec<String>>,
    },
    /// Multiple statements joined by the separator token, executed
    /// sequentially on one session.
    Batch(Vec<String>),
    Single(String),
}

impl Request {
    pub fn classify(sql: &str) -> Result<Self> {
        if let Some(rest) = sql.strip_prefix(CSV_IMPORT_PREFIX) {
            return Self::parse_bulk_load(sql, rest);
        }

        if sql.contains(STATEMENT_SEPARATOR) {
            let statements = sql
                .split(STATEMENT_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
            return Ok(Self::Batch(statements));
        }

        Ok(Self::Single(sql.to_owned()))
    }

    fn parse_bulk_load(sql: &str, rest: &str) -> Result<Self> {
        let mut parts = rest.splitn(2, '|');

        let target = parts.next().unwrap_or_default();
        let (schema, table) = target
            .split_once('.')
            .ok_or_else(|| ConfigError::MalformedBulkLoad(sql.to_owned()))?;

        if schema.is_empty() || table.is_empty() {
            return Err(ConfigError::MalformedBulkLoad(sql.to_owned()).into());
        }

        // A trailing pipe with nothing behind it means no column list,
        // same as omitting the segment entirely.
        let columns = parts
            .next()
            .filter(|cols| !cols.trim().is_empty())
            .map(|cols| {
                cols.split(',')
                    .map(str::trim)
                    .map(ToOwned::to_owned)
                    .collect()
            });

        Ok(Self::BulkLoad {
            schema: schema.to_owned(),
            table: table.to_owned(),
            columns,
        })
    }
}

/// A staged CSV file a bulk load reads from.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
}

impl CsvSource {
    pub fn new<P>(path: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { path: path.into() }
    }
}

/// Column metadata in the shape result consumers expect.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
    pub display_size: Option<usize>,
    pub internal_size: Option<usize>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub null_ok: bool,
}

/// Summary of the last executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterResponse {
    pub message: String,
    pub rows_affected: Option<u64>,
    pub execution_time: Duration,
}

/// Statement dispatcher bound to one open connection.
///
/// Holds the result of the last executed request; fetch calls consume
/// buffered rows from it.
#[derive(Debug)]
pub struct Cursor<'a> {
    handle: &'a mut Handle,
    result: Option<QueryResult>,
    execution_time: Duration,
    array_size: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(handle: &'a mut Handle) -> Self {
        Self {
            handle,
            result: None,
            execution_time: Duration::ZERO,
            array_size: 1,
        }
    }

    /// Default row count for [Cursor::fetch_many] calls without an
    /// explicit size.
    pub fn set_array_size(&mut self, size: usize) {
        self.array_size = size.max(1);
    }

    /// Executes one request, which may expand to a bulk load or a
    /// sequential batch. The result of the last statement sticks around
    /// for fetching.
    pub fn execute(&mut self, sql: &str, csv: Option<&CsvSource>) -> Result<()> {
        let started = Instant::now();
        self.result = None;

        let result = match Request::classify(sql)? {
            Request::BulkLoad {
                schema,
                table,
                columns,
            } => {
                let source = csv.ok_or(Error::State("bulk load requires a staged file"))?;
                let request = ImportRequest {
                    schema,
                    table,
                    columns,
                    path: source.path.clone(),
                    skip_header: true,
                    row_separator: self.handle.row_separator,
                };
                let rows = self.handle.session.import_file(&request)?;
                QueryResult::RowCount(rows)
            }
            Request::Batch(statements) => {
                let mut last = QueryResult::RowCount(0);
                for statement in &statements {
                    last = self.run(statement)?;
                }
                last
            }
            Request::Single(statement) => self.run(&statement)?,
        };

        self.result = Some(result);
        self.execution_time = started.elapsed();

        Ok(())
    }

    /// Runs a single statement. On a query error the transaction is
    /// rolled back best-effort before the error propagates; the session
    /// runs with autocommit, so this only covers partially applied
    /// multi-statement work.
    fn run(&mut self, sql: &str) -> Result<QueryResult> {
        match self.handle.execute(sql) {
            Ok(result) => Ok(result),
            Err(e @ Error::Database(_)) => {
                if let Err(rb) = self.handle.execute("rollback") {
                    log::debug!("rollback after failed statement also failed: {}", rb);
                }
                Err(e)
            }
            Err(other) => Err(other),
        }
    }

    pub fn fetch_one(&mut self) -> Result<Option<Row>> {
        let rs = self.active_result_set()?;
        Ok(rs.rows.pop_front())
    }

    /// Fetches up to `size` rows, defaulting to the cursor's array size.
    pub fn fetch_many(&mut self, size: Option<usize>) -> Result<Vec<Row>> {
        let size = size.unwrap_or(self.array_size);
        let rs = self.active_result_set()?;

        let take = size.min(rs.rows.len());
        Ok(rs.rows.drain(..take).collect())
    }

    pub fn fetch_all(&mut self) -> Result<Vec<Row>> {
        let rs = self.active_result_set()?;
        Ok(rs.rows.drain(..).collect())
    }

    /// Column metadata of the current result: `None` after a statement
    /// that returned only a row count, an empty list before anything was
    /// executed.
    pub fn describe(&self) -> Option<Vec<ColumnDescription>> {
        match &self.result {
            Some(QueryResult::ResultSet(rs)) => {
                let columns = rs
                    .columns
                    .iter()
                    .map(|c| ColumnDescription {
                        name: c.name.clone(),
                        type_name: c.datatype.type_name.clone(),
                        display_size: c.datatype.size,
                        internal_size: c.datatype.size,
                        precision: c.datatype.precision,
                        scale: c.datatype.scale,
                        null_ok: true,
                    })
                    .collect();
                Some(columns)
            }
            Some(QueryResult::RowCount(_)) => None,
            None => Some(Vec::new()),
        }
    }

    pub fn rowcount(&self) -> Option<u64> {
        self.result.as_ref().map(QueryResult::row_count)
    }

    /// Client-side wall clock duration of the last [Cursor::execute].
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn response(&self) -> AdapterResponse {
        AdapterResponse {
            message: "OK".to_owned(),
            rows_affected: self.rowcount(),
            execution_time: self.execution_time,
        }
    }

    /// Drops the buffered result. The underlying connection stays open.
    pub fn close(&mut self) {
        self.result = None;
    }

    fn active_result_set(&mut self) -> Result<&mut crate::driver::ResultSet> {
        match self.result.as_mut() {
            Some(QueryResult::ResultSet(rs)) => Ok(rs),
            Some(QueryResult::RowCount(_)) => {
                Err(Error::State("statement returned no result set"))
            }
            None => Err(Error::State("no active result")),
        }
    }
}
