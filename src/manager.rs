use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::connection::{Connection, ConnectionState, Handle};
use crate::credentials::{Credentials, ProtocolVersion};
use crate::driver::{Driver, SslOptions};
use crate::error::{ConnectionError, Error, Result};
use crate::pool::ConnectionPool;

const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Opens, pools and releases connections.
///
/// Owns the process-wide [ConnectionPool] and the [Driver] used to
/// build fresh connections. All operations block the calling thread;
/// multiple worker threads may call in concurrently.
pub struct ConnectionManager {
    pool: ConnectionPool,
    driver: Arc<dyn Driver>,
    backoff: Duration,
}

impl ConnectionManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            pool: ConnectionPool::new(),
            driver,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Overrides the inter-attempt retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Opens the connection, adopting a pooled handle when a valid one
    /// exists for the credentials, otherwise building a new one with
    /// bounded retries. A no-op if the connection is already open.
    pub fn open(&self, connection: &mut Connection) -> Result<()> {
        if connection.state() == ConnectionState::Open {
            log::debug!("connection {} is already open, skipping open", connection.name);
            return Ok(());
        }

        let credentials = Arc::clone(&connection.credentials);
        let key = credentials.pool_key();

        if let Some(handle) = self.try_pooled(&key) {
            connection.handle = Some(handle);
            connection.state = ConnectionState::Open;
            return Ok(());
        }

        // An unrecognized protocol version is a configuration error and
        // must not consume retry attempts.
        let protocol_version = credentials.parse_protocol_version()?;
        let ssl = ssl_options(&credentials);

        let handle = self.open_with_retry(&credentials, protocol_version, ssl)?;
        connection.handle = Some(handle);
        connection.state = ConnectionState::Open;

        Ok(())
    }

    /// Releases the connection, returning its handle to the pool when
    /// it still validates, discarding it otherwise. From the caller's
    /// point of view this is "close".
    pub fn release(&self, connection: &mut Connection) {
        connection.state = ConnectionState::Closed;

        let Some(mut handle) = connection.handle.take() else {
            return;
        };

        if handle.validate() {
            // A raced return for the same key leaves the pool entry
            // untouched and drops this handle instead.
            self.pool.put(connection.credentials.pool_key(), handle);
        } else {
            log::debug!("discarding invalid connection {}", connection.name);
        }
    }

    /// Pre-warms the pool for the given credentials.
    ///
    /// Opens `target - existing_valid` connections and releases them
    /// into the pool. With one idle slot per key, surplus connections
    /// are dropped again on release; a target above one therefore only
    /// exercises the open path.
    pub fn warm(&self, credentials: &Arc<Credentials>, target: usize) -> Result<()> {
        let key = credentials.pool_key();

        let existing = match self.pool.get(&key) {
            Some(mut handle) => {
                if handle.validate() {
                    self.pool.put(key, handle);
                    1
                } else {
                    0
                }
            }
            None => 0,
        };

        for i in 0..target.saturating_sub(existing) {
            let mut connection =
                Connection::new(format!("pool_init_{}", i), Arc::clone(credentials));
            self.open(&mut connection)?;
            self.release(&mut connection);
        }

        Ok(())
    }

    /// Best-effort abort of the statement currently executing on the
    /// connection. Fire-and-forget.
    pub fn cancel(&self, connection: &mut Connection) {
        if let Ok(handle) = connection.handle_mut() {
            handle.abort_query();
        }
    }

    /// Closes all pooled connections. Safe to call repeatedly.
    pub fn cleanup(&self) {
        self.pool.evict_all();
    }

    /// Claims and validates a pooled handle. Validation happens outside
    /// the pool lock; the `get` already removed the entry atomically.
    fn try_pooled(&self, key: &str) -> Option<Handle> {
        let mut handle = self.pool.get(key)?;

        if handle.validate() {
            log::debug!("reusing pooled connection");
            return Some(handle);
        }

        log::debug!("removing invalid connection from pool");
        handle.close().ok();
        None
    }

    /// Builds a new connection with up to `retries + 1` total attempts.
    /// Only retryable connectivity errors consume further attempts.
    fn open_with_retry(
        &self,
        credentials: &Credentials,
        protocol_version: ProtocolVersion,
        ssl: SslOptions,
    ) -> Result<Handle> {
        let attempts = credentials.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.create(credentials, protocol_version, ssl) {
                Ok(handle) => return Ok(handle),
                Err(Error::Connection(e)) if e.is_retryable() => {
                    if attempt >= attempts {
                        let err = ConnectionError::Exhausted {
                            attempts,
                            source: Box::new(e),
                        };
                        return Err(err.into());
                    }

                    log::warn!(
                        "connection attempt {}/{} failed, retrying in {:?}: {}",
                        attempt,
                        attempts,
                        self.backoff,
                        e
                    );
                    thread::sleep(self.backoff);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// The connection factory: driver connect with autocommit enabled,
    /// session timestamp format directive, then the adapter-level
    /// attributes stamped onto the handle.
    fn create(
        &self,
        credentials: &Credentials,
        protocol_version: ProtocolVersion,
        ssl: SslOptions,
    ) -> Result<Handle> {
        let mut session = self.driver.connect(credentials, protocol_version, ssl)?;

        let directive = format!(
            "alter session set NLS_TIMESTAMP_FORMAT='{}'",
            credentials.timestamp_format
        );

        // Still connection establishment: a rejected directive fails
        // this attempt as a connectivity error, so the outer retry loop
        // covers it.
        session.execute(&directive).map_err(|e| match e {
            Error::Database(exa) => Error::Connection(ConnectionError::Server(exa)),
            other => other,
        })?;

        Ok(Handle {
            session,
            row_separator: credentials.row_separator,
            timestamp_format: credentials.timestamp_format.clone(),
        })
    }
}

/// TLS policy from the descriptor flags: no encryption means no TLS at
/// all; encryption without certificate validation stays encrypted but
/// accepts any certificate.
fn ssl_options(credentials: &Credentials) -> SslOptions {
    if !credentials.encryption {
        SslOptions::Disabled
    } else if credentials.validate_server_certificate {
        SslOptions::ValidateCertificate
    } else {
        SslOptions::AcceptAnyCertificate
    }
}
