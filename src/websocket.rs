use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use lazy_regex::regex_captures;
use rand::rngs::OsRng;
use rsa::{pkcs1::DecodeRsaPublicKey, PaddingScheme, PublicKey as _, RsaPublicKey};
use serde_json::{json, Value};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::constants::{DEFAULT_CLIENT_PREFIX, DEFAULT_FETCH_SIZE, DEFAULT_PORT, IMPORT_CHUNK_ROWS};
use crate::credentials::{Credentials, ProtocolVersion, RowSeparator};
use crate::driver::{Driver, DriverSession, ImportRequest, QueryResult, SslOptions};
use crate::error::{ConfigError, ConnectionError, DataError, Error, Result};
use crate::quoting::quote;
use crate::response::{QueryResultDe, Response, ResponseData};

type Ws = WebSocket<MaybeTlsStream<TcpStream>>;
type ConResult<T> = std::result::Result<T, ConnectionError>;

/// The real [Driver] implementation speaking the Exasol websocket
/// protocol over tungstenite.
#[derive(Debug, Default)]
pub struct WebSocketDriver;

impl Driver for WebSocketDriver {
    fn connect(
        &self,
        credentials: &Credentials,
        protocol_version: ProtocolVersion,
        ssl: SslOptions,
    ) -> Result<Box<dyn DriverSession>> {
        let session = WsSession::connect(credentials, protocol_version, ssl)?;
        Ok(Box::new(session))
    }
}

/// One authenticated websocket session.
pub struct WsSession {
    ws: Ws,
    closed: bool,
}

impl WsSession {
    fn connect(
        credentials: &Credentials,
        protocol_version: ProtocolVersion,
        ssl: SslOptions,
    ) -> Result<Self> {
        let (host, port) = parse_dsn(&credentials.dsn)?;
        let socket = open_socket(&host, port, credentials)?;

        let (stream, scheme) = match ssl {
            SslOptions::Disabled => (MaybeTlsStream::Plain(socket), "ws"),
            _ => (tls_stream(&host, socket, ssl)?, "wss"),
        };

        let addr = format!("{}://{}:{}/", scheme, host, port);
        let (ws, _) = tungstenite::client(addr, stream).map_err(ConnectionError::from)?;

        let mut session = Self { ws, closed: false };
        session.login(credentials, protocol_version)?;

        Ok(session)
    }

    /// Authenticates the session. Password logins encrypt the password
    /// with the server-provided RSA key; token logins skip that step.
    fn login(&mut self, credentials: &Credentials, pv: ProtocolVersion) -> Result<()> {
        let crate_version = env!("CARGO_PKG_VERSION");
        let client_name = format!("{} {}", DEFAULT_CLIENT_PREFIX, crate_version);

        let mut payload = json!({
            "driverName": client_name,
            "clientName": client_name,
            "clientVersion": crate_version,
            "clientOs": std::env::consts::OS,
            "clientRuntime": "Rust",
            "useCompression": credentials.compression,
            "attributes": {
                "currentSchema": credentials.schema,
                "autocommit": true,
                "queryTimeout": credentials.query_timeout,
            }
        });

        // Safe to unwrap, the payload was just built as an object.
        let fields = payload.as_object_mut().unwrap();

        if !credentials.access_token.is_empty() {
            self.request(json!({"command": "loginToken", "protocolVersion": pv}))?;
            fields.insert("accessToken".to_owned(), credentials.access_token.clone().into());
        } else if !credentials.refresh_token.is_empty() {
            self.request(json!({"command": "loginToken", "protocolVersion": pv}))?;
            fields.insert(
                "refreshToken".to_owned(),
                credentials.refresh_token.clone().into(),
            );
        } else {
            let key = self.get_public_key(pv)?;
            let enc_password = encrypt_password(&credentials.password, &key)?;
            fields.insert("username".to_owned(), credentials.user.clone().into());
            fields.insert("password".to_owned(), enc_password.into());
        }

        self.request(payload)?;
        Ok(())
    }

    /// First login round-trip, retrieving the RSA key used to encrypt
    /// the password.
    fn get_public_key(&mut self, pv: ProtocolVersion) -> Result<RsaPublicKey> {
        let payload = json!({"command": "login", "protocolVersion": pv});
        let pem = match self.request(payload)? {
            Some(ResponseData::PublicKey(k)) => k.public_key_pem,
            _ => {
                let err = ConnectionError::InvalidResponse("missing public key".to_owned());
                return Err(err.into());
            }
        };

        let key = RsaPublicKey::from_pkcs1_pem(&pem).map_err(ConnectionError::from)?;
        Ok(key)
    }

    /// Sends a request and validates the response status.
    ///
    /// Server-side rejections surface as [ConnectionError::Server] here;
    /// callers on the execution path re-classify them as database errors.
    fn request(&mut self, payload: Value) -> ConResult<Option<ResponseData>> {
        self.send(payload)?;

        let response = self.recv()?;
        match response {
            Response::Ok { response_data } => Ok(response_data),
            Response::Error { exception } => Err(ConnectionError::Server(exception)),
        }
    }

    fn send(&mut self, payload: Value) -> ConResult<()> {
        log::trace!("sending command: {}", payload);
        self.ws.write_message(Message::Text(payload.to_string()))?;
        Ok(())
    }

    /// Only Text and Binary messages matter; Ping and friends are
    /// discarded until one of those arrives.
    fn recv(&mut self) -> ConResult<Response> {
        loop {
            break match self.ws.read_message()? {
                Message::Text(resp) => Ok(serde_json::from_str(&resp)?),
                Message::Binary(resp) => Ok(serde_json::from_slice(&resp)?),
                Message::Close(frame) => {
                    let msg = format!("close frame received: {:?}", frame);
                    Err(ConnectionError::InvalidResponse(msg))
                }
                _ => continue,
            };
        }
    }

    /// Drains the remaining chunks of a server-held result set, then
    /// releases the handle.
    fn drain_result_set(
        &mut self,
        rs: &mut crate::driver::ResultSet,
        handle: u16,
    ) -> ConResult<()> {
        while (rs.rows.len() as u64) < rs.total_rows {
            let payload = json!({
                "command": "fetch",
                "resultSetHandle": handle,
                "startPosition": rs.rows.len(),
                "numBytes": DEFAULT_FETCH_SIZE,
            });

            match self.request(payload)? {
                Some(ResponseData::Fetched(chunk)) => {
                    if chunk.num_rows == 0 {
                        break;
                    }
                    rs.rows
                        .extend(crate::response::transpose(chunk.data, chunk.num_rows));
                }
                _ => {
                    let msg = "fetch returned no data chunk".to_owned();
                    return Err(ConnectionError::InvalidResponse(msg));
                }
            }
        }

        let payload = json!({"command": "closeResultSets", "resultSetHandles": [handle]});
        self.request(payload)?;
        Ok(())
    }

    fn execute_impl(&mut self, sql: &str) -> ConResult<QueryResult> {
        let payload = json!({"command": "execute", "sqlText": sql});

        let results = match self.request(payload)? {
            Some(ResponseData::Results(r)) => r,
            _ => {
                let msg = "execute returned no results".to_owned();
                return Err(ConnectionError::InvalidResponse(msg));
            }
        };

        let first = results
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::InvalidResponse("empty results array".to_owned()))?;

        match first {
            QueryResultDe::RowCount { row_count } => Ok(QueryResult::RowCount(row_count)),
            QueryResultDe::ResultSet { result_set } => {
                let handle = result_set.result_set_handle;
                let mut rs = result_set.into_result_set();

                if let Some(handle) = handle {
                    self.drain_result_set(&mut rs, handle)?;
                }

                Ok(QueryResult::ResultSet(rs))
            }
        }
    }
}

impl DriverSession for WsSession {
    fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        // A rejected statement on an established session is a database
        // error, not a connectivity problem.
        self.execute_impl(sql).map_err(|e| match e {
            ConnectionError::Server(exa) => Error::Database(exa),
            other => other.into(),
        })
    }

    fn import_file(&mut self, request: &ImportRequest) -> Result<u64> {
        let (columns, rows) = read_csv_rows(request)?;
        let mut loaded = 0u64;

        for statement in insert_statements(&request.schema, &request.table, &columns, &rows) {
            let result = self.execute(&statement)?;
            loaded += result.row_count();
        }

        Ok(loaded)
    }

    fn is_closed(&self) -> bool {
        self.closed || !self.ws.can_write()
    }

    fn abort_query(&mut self) {
        // Fire-and-forget; the response arrives interleaved with the
        // aborted statement's and is not awaited here.
        self.send(json!({"command": "abortQuery"})).ok();
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing the session on the Exasol side first.
        self.request(json!({"command": "disconnect"})).ok();
        self.ws.close(None).ok();

        // Reading until an error occurs; we typically get the server's
        // Close frame and then ConnectionClosed.
        while self.ws.read_message().is_ok() {}

        Ok(())
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.close().ok();
    }
}

/// Splits a `host[:port]` DSN, falling back to the default port.
fn parse_dsn(dsn: &str) -> ConResult<(String, u16)> {
    let (_, host, port) = regex_captures!(r"^([^:/\s]+)(?::(\d+))?$", dsn)
        .ok_or(ConnectionError::InvalidDsn)?;

    let port = match port {
        "" => DEFAULT_PORT,
        p => p.parse().map_err(|_| ConnectionError::InvalidDsn)?,
    };

    Ok((host.to_owned(), port))
}

fn open_socket(host: &str, port: u16, credentials: &Credentials) -> ConResult<TcpStream> {
    let addrs: Vec<_> = (host, port).to_socket_addrs()?.collect();
    let addr = addrs.first().ok_or(ConnectionError::InvalidDsn)?;

    let socket = match credentials.connection_timeout {
        0 => TcpStream::connect(addr)?,
        secs => TcpStream::connect_timeout(addr, Duration::from_secs(secs))?,
    };

    let socket_timeout = match credentials.socket_timeout {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    socket.set_read_timeout(socket_timeout)?;
    socket.set_write_timeout(socket_timeout)?;

    Ok(socket)
}

#[cfg(feature = "native-tls")]
fn tls_stream(
    host: &str,
    socket: TcpStream,
    ssl: SslOptions,
) -> ConResult<MaybeTlsStream<TcpStream>> {
    let mut builder = __native_tls::TlsConnector::builder();

    if ssl == SslOptions::AcceptAnyCertificate {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let connector = builder.build()?;
    let stream = connector.connect(host, socket)?;
    Ok(MaybeTlsStream::NativeTls(stream))
}

#[cfg(not(feature = "native-tls"))]
fn tls_stream(
    _host: &str,
    _socket: TcpStream,
    _ssl: SslOptions,
) -> ConResult<MaybeTlsStream<TcpStream>> {
    Err(ConnectionError::TlsUnavailable)
}

fn encrypt_password(password: &str, key: &RsaPublicKey) -> ConResult<String> {
    let mut rng = OsRng;
    let padding = PaddingScheme::new_pkcs1v15_encrypt();
    let encrypted = key.encrypt(&mut rng, padding, password.as_bytes())?;
    Ok(base64::encode(encrypted))
}

/// Reads the bulk load file, returning the effective column list and
/// the data rows. The explicit column list from the request wins; the
/// file header is the unquoted legacy fallback.
fn read_csv_rows(request: &ImportRequest) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(request.skip_header);

    if request.row_separator == RowSeparator::Crlf {
        builder.terminator(csv::Terminator::CRLF);
    }

    let mut reader = builder
        .from_path(&request.path)
        .map_err(|e| csv_error(request, e))?;

    let columns = match &request.columns {
        Some(cols) => cols.clone(),
        None if request.skip_header => {
            let headers = reader.headers().map_err(|e| csv_error(request, e))?;
            headers.iter().map(str::to_owned).collect()
        }
        None => {
            let msg = format!("no column list for {}.{}", request.schema, request.table);
            return Err(ConfigError::MalformedBulkLoad(msg).into());
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(request, e))?;
        rows.push(record.iter().map(str::to_owned).collect());
    }

    Ok((columns, rows))
}

fn csv_error(request: &ImportRequest, err: csv::Error) -> Error {
    DataError::BulkLoadRead(request.path.display().to_string(), err).into()
}

/// Renders chunked multi-row INSERT statements for the bulk load path.
/// The column list is passed through verbatim, as it already carries
/// the per-column quoting decided upstream.
fn insert_statements(
    schema: &str,
    table: &str,
    columns: &[String],
    rows: &[Vec<String>],
) -> Vec<String> {
    let target = format!("{}.{}", quote(schema), quote(table));
    let column_list = columns.join(", ");

    rows.chunks(IMPORT_CHUNK_ROWS)
        .map(|chunk| {
            let values = chunk
                .iter()
                .map(|row| {
                    let literals: Vec<_> = row.iter().map(|v| sql_literal(v)).collect();
                    format!("({})", literals.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ");

            format!(
                "INSERT INTO {} ({}) VALUES {}",
                target, column_list, values
            )
        })
        .collect()
}

/// Empty fields load as NULL, everything else as a string literal the
/// server casts to the column type.
fn sql_literal(value: &str) -> String {
    if value.is_empty() {
        "NULL".to_owned()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}
