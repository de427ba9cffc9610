pub const DEFAULT_PORT: u16 = 8563;
pub const DEFAULT_FETCH_SIZE: usize = 5 * 1024 * 1024;
pub const DEFAULT_CLIENT_PREFIX: &str = "ExasolAdapter";

pub const DEFAULT_CONNECTION_TIMEOUT: u64 = 10;
pub const DEFAULT_SOCKET_TIMEOUT: u64 = 30;
pub const DEFAULT_QUERY_TIMEOUT: u64 = 0;
pub const DEFAULT_RETRIES: u32 = 1;

/// Server side timestamp rendering format applied per session.
pub const TIMESTAMP_FORMAT_DEFAULT: &str = "YYYY-MM-DDTHH:MI:SS.FF6";

/// Sentinel prefix the upstream compiler puts on bulk load requests:
/// `0CSV|schema.table` or `0CSV|schema.table|col1,col2`.
pub const CSV_IMPORT_PREFIX: &str = "0CSV|";

/// Separator token the upstream compiler places between the statements
/// of a multi-statement batch.
pub const STATEMENT_SEPARATOR: &str = "|SEPARATEMEPLEASE|";

/// Environment variable consulted for the pool pre-warm size.
pub const POOL_WARM_SIZE_ENV: &str = "EXASOL_ADAPTER_POOL_SIZE";

/// Rows per INSERT statement generated by the bulk load path.
pub const IMPORT_CHUNK_ROWS: usize = 500;
