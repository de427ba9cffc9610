use std::collections::VecDeque;

use serde::Deserialize;
use serde_json::Value;

use crate::driver::{Column, ResultSet, Row};
use crate::error::ExaError;

/// Generic response received from the Exasol server.
/// This is the first deserialization step, determining whether the
/// message is a proper response or an error.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub(crate) enum Response {
    #[serde(rename_all = "camelCase")]
    Ok {
        response_data: Option<ResponseData>,
    },
    Error {
        exception: ExaError,
    },
}

/// The `responseData` field of a JSON response.
///
/// All `ok` responses come through this with no discriminator between
/// them, so untagged deserialization is required. Results first, as
/// they are by far the most common.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ResponseData {
    Results(Results),
    Fetched(FetchedData),
    PublicKey(PublicKey),
    Other(Value),
}

/// Collection of results from one or more executed statements.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Results {
    #[allow(unused)]
    pub num_results: u16,
    pub results: Vec<QueryResultDe>,
}

/// The result of one statement, straight off the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", rename_all = "camelCase")]
pub(crate) enum QueryResultDe {
    #[serde(rename_all = "camelCase")]
    ResultSet { result_set: ResultSetDe },
    #[serde(rename_all = "camelCase")]
    RowCount { row_count: u64 },
}

/// Wire shape of a result set. Data arrives column-major.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSetDe {
    #[allow(unused)]
    pub num_columns: u16,
    pub num_rows: u64,
    pub num_rows_in_message: usize,
    pub result_set_handle: Option<u16>,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

impl ResultSetDe {
    /// Converts the column-major wire data into a row-major [ResultSet],
    /// leaving any not-yet-fetched remainder to the caller.
    pub fn into_result_set(self) -> ResultSet {
        ResultSet {
            rows: transpose(self.data, self.num_rows_in_message),
            columns: self.columns,
            total_rows: self.num_rows,
        }
    }
}

/// One fetched chunk of a larger result set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FetchedData {
    pub num_rows: usize,
    #[serde(default)]
    pub data: Vec<Vec<Value>>,
}

/// Public key information returned during login.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PublicKey {
    pub public_key_pem: String,
}

/// Turns column-major wire data into rows.
pub(crate) fn transpose(data: Vec<Vec<Value>>, num_rows: usize) -> VecDeque<Row> {
    let mut columns: Vec<_> = data.into_iter().map(|c| c.into_iter()).collect();
    let mut rows = VecDeque::with_capacity(num_rows);

    for _ in 0..num_rows {
        let row: Option<Row> = columns.iter_mut().map(|c| c.next()).collect();
        match row {
            Some(r) => rows.push_back(r),
            None => break,
        }
    }

    rows
}
