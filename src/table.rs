use std::str::FromStr;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::cursor::Cursor;
use crate::error::{DataError, Result};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One materialized value.
///
/// Numeric and timestamp columns arrive from the wire as strings; the
/// typed variants carry their parsed form, everything else stays as the
/// raw JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
    Json(Value),
}

/// A fully materialized, row-major query result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub column_names: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Materializes the cursor's buffered result, converting string-typed
    /// numeric and timestamp columns into their native representation.
    ///
    /// `limit` caps the number of rows taken; `None` drains the result.
    /// Statements without a result set produce an empty table.
    pub fn from_cursor(cursor: &mut Cursor<'_>, limit: Option<usize>) -> Result<Self> {
        let columns = match cursor.describe() {
            Some(columns) if !columns.is_empty() => columns,
            _ => return Ok(Self::default()),
        };

        let rows = match limit {
            Some(n) => cursor.fetch_many(Some(n))?,
            None => cursor.fetch_all()?,
        };

        // Conversion is decided per column from the first row: only
        // values that actually arrived as strings are re-parsed.
        let conversions: Vec<Conversion> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let stringly = rows
                    .first()
                    .map(|row| matches!(row.get(i), Some(Value::String(_))))
                    .unwrap_or(false);
                Conversion::for_column(&c.type_name, stringly)
            })
            .collect();

        let mut converted = Vec::with_capacity(rows.len());
        for row in rows {
            let cells: Result<Vec<Cell>> = row
                .into_iter()
                .zip(&conversions)
                .map(|(value, conversion)| conversion.apply(value))
                .collect();
            converted.push(cells?);
        }

        Ok(Self {
            column_names: columns.into_iter().map(|c| c.name).collect(),
            rows: converted,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Conversion {
    None,
    Decimal,
    Timestamp,
}

impl Conversion {
    fn for_column(type_name: &str, stringly: bool) -> Self {
        if !stringly {
            return Self::None;
        }

        if type_name == "DECIMAL" || type_name == "BIGINT" {
            Self::Decimal
        } else if type_name.starts_with("TIMESTAMP") {
            Self::Timestamp
        } else {
            Self::None
        }
    }

    fn apply(self, value: Value) -> Result<Cell> {
        if value.is_null() {
            return Ok(Cell::Null);
        }

        match self {
            Self::None => Ok(Cell::Json(value)),
            Self::Decimal => match value {
                Value::String(s) => {
                    let parsed = Decimal::from_str(&s)
                        .map_err(|e| DataError::Decimal(s, e))?;
                    Ok(Cell::Decimal(parsed))
                }
                other => Ok(Cell::Json(other)),
            },
            Self::Timestamp => match value {
                Value::String(s) => parse_timestamp(&s).map(Cell::Timestamp),
                other => Ok(Cell::Json(other)),
            },
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(ts);
        }
    }

    // Date-only values carry no time component.
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }

    Err(DataError::Timestamp(raw.to_owned()).into())
}
