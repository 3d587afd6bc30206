//! The accumulated history for one (member, source) pair.
//!
//! Sources publish one of two shapes: a list of dated records, or a table
//! with a header row and a growing list of rows. [`Layout`] is the strategy
//! that knows how to read a shape's trailing edge, drop its partial window
//! and append a freshly fetched page, so the sync engine never looks inside
//! a record.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while reading or extending a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    /// The stored artifact is not valid JSON or not the expected shape.
    #[error("malformed dataset: {message}")]
    Malformed { message: String },

    /// The trailing record has no readable date, so no resume point exists.
    #[error("cannot read resume date: {message}")]
    BadCursor { message: String },

    /// A fetched page does not fit the dataset's shape.
    #[error("malformed page: {message}")]
    MalformedPage { message: String },

    /// The dataset handed in is the other shape.
    #[error("dataset shape mismatch: expected {expected}")]
    ShapeMismatch { expected: &'static str },
}

impl DatasetError {
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    #[inline]
    pub fn bad_cursor(message: impl Into<String>) -> Self {
        Self::BadCursor {
            message: message.into(),
        }
    }

    #[inline]
    pub fn malformed_page(message: impl Into<String>) -> Self {
        Self::MalformedPage {
            message: message.into(),
        }
    }
}

/// Unit in which a source's data becomes complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// ISO-8601 week, Monday to Sunday.
    IsoWeek,
    /// Calendar day.
    Day,
}

impl Granularity {
    /// Whether two dates fall in the same period.
    #[must_use]
    pub fn same_period(self, a: NaiveDate, b: NaiveDate) -> bool {
        match self {
            Granularity::IsoWeek => a.iso_week() == b.iso_week(),
            Granularity::Day => a == b,
        }
    }

    /// First day of the period containing `date`.
    #[must_use]
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::IsoWeek => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Day => date,
        }
    }
}

/// Fixed span requested per page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    days: u32,
}

impl Window {
    #[must_use]
    pub fn days(days: u32) -> Self {
        Self { days: days.max(1) }
    }

    #[must_use]
    pub fn weeks(weeks: u32) -> Self {
        Self::days(weeks.saturating_mul(7))
    }

    #[must_use]
    pub fn len_days(self) -> u32 {
        self.days
    }

    /// Start of the window after the one starting at `start`.
    #[must_use]
    pub fn advance(self, start: NaiveDate) -> NaiveDate {
        start + Duration::days(i64::from(self.days))
    }

    /// Last day (inclusive) of the window starting at `start`.
    #[must_use]
    pub fn last_day(self, start: NaiveDate) -> NaiveDate {
        start + Duration::days(i64::from(self.days) - 1)
    }
}

/// How a date is written inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKey {
    /// A plain date such as `20160601`.
    Date(&'static str),
    /// A timestamp such as `2016-06-01T13:00:00`; only its date is used.
    DateTime(&'static str),
}

impl DateKey {
    #[must_use]
    pub fn parse(self, raw: &str) -> Option<NaiveDate> {
        match self {
            DateKey::Date(fmt) => NaiveDate::parse_from_str(raw, fmt).ok(),
            DateKey::DateTime(fmt) => NaiveDateTime::parse_from_str(raw, fmt)
                .ok()
                .map(|dt| dt.date()),
        }
    }

    fn read(self, value: &Value) -> Option<NaiveDate> {
        value.as_str().and_then(|raw| self.parse(raw))
    }
}

/// A header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub row_headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Any other top-level fields the source sends, such as `notes`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One member's history for one source, in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dataset {
    Records(Vec<Value>),
    Table(Table),
}

impl Dataset {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Dataset::Records(records) => records.len(),
            Dataset::Table(table) => table.rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize to the artifact's JSON bytes.
    ///
    /// Equal datasets always produce identical bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Strategy for one dataset shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// A JSON array of objects, each carrying a date under `date_field`.
    Records {
        date_field: &'static str,
        key: DateKey,
    },
    /// A `{row_headers, rows}` table whose `date_column` holds the date.
    Table { date_column: usize, key: DateKey },
}

impl Layout {
    fn shape(self) -> &'static str {
        match self {
            Layout::Records { .. } => "record list",
            Layout::Table { .. } => "table",
        }
    }

    /// The canonical empty dataset for this shape.
    #[must_use]
    pub fn empty(self) -> Dataset {
        match self {
            Layout::Records { .. } => Dataset::Records(Vec::new()),
            Layout::Table { .. } => Dataset::Table(Table::default()),
        }
    }

    /// Parse a previously published artifact.
    pub fn parse(self, bytes: &[u8]) -> Result<Dataset, DatasetError> {
        match self {
            Layout::Records { .. } => serde_json::from_slice::<Vec<Value>>(bytes)
                .map(Dataset::Records)
                .map_err(|e| DatasetError::malformed(e.to_string())),
            Layout::Table { .. } => serde_json::from_slice::<Table>(bytes)
                .map(Dataset::Table)
                .map_err(|e| DatasetError::malformed(e.to_string())),
        }
    }

    fn date_of_record(self, record: &Value) -> Option<NaiveDate> {
        match self {
            Layout::Records { date_field, key } => record.get(date_field).and_then(|v| key.read(v)),
            Layout::Table { .. } => None,
        }
    }

    fn date_of_row(self, row: &[Value]) -> Option<NaiveDate> {
        match self {
            Layout::Table { date_column, key } => row.get(date_column).and_then(|v| key.read(v)),
            Layout::Records { .. } => None,
        }
    }

    /// Date of the trailing record, or `None` for an empty dataset.
    pub fn resume_cursor(self, dataset: &Dataset) -> Result<Option<NaiveDate>, DatasetError> {
        match (self, dataset) {
            (Layout::Records { date_field, .. }, Dataset::Records(records)) => {
                let Some(last) = records.last() else {
                    return Ok(None);
                };
                self.date_of_record(last).map(Some).ok_or_else(|| {
                    DatasetError::bad_cursor(format!("last record has no valid '{date_field}'"))
                })
            }
            (Layout::Table { date_column, .. }, Dataset::Table(table)) => {
                let Some(last) = table.rows.last() else {
                    return Ok(None);
                };
                self.date_of_row(last).map(Some).ok_or_else(|| {
                    DatasetError::bad_cursor(format!("last row has no valid date in column {date_column}"))
                })
            }
            _ => Err(DatasetError::ShapeMismatch {
                expected: self.shape(),
            }),
        }
    }

    /// Drop everything in the same period as `cursor`. Returns the number removed.
    ///
    /// Entries without a readable date are kept.
    pub fn evict_partial(
        self,
        dataset: &mut Dataset,
        cursor: NaiveDate,
        granularity: Granularity,
    ) -> Result<usize, DatasetError> {
        let before = dataset.len();
        match (self, dataset) {
            (Layout::Records { .. }, Dataset::Records(records)) => {
                records.retain(|record| {
                    !self
                        .date_of_record(record)
                        .is_some_and(|d| granularity.same_period(d, cursor))
                });
                Ok(before - records.len())
            }
            (Layout::Table { .. }, Dataset::Table(table)) => {
                table.rows.retain(|row| {
                    !self
                        .date_of_row(row)
                        .is_some_and(|d| granularity.same_period(d, cursor))
                });
                Ok(before - table.rows.len())
            }
            _ => Err(DatasetError::ShapeMismatch {
                expected: self.shape(),
            }),
        }
    }

    /// Append one fetched page. Returns the number of records added.
    ///
    /// A `null` page means "no data for this window" and adds nothing.
    pub fn merge_page(self, dataset: &mut Dataset, page: Value) -> Result<usize, DatasetError> {
        if page.is_null() {
            return Ok(0);
        }

        match (self, dataset) {
            (Layout::Records { .. }, Dataset::Records(records)) => {
                let Value::Array(items) = page else {
                    return Err(DatasetError::malformed_page("expected a JSON array"));
                };
                let added = items.len();
                records.extend(items);
                Ok(added)
            }
            (Layout::Table { .. }, Dataset::Table(table)) => {
                let page: Table = serde_json::from_value(page)
                    .map_err(|e| DatasetError::malformed_page(e.to_string()))?;

                if table.row_headers.is_empty() {
                    table.row_headers = page.row_headers;
                } else if !page.row_headers.is_empty() && page.row_headers != table.row_headers {
                    return Err(DatasetError::malformed_page(format!(
                        "row headers {:?} do not match {:?}",
                        page.row_headers, table.row_headers
                    )));
                }

                for (field, value) in page.extra {
                    table.extra.entry(field).or_insert(value);
                }

                let added = page.rows.len();
                table.rows.extend(page.rows);
                Ok(added)
            }
            _ => Err(DatasetError::ShapeMismatch {
                expected: self.shape(),
            }),
        }
    }
}
