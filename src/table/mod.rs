//! In-memory view of the first worksheet.

mod headers;
mod loader;

pub use headers::{dedupe_labels, normalize_labels, trim_labels};
pub use loader::{load_table, parse_headered, parse_headerless};

use std::fmt;
use std::num::NonZeroU32;

use calamine::Data;
use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
// Largest magnitude where every integer is exactly representable as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A single worksheet value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
    /// Excel error literal such as `#DIV/0!`.
    Error(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Integral floats are reported as integers (`1.0` reads back as `1`).
    fn as_integer(&self) -> Option<i64> {
        match *self {
            Cell::Int(v) => Some(v),
            Cell::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_SAFE_INTEGER => {
                Some(v as i64)
            }
            _ => None,
        }
    }
}

/// CSV rendering; also used for header labels.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Float(v) => match self.as_integer() {
                Some(i) => write!(f, "{}", i),
                None if v.is_finite() => write!(f, "{}", v),
                None => Ok(()),
            },
            Cell::Text(s) | Cell::Error(s) => f.write_str(s),
            Cell::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Empty => serializer.serialize_none(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Int(v) => serializer.serialize_i64(*v),
            Cell::Float(v) => match self.as_integer() {
                Some(i) => serializer.serialize_i64(i),
                None if v.is_finite() => serializer.serialize_f64(*v),
                None => serializer.serialize_none(),
            },
            Cell::Text(s) | Cell::Error(s) => serializer.serialize_str(s),
            Cell::DateTime(_) => serializer.collect_str(self),
        }
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => Cell::Empty,
            Data::Bool(v) => Cell::Bool(*v),
            Data::Int(v) => Cell::Int(*v),
            Data::Float(v) => Cell::Float(*v),
            Data::String(v) => Cell::Text(v.clone()),
            Data::Error(e) => Cell::Error(e.to_string()),
            Data::DateTime(v) => match v.as_datetime() {
                Some(dt) => Cell::DateTime(dt),
                None => Cell::Float(v.as_f64()),
            },
            Data::DateTimeIso(v) | Data::DurationIso(v) => Cell::Text(v.clone()),
        }
    }
}

/// 1-based index of the row holding column labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeaderRow(NonZeroU32);

impl HeaderRow {
    pub const FIRST: HeaderRow = HeaderRow(NonZeroU32::MIN);

    /// `None` for zero.
    pub fn new(row: u32) -> Option<Self> {
        NonZeroU32::new(row).map(HeaderRow)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// The same row as a 0-based index.
    pub fn index0(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl Default for HeaderRow {
    fn default() -> Self {
        HeaderRow::FIRST
    }
}

impl fmt::Display for HeaderRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Column labels plus rows of cells, every row exactly as wide as the labels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Build a table, padding short rows with [`Cell::Empty`] and cutting
    /// long ones to the label count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Replace the labels with their trimmed, de-duplicated form.
    pub fn normalize_headers(&mut self) {
        self.columns = normalize_labels(&self.columns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn integral_floats_render_as_integers() {
        assert_eq!(Cell::Float(1.0).to_string(), "1");
        assert_eq!(Cell::Float(-42.0).to_string(), "-42");
        assert_eq!(Cell::Float(1.5).to_string(), "1.5");
        assert_eq!(Cell::Float(1e20).to_string(), "100000000000000000000");
        assert_eq!(serde_json::to_string(&Cell::Float(2.0)).unwrap(), "2");
        assert_eq!(serde_json::to_string(&Cell::Float(0.25)).unwrap(), "0.25");
    }

    #[test]
    fn non_finite_floats_are_blank() {
        assert_eq!(Cell::Float(f64::NAN).to_string(), "");
        assert_eq!(serde_json::to_string(&Cell::Float(f64::INFINITY)).unwrap(), "null");
    }

    #[test]
    fn scalar_rendering() {
        assert_eq!(Cell::Empty.to_string(), "");
        assert_eq!(Cell::Bool(true).to_string(), "True");
        assert_eq!(Cell::Bool(false).to_string(), "False");
        assert_eq!(Cell::Int(7).to_string(), "7");
        assert_eq!(Cell::Error("#DIV/0!".into()).to_string(), "#DIV/0!");
        assert_eq!(serde_json::to_string(&Cell::Empty).unwrap(), "null");
        assert_eq!(serde_json::to_string(&Cell::Bool(false)).unwrap(), "false");
        assert_eq!(serde_json::to_string(&Cell::Text("é".into())).unwrap(), "\"é\"");
    }

    #[test]
    fn datetimes_use_one_format() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        assert_eq!(Cell::DateTime(dt).to_string(), "2024-03-09 08:05:00");
        assert_eq!(
            serde_json::to_string(&Cell::DateTime(dt)).unwrap(),
            "\"2024-03-09 08:05:00\""
        );
    }

    #[test]
    fn calamine_values_map_to_cells() {
        assert_eq!(Cell::from(&Data::Empty), Cell::Empty);
        assert_eq!(Cell::from(&Data::Float(3.0)), Cell::Float(3.0));
        assert_eq!(Cell::from(&Data::String("x".into())), Cell::Text("x".into()));
        assert_eq!(
            Cell::from(&Data::Error(calamine::CellErrorType::NA)),
            Cell::Error("#N/A".into())
        );
    }

    #[test]
    fn header_row_rejects_zero() {
        assert!(HeaderRow::new(0).is_none());
        assert_eq!(HeaderRow::new(3).unwrap().index0(), 2);
        assert_eq!(HeaderRow::default().get(), 1);
    }

    #[test]
    fn rows_are_aligned_to_labels() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec![Cell::Int(1)], vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]],
        );
        assert!(table.rows().iter().all(|row| row.len() == 2));
        assert_eq!(table.rows()[0][1], Cell::Empty);
        assert_eq!(table.height(), 2);
    }

    #[test]
    fn normalize_headers_rewrites_labels_only() {
        let mut table = Table::new(
            vec![" id".into(), "name".into(), "id ".into()],
            vec![vec![Cell::Int(1), Cell::Text("Alice".into()), Cell::Int(2)]],
        );
        table.normalize_headers();
        assert_eq!(table.columns(), ["id", "name", "id_1"]);
        assert_eq!(table.rows()[0][2], Cell::Int(2));
    }
}
