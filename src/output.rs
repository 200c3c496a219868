//! Artifact writers and the result record printed on stdout.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::table::{Cell, Table};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The three files produced for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub xlsx: PathBuf,
    pub csv: PathBuf,
    pub json: PathBuf,
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

impl OutputPaths {
    /// `<prefix>.xlsx`, `<prefix>.csv` and `<prefix>.json`. An extension
    /// already present on the prefix is kept.
    pub fn for_prefix(prefix: &Path) -> Self {
        OutputPaths {
            xlsx: with_suffix(prefix, ".xlsx"),
            csv: with_suffix(prefix, ".csv"),
            json: with_suffix(prefix, ".json"),
        }
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|source| Error::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

fn write_error(path: &Path) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// UTF-8 CSV with a leading BOM, one header line, no index column.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    let mut out = create(path)?;
    out.write_all(UTF8_BOM).map_err(write_error(path))?;

    let mut writer = csv::Writer::from_writer(out);
    if table.width() > 0 {
        writer.write_record(table.columns())?;
        for row in table.rows() {
            writer.write_record(row.iter().map(Cell::to_string))?;
        }
    }
    writer.flush().map_err(write_error(path))?;
    Ok(())
}

struct Record<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

/// JSON array of row objects keyed by column label, in column order.
pub fn write_json(path: &Path, table: &Table) -> Result<()> {
    let records: Vec<Record<'_>> = table
        .rows()
        .iter()
        .map(|cells| Record {
            columns: table.columns(),
            cells,
        })
        .collect();

    let mut out = create(path)?;
    serde_json::to_writer(&mut out, &records)?;
    out.flush().map_err(write_error(path))?;
    Ok(())
}

/// Write the raw workbook bytes plus the CSV and JSON renderings.
pub fn write_outputs(workbook: &[u8], prefix: &Path, table: &Table) -> Result<OutputPaths> {
    let paths = OutputPaths::for_prefix(prefix);
    fs::write(&paths.xlsx, workbook).map_err(write_error(&paths.xlsx))?;
    write_csv(&paths.csv, table)?;
    write_json(&paths.json, table)?;
    log::info!(
        "wrote {} rows x {} columns to {}",
        table.height(),
        table.width(),
        paths.csv.display()
    );
    Ok(paths)
}

/// Outcome of one run, printed as a single JSON line.
#[derive(Debug)]
pub enum ResultRecord {
    Success(OutputPaths),
    Failure { error: String },
}

impl ResultRecord {
    pub fn failure(error: impl ToString) -> Self {
        ResultRecord::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ResultRecord::Success(_))
    }
}

impl From<Result<OutputPaths>> for ResultRecord {
    fn from(result: Result<OutputPaths>) -> Self {
        match result {
            Ok(paths) => ResultRecord::Success(paths),
            Err(err) => ResultRecord::failure(err),
        }
    }
}

impl Serialize for ResultRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ResultRecord::Success(paths) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("ok", &true)?;
                map.serialize_entry("xlsx", &paths.xlsx.to_string_lossy())?;
                map.serialize_entry("csv", &paths.csv.to_string_lossy())?;
                map.serialize_entry("json", &paths.json.to_string_lossy())?;
                map.end()
            }
            ResultRecord::Failure { error } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("error", error)?;
                map.end()
            }
        }
    }
}
