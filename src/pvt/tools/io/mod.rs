//! Adapters that turn uploaded files and spreadsheet API payloads into
//! keyed tables, and keyed tables back into workbooks, CSV or text.

pub mod csv_write;
pub mod excel_write;
pub mod table_read;
pub mod text;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::pvt::tools::error::{Result, ToolError};
use crate::pvt::tools::model::{KEY_COLUMN, KeyedTable, RawTable};

/// Key column of the survey export before it is renamed to [`KEY_COLUMN`].
pub const SURVEY_KEY_COLUMN: &str = "SessionID";

/// Workbook flavours calamine can open.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExcelKind {
    Xls,
    Xlsx,
    Xlsb,
}

/// Declared format of an input table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Excel(ExcelKind),
    /// The data already arrives as a table (e.g. a spreadsheet API payload).
    Table,
}

impl TableFormat {
    /// Infers the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ToolError::UnsupportedFormat(path.display().to_string()))?;
        extension.parse()
    }
}

impl FromStr for TableFormat {
    type Err = ToolError;

    fn from_str(tag: &str) -> Result<Self> {
        let tag = tag.trim().trim_start_matches('.').to_ascii_lowercase();
        match tag.as_str() {
            "csv" => Ok(TableFormat::Csv),
            "xls" => Ok(TableFormat::Excel(ExcelKind::Xls)),
            "xlsb" => Ok(TableFormat::Excel(ExcelKind::Xlsb)),
            "df" | "table" => Ok(TableFormat::Table),
            other if other.starts_with("xls") => Ok(TableFormat::Excel(ExcelKind::Xlsx)),
            other => Err(ToolError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableFormat::Csv => write!(f, "csv"),
            TableFormat::Excel(ExcelKind::Xls) => write!(f, "xls"),
            TableFormat::Excel(ExcelKind::Xlsx) => write!(f, "xlsx"),
            TableFormat::Excel(ExcelKind::Xlsb) => write!(f, "xlsb"),
            TableFormat::Table => write!(f, "table"),
        }
    }
}

/// Anything that can hand over a raw table.
pub trait TableSource {
    /// Human readable description used in logs.
    fn describe(&self) -> String;

    fn load(&self) -> Result<RawTable>;
}

/// A CSV or workbook file on disk.
#[derive(Debug, Clone)]
pub struct FileTableSource {
    pub path: PathBuf,
    pub format: TableFormat,
}

impl FileTableSource {
    /// Creates a source whose format is inferred from the file extension.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let format = TableFormat::from_path(&path)?;
        Ok(Self { path, format })
    }

    pub fn with_format(path: impl Into<PathBuf>, format: TableFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

impl TableSource for FileTableSource {
    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.format)
    }

    fn load(&self) -> Result<RawTable> {
        if !self.path.exists() {
            return Err(ToolError::MissingInput(self.path.clone()));
        }
        table_read::read_table_path(&self.path, self.format)
    }
}

/// Header row plus data rows, as returned by a spreadsheet values API.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuesTableSource {
    pub values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl ValuesTableSource {
    pub fn new(values: Vec<Vec<String>>) -> Self {
        Self { values }
    }

    /// Parses a saved values payload of the form `{"values": [[...], ...]}`.
    pub fn from_json(source: &str) -> Result<Self> {
        let range: ValueRange = serde_json::from_str(source)?;
        let values = range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(json_to_field).collect())
            .collect();
        Ok(Self { values })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }
}

impl TableSource for ValuesTableSource {
    fn describe(&self) -> String {
        format!("spreadsheet values ({} rows)", self.values.len())
    }

    fn load(&self) -> Result<RawTable> {
        RawTable::from_values(self.values.clone())
    }
}

fn json_to_field(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(value) => value,
        other => other.to_string(),
    }
}

/// Keys a PVT table by its `sessionID` column.
pub fn key_pvt(raw: RawTable) -> Result<KeyedTable> {
    raw.into_keyed(KEY_COLUMN)
}

/// Renames the survey's `SessionID` column to `sessionID` and keys by it.
pub fn key_survey(mut raw: RawTable) -> Result<KeyedTable> {
    raw.rename_column(SURVEY_KEY_COLUMN, KEY_COLUMN);
    raw.into_keyed(KEY_COLUMN)
}

/// Result of loading both inputs.
#[derive(Debug)]
pub enum LoadedPair {
    Ready { pvt: KeyedTable, survey: KeyedTable },
    /// One of the inputs lacks its key column; reconciliation must not run.
    Skipped { warning: String },
}

/// Loads and keys both inputs. A missing key column is reported as a warning
/// instead of an error.
pub fn load_pair(pvt: &dyn TableSource, survey: &dyn TableSource) -> Result<LoadedPair> {
    let pvt_raw = pvt.load()?;
    debug!(source = %pvt.describe(), rows = pvt_raw.rows.len(), "loaded PVT table");
    let survey_raw = survey.load()?;
    debug!(source = %survey.describe(), rows = survey_raw.rows.len(), "loaded survey table");

    let pvt = match key_pvt(pvt_raw) {
        Ok(table) => table,
        Err(ToolError::MissingColumn(column)) => {
            warn!(%column, "PVT table has no key column");
            return Ok(LoadedPair::Skipped {
                warning: "The PVT file was invalid.".into(),
            });
        }
        Err(other) => return Err(other),
    };

    let survey = match key_survey(survey_raw) {
        Ok(table) => table,
        Err(ToolError::MissingColumn(column)) => {
            warn!(%column, "survey table has no key column");
            return Ok(LoadedPair::Skipped {
                warning: "The survey file was invalid.".into(),
            });
        }
        Err(other) => return Err(other),
    };

    Ok(LoadedPair::Ready { pvt, survey })
}
