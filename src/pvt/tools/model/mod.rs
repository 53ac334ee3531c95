use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;

use crate::pvt::tools::error::{Result, ToolError};

/// Column holding the session identifier once a table has been keyed.
pub const KEY_COLUMN: &str = "sessionID";

/// Canonical text layout used whenever a timestamp is rendered.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single cell loaded from a CSV file, a workbook, or a spreadsheet API.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Missing value.
    Empty,
    /// Plain string literal.
    Text(String),
    /// Floating point number literal.
    Number(f64),
    /// Boolean literal.
    Bool(bool),
    /// Timestamp without a timezone.
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Returns the string payload of a text cell.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Compares two cells of the same kind. Cells of different kinds have no
    /// ordering and yield `None`.
    pub fn try_cmp(&self, other: &CellValue) -> Option<Ordering> {
        match (self, other) {
            (CellValue::Empty, CellValue::Empty) => Some(Ordering::Equal),
            (CellValue::Text(lhs), CellValue::Text(rhs)) => Some(lhs.cmp(rhs)),
            (CellValue::Number(lhs), CellValue::Number(rhs)) => Some(lhs.total_cmp(rhs)),
            (CellValue::Bool(lhs), CellValue::Bool(rhs)) => Some(lhs.cmp(rhs)),
            (CellValue::DateTime(lhs), CellValue::DateTime(rhs)) => Some(lhs.cmp(rhs)),
            _ => None,
        }
    }

    /// Total ordering across kinds: cells sort by kind first, then by value.
    pub fn total_cmp(&self, other: &CellValue) -> Ordering {
        self.try_cmp(other)
            .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank()))
    }

    /// Short name of the cell kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CellValue::Empty => "empty",
            CellValue::Text(_) => "text",
            CellValue::Number(_) => "number",
            CellValue::Bool(_) => "boolean",
            CellValue::DateTime(_) => "datetime",
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            CellValue::Empty => 0,
            CellValue::Bool(_) => 1,
            CellValue::Number(_) => 2,
            CellValue::DateTime(_) => 3,
            CellValue::Text(_) => 4,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{}", *value as i64)
                } else {
                    write!(f, "{value}")
                }
            }
            CellValue::Bool(value) => write!(f, "{value}"),
            CellValue::DateTime(value) => write!(f, "{}", value.format(DATETIME_FORMAT)),
        }
    }
}

/// An ordered sequence of records as loaded from a file or external source.
/// No column is guaranteed to be unique.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawTable {
    /// Builds a table, padding short rows with empty cells.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self> {
        let width = columns.len();
        let mut padded = Vec::with_capacity(rows.len());
        for (index, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(ToolError::InvalidTable(format!(
                    "row {} has {} cells but the header has {width}",
                    index + 1,
                    row.len()
                )));
            }
            row.resize(width, CellValue::Empty);
            padded.push(row);
        }
        Ok(Self {
            columns,
            rows: padded,
        })
    }

    /// Builds a table from a header row followed by data rows of plain
    /// strings. A column whose non-empty fields all parse as numbers becomes
    /// numeric; every other column stays text.
    pub fn from_text_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let numeric: Vec<bool> = (0..columns.len())
            .map(|col_idx| {
                let mut fields = rows
                    .iter()
                    .filter_map(|row| row.get(col_idx))
                    .map(|field| field.trim())
                    .filter(|field| !field.is_empty())
                    .peekable();
                fields.peek().is_some() && fields.all(|field| parse_number(field).is_some())
            })
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .enumerate()
                    .map(|(col_idx, field)| {
                        if field.trim().is_empty() {
                            CellValue::Empty
                        } else if numeric.get(col_idx).copied().unwrap_or(false) {
                            parse_number(field.trim())
                                .map(CellValue::Number)
                                .unwrap_or(CellValue::Text(field))
                        } else {
                            CellValue::Text(field)
                        }
                    })
                    .collect()
            })
            .collect();

        Self::new(columns, rows)
    }

    /// Builds a table from spreadsheet API values: the first row is the
    /// header, the remainder are data rows.
    pub fn from_values(mut values: Vec<Vec<String>>) -> Result<Self> {
        if values.is_empty() {
            return Err(ToolError::InvalidTable("no header row".into()));
        }
        let header = values.remove(0);
        Self::from_text_rows(header, values)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Renames a column if present. Returns whether a rename happened.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(index) => {
                self.columns[index] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Re-indexes the table by the named key column.
    pub fn into_keyed(self, key_column: &str) -> Result<KeyedTable> {
        let key_index = self
            .column_index(key_column)
            .ok_or_else(|| ToolError::MissingColumn(key_column.to_string()))?;

        let mut columns = self.columns;
        columns.remove(key_index);

        let records = self
            .rows
            .into_iter()
            .map(|mut row| {
                let key = row.remove(key_index);
                KeyedRecord { key, values: row }
            })
            .collect();

        Ok(KeyedTable {
            key_column: key_column.to_string(),
            columns,
            records,
        })
    }
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// A single record of a [`KeyedTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedRecord {
    pub key: CellValue,
    /// Values aligned with [`KeyedTable::columns`].
    pub values: Vec<CellValue>,
}

/// A table indexed by a key column. Several records may share a key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedTable {
    pub key_column: String,
    /// Non-key columns.
    pub columns: Vec<String>,
    pub records: Vec<KeyedRecord>,
}

impl KeyedTable {
    pub fn new(key_column: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            key_column: key_column.into(),
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &CellValue> {
        self.records.iter().map(|record| &record.key)
    }

    /// Finds the first record whose values do not line up with the columns,
    /// returning its position and width.
    pub fn misaligned_record(&self) -> Option<(usize, usize)> {
        self.records
            .iter()
            .position(|record| record.values.len() != self.columns.len())
            .map(|index| (index, self.records[index].values.len()))
    }

    /// Looks up the first record with the given key.
    pub fn get(&self, key: &CellValue) -> Option<&KeyedRecord> {
        self.records.iter().find(|record| &record.key == key)
    }

    /// Reads a cell of a record by column name.
    pub fn value<'a>(&self, record: &'a KeyedRecord, column: &str) -> Option<&'a CellValue> {
        self.column_index(column)
            .and_then(|index| record.values.get(index))
    }

    /// Keeps only the named columns, in the given order.
    pub fn project(&self, columns: &[&str]) -> Result<KeyedTable> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| ToolError::MissingColumn((*name).to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let records = self
            .records
            .iter()
            .map(|record| KeyedRecord {
                key: record.key.clone(),
                values: indices
                    .iter()
                    .map(|index| record.values[*index].clone())
                    .collect(),
            })
            .collect();

        Ok(KeyedTable {
            key_column: self.key_column.clone(),
            columns: columns.iter().map(|name| (*name).to_string()).collect(),
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn infers_numeric_columns_from_text_rows() {
        let table = RawTable::from_values(vec![
            strings(&["sessionID", "score", "note"]),
            strings(&["S1", "5", "fine"]),
            strings(&["S2", "", "7"]),
        ])
        .expect("table built");

        assert_eq!(table.rows[0][1], CellValue::Number(5.0));
        assert_eq!(table.rows[1][1], CellValue::Empty);
        assert_eq!(table.rows[1][2], CellValue::text("7"));
    }

    #[test]
    fn pads_short_rows_and_rejects_wide_ones() {
        let table = RawTable::new(strings(&["a", "b"]), vec![vec![CellValue::text("x")]])
            .expect("short row padded");
        assert_eq!(table.rows[0], vec![CellValue::text("x"), CellValue::Empty]);

        let wide = RawTable::new(
            strings(&["a"]),
            vec![vec![CellValue::text("x"), CellValue::text("y")]],
        );
        assert!(matches!(wide, Err(ToolError::InvalidTable(_))));
    }

    #[test]
    fn keying_moves_the_key_out_of_the_columns() {
        let mut table = RawTable::from_values(vec![
            strings(&["Name", "SessionID"]),
            strings(&["A", "FS_1"]),
        ])
        .expect("table built");
        assert!(table.rename_column("SessionID", KEY_COLUMN));

        let keyed = table.into_keyed(KEY_COLUMN).expect("keyed");
        assert_eq!(keyed.columns, strings(&["Name"]));
        assert_eq!(keyed.records[0].key, CellValue::text("FS_1"));
    }

    #[test]
    fn keying_without_the_key_column_fails() {
        let table = RawTable::from_values(vec![strings(&["Name"])]).expect("table built");
        assert!(matches!(
            table.into_keyed(KEY_COLUMN),
            Err(ToolError::MissingColumn(column)) if column == KEY_COLUMN
        ));
    }

    #[test]
    fn misaligned_records_are_reported() {
        let mut table = KeyedTable::new(KEY_COLUMN, strings(&["a", "b"]));
        table.records.push(KeyedRecord {
            key: CellValue::text("S1"),
            values: vec![CellValue::Empty, CellValue::Empty],
        });
        assert_eq!(table.misaligned_record(), None);

        table.records.push(KeyedRecord {
            key: CellValue::text("S2"),
            values: vec![CellValue::Empty],
        });
        assert_eq!(table.misaligned_record(), Some((1, 1)));
    }

    #[test]
    fn display_uses_canonical_forms() {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(9, 0, 0))
            .expect("valid timestamp");
        assert_eq!(CellValue::DateTime(timestamp).to_string(), "2024-01-01 09:00:00");
        assert_eq!(CellValue::Number(3.0).to_string(), "3");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn cross_kind_cells_do_not_compare() {
        assert_eq!(CellValue::Number(1.0).try_cmp(&CellValue::text("1")), None);
        assert_eq!(
            CellValue::Number(1.0).total_cmp(&CellValue::text("1")),
            Ordering::Less
        );
    }
}
