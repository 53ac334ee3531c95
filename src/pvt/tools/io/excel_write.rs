use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use rust_xlsxwriter::{Workbook, Worksheet};
use tracing::debug;
use uuid::Uuid;

use crate::pvt::tools::config::ExportConfig;
use crate::pvt::tools::error::Result;
use crate::pvt::tools::model::{CellValue, KeyedTable};

/// A serialised workbook held in memory for repeated downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    bytes: Vec<u8>,
    file_name: String,
    spilled: bool,
}

impl ExportArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Randomly generated download name ending in `.xlsx`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Whether the workbook outgrew the in-memory buffer while being written.
    pub fn spilled(&self) -> bool {
        self.spilled
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Writes the table to a single-sheet workbook with the key column first.
///
/// The workbook is built in a spooled buffer capped at
/// `config.max_buffer_bytes`; larger workbooks roll over to a temporary file
/// instead of being truncated.
pub fn export_table(table: &KeyedTable, config: &ExportConfig) -> Result<ExportArtifact> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&config.sheet_name)?;
    write_rows(worksheet, table)?;

    let mut spool = tempfile::spooled_tempfile(config.max_buffer_bytes);
    workbook.save_to_writer(&mut spool)?;
    let spilled = spool.is_rolled();

    spool.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    spool.read_to_end(&mut bytes)?;

    debug!(
        bytes = bytes.len(),
        spilled,
        rows = table.len(),
        "workbook serialised"
    );

    Ok(ExportArtifact {
        bytes,
        file_name: format!("{}.xlsx", Uuid::new_v4()),
        spilled,
    })
}

fn write_rows(worksheet: &mut Worksheet, table: &KeyedTable) -> Result<()> {
    worksheet.write_string(0, 0, &table.key_column)?;
    for (col_idx, header) in table.columns.iter().enumerate() {
        worksheet.write_string(0, (col_idx + 1) as u16, header)?;
    }

    for (row_idx, record) in table.records.iter().enumerate() {
        let row = (row_idx + 1) as u32;
        write_cell(worksheet, row, 0, &record.key)?;
        for (col_idx, value) in record.values.iter().enumerate() {
            write_cell(worksheet, row, (col_idx + 1) as u16, value)?;
        }
    }

    let last_row = table.records.len() as u32;
    let last_col = table.columns.len() as u16;
    worksheet.autofilter(0, 0, last_row, last_col)?;
    Ok(())
}

fn write_cell(worksheet: &mut Worksheet, row: u32, col: u16, value: &CellValue) -> Result<()> {
    match value {
        CellValue::Empty => {}
        CellValue::Text(text) => {
            worksheet.write_string(row, col, text)?;
        }
        CellValue::Number(number) => {
            worksheet.write_number(row, col, *number)?;
        }
        CellValue::Bool(flag) => {
            worksheet.write_boolean(row, col, *flag)?;
        }
        CellValue::DateTime(_) => {
            worksheet.write_string(row, col, &value.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvt::tools::io::table_read::read_table;
    use crate::pvt::tools::io::{ExcelKind, TableFormat};
    use crate::pvt::tools::model::KeyedRecord;
    use std::io::Cursor;

    fn sample() -> KeyedTable {
        let mut table = KeyedTable::new("sessionID", vec!["Name".into(), "score".into()]);
        table.records.push(KeyedRecord {
            key: CellValue::text("S1"),
            values: vec![CellValue::text("A"), CellValue::Number(3.0)],
        });
        table
    }

    #[test]
    fn export_puts_the_key_column_first() {
        let artifact = export_table(&sample(), &ExportConfig::default()).expect("exported");
        assert!(artifact.file_name().ends_with(".xlsx"));
        assert!(!artifact.spilled());

        let restored = read_table(
            Cursor::new(artifact.bytes().to_vec()),
            TableFormat::Excel(ExcelKind::Xlsx),
        )
        .expect("workbook read back");
        assert_eq!(restored.columns, vec!["sessionID", "Name", "score"]);
        assert_eq!(restored.rows[0][0], CellValue::text("S1"));
        assert_eq!(restored.rows[0][2], CellValue::Number(3.0));
    }

    #[test]
    fn small_buffers_spill_instead_of_truncating() {
        let config = ExportConfig {
            max_buffer_bytes: 16,
            ..ExportConfig::default()
        };
        let spilled = export_table(&sample(), &config).expect("exported");

        assert!(spilled.spilled());
        assert!(spilled.bytes().len() > 16);
        let restored = read_table(
            Cursor::new(spilled.bytes().to_vec()),
            TableFormat::Excel(ExcelKind::Xlsx),
        )
        .expect("spilled workbook read back");
        assert_eq!(restored.rows.len(), 1);
    }

    #[test]
    fn file_names_are_unique() {
        let first = export_table(&sample(), &ExportConfig::default()).expect("exported");
        let second = export_table(&sample(), &ExportConfig::default()).expect("exported");
        assert_ne!(first.file_name(), second.file_name());
    }
}
