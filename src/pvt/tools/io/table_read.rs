use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use calamine::{DataType, Range, Reader, Xls, Xlsb, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::pvt::tools::error::{Result, ToolError};
use crate::pvt::tools::io::{ExcelKind, TableFormat};
use crate::pvt::tools::model::{CellValue, RawTable};

/// Reads a table from a file on disk.
pub fn read_table_path(path: &Path, format: TableFormat) -> Result<RawTable> {
    let file = BufReader::new(File::open(path)?);
    read_table(file, format)
}

/// Reads a table from any seekable reader, such as an uploaded file held in
/// memory.
pub fn read_table<R: Read + Seek>(reader: R, format: TableFormat) -> Result<RawTable> {
    match format {
        TableFormat::Csv => read_csv(reader),
        TableFormat::Excel(ExcelKind::Xlsx) => read_workbook::<_, Xlsx<_>>(reader),
        TableFormat::Excel(ExcelKind::Xls) => read_workbook::<_, Xls<_>>(reader),
        TableFormat::Excel(ExcelKind::Xlsb) => read_workbook::<_, Xlsb<_>>(reader),
        TableFormat::Table => Err(ToolError::UnsupportedFormat(format.to_string())),
    }
}

/// Reads a CSV document whose first record is the header.
pub fn read_csv<R: Read>(reader: R) -> Result<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let columns: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|header| header.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }

    RawTable::from_text_rows(columns, rows)
}

fn read_workbook<RS, W>(reader: RS) -> Result<RawTable>
where
    RS: Read + Seek,
    W: Reader<RS>,
    calamine::Error: From<W::Error>,
{
    let mut workbook = W::new(reader).map_err(calamine::Error::from)?;
    let range = read_first_sheet(&mut workbook)?;
    range_to_table(&range)
}

fn read_first_sheet<RS, W>(workbook: &mut W) -> Result<Range<DataType>>
where
    RS: Read + Seek,
    W: Reader<RS>,
    calamine::Error: From<W::Error>,
{
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ToolError::InvalidTable("workbook has no worksheets".into()))?;
    let range_result = workbook
        .worksheet_range(&name)
        .ok_or_else(|| ToolError::InvalidTable(format!("missing sheet '{name}'")))?;
    let range = range_result.map_err(calamine::Error::from)?;
    Ok(range)
}

fn range_to_table(range: &Range<DataType>) -> Result<RawTable> {
    let mut rows = range.rows();
    let columns: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|cell| cell_to_value(cell).to_string())
            .collect(),
        None => return Err(ToolError::InvalidTable("worksheet is empty".into())),
    };

    let rows = rows
        .map(|row| row.iter().map(cell_to_value).collect::<Vec<_>>())
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    RawTable::new(columns, rows)
}

fn cell_to_value(cell: &DataType) -> CellValue {
    match cell {
        DataType::String(value) if value.trim().is_empty() => CellValue::Empty,
        DataType::String(value) => CellValue::Text(value.clone()),
        DataType::Float(value) => CellValue::Number(*value),
        DataType::Int(value) => CellValue::Number(*value as f64),
        DataType::Bool(value) => CellValue::Bool(*value),
        DataType::DateTime(serial) => excel_serial_to_datetime(*serial)
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(*serial)),
        DataType::Empty => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

/// Converts an Excel serial date (days since 1899-12-30, fractional part is
/// the time of day) into a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::milliseconds(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn csv_header_and_rows_are_read() {
        let source = "sessionID,datetime,score\nS1,2024-01-01 10:00,5\n,,\nS1,2024-01-01 09:00,3\n";
        let table = read_table(Cursor::new(source), TableFormat::Csv).expect("CSV read");

        assert_eq!(table.columns, vec!["sessionID", "datetime", "score"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], CellValue::text("S1"));
        assert_eq!(table.rows[1][1], CellValue::text("2024-01-01 09:00"));
        assert_eq!(table.rows[1][2], CellValue::Number(3.0));
    }

    #[test]
    fn csv_rows_wider_than_header_are_rejected() {
        let source = "a,b\n1,2,3\n";
        let result = read_table(Cursor::new(source), TableFormat::Csv);
        assert!(matches!(result, Err(ToolError::InvalidTable(_))));
    }

    #[test]
    fn table_format_cannot_be_read_from_bytes() {
        let result = read_table(Cursor::new(""), TableFormat::Table);
        assert!(matches!(result, Err(ToolError::UnsupportedFormat(_))));
    }

    #[test]
    fn excel_serials_convert_to_timestamps() {
        let timestamp = excel_serial_to_datetime(45292.375).expect("valid serial");
        assert_eq!(timestamp.to_string(), "2024-01-01 09:00:00");
        assert!(excel_serial_to_datetime(f64::NAN).is_none());
    }

    #[test]
    fn garbage_bytes_are_not_a_workbook() {
        let result = read_table(
            Cursor::new(b"not a workbook".to_vec()),
            TableFormat::Excel(ExcelKind::Xlsx),
        );
        assert!(matches!(result, Err(ToolError::ExcelRead(_))));
    }
}
