use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::pvt::tools::error::Result;
use crate::pvt::tools::model::KeyedTable;

/// Writes the table to a CSV file with the key column first.
pub fn export_csv(table: &KeyedTable, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(table, file)?;
    debug!(path = %path.display(), rows = table.len(), "csv written");
    Ok(())
}

/// Writes the table as CSV to any writer.
pub fn write_csv<W: Write>(table: &KeyedTable, writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(std::iter::once(&table.key_column).chain(table.columns.iter()))?;
    for record in &table.records {
        csv_writer.write_record(
            std::iter::once(record.key.to_string())
                .chain(record.values.iter().map(|value| value.to_string())),
        )?;
    }
    csv_writer.flush()?;
    Ok(())
}
