use crate::pvt::tools::model::KeyedTable;

/// Renders a keyed table as an aligned plain-text grid with the key column
/// first.
pub fn render_table(table: &KeyedTable) -> String {
    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push(table.key_column.clone());
    header.extend(table.columns.iter().cloned());

    let body: Vec<Vec<String>> = table
        .records
        .iter()
        .map(|record| {
            std::iter::once(record.key.to_string())
                .chain(record.values.iter().map(|value| value.to_string()))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|cell| cell.chars().count()).collect();
    for row in &body {
        for (col_idx, cell) in row.iter().enumerate() {
            widths[col_idx] = widths[col_idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    push_line(&mut output, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
    push_line(&mut output, &rule, &widths);
    for row in &body {
        push_line(&mut output, row, &widths);
    }
    output
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    output.push_str(line.trim_end());
    output.push('\n');
}
