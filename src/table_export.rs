use csv::WriterBuilder;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Serializes a grid as comma-separated text with a header row.
pub fn write_csv_to_string(grid: &TableGrid) -> Result<String, ApiError> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::<u8>::new());
    writer.write_record(&grid.header)?;
    for row in &grid.rows {
        writer.write_record(row)?;
    }
    writer.flush().map_err(|error| ApiError::Internal(error.to_string()))?;

    let bytes = writer
        .into_inner()
        .map_err(|error| ApiError::Internal(format!("csv flush failed: {}", error.error())))?;
    String::from_utf8(bytes)
        .map_err(|error| ApiError::Internal(format!("invalid utf-8 csv output: {error}")))
}

/// Header plus the first `max_rows` rows as a markdown table.
pub fn preview(grid: &TableGrid, max_rows: usize) -> String {
    let rows = &grid.rows[..grid.rows.len().min(max_rows)];
    markdown_table(&grid.header, rows)
}

pub fn markdown_table(header: &[String], rows: &[Vec<String>]) -> String {
    let width = header
        .len()
        .max(rows.iter().map(Vec::len).max().unwrap_or(0));
    if width == 0 {
        return String::new();
    }

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(markdown_row(header, width));
    lines.push(format!("|{}", "---|".repeat(width)));
    lines.extend(rows.iter().map(|row| markdown_row(row, width)));
    lines.join("\n")
}

fn markdown_row(cells: &[String], width: usize) -> String {
    let mut line = String::from("|");
    for index in 0..width {
        let cell = cells.get(index).map_or("", String::as_str);
        line.push(' ');
        line.push_str(&escape_cell(cell));
        line.push_str(" |");
    }
    line
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}
