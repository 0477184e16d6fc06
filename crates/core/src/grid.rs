/// Row-major snapshot of a sheet's values. Row 0 is the header.
///
/// Rows may be ragged: the backend trims trailing empty cells.
pub type SheetGrid = Vec<Vec<String>>;

/// Text of the cell at `(row, column)`, or `""` when the row is short or
/// missing.
pub fn cell_text(grid: &[Vec<String>], row: usize, column: usize) -> &str {
    grid.get(row)
        .and_then(|r| r.get(column))
        .map(String::as_str)
        .unwrap_or("")
}
