//! Field-location resolution over a fetched sheet grid.
//!
//! Matching rules:
//! - Header cells, item names and field names are compared after Unicode
//!   lowercase folding. No trimming.
//! - The `name` column is mandatory; it anchors item identity.
//! - Header lookups take the leftmost match, row lookups the topmost.
//!   Duplicate item names are not an error; later duplicates are simply
//!   unreachable.
//! - Returned row indices are in full-grid coordinates (header counted).

use crate::error::SheetError;
use crate::grid::cell_text;

/// Header text of the column that identifies each item.
pub const NAME_FIELD: &str = "name";

/// Grid coordinates of a resolved cell, header row included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellLocation {
    pub row: usize,
    pub column: usize,
}

/// Find the cell holding `field_name` for the item called `item_name`.
///
/// Fails with [`SheetError::MissingNameColumn`] when the grid has no header
/// or no `name` column, [`SheetError::MissingFieldColumn`] when the field is
/// not a header, and [`SheetError::ItemNotFound`] when no data row matches.
pub fn locate(
    grid: &[Vec<String>],
    item_name: &str,
    field_name: &str,
) -> Result<CellLocation, SheetError> {
    let header: Vec<String> = grid
        .first()
        .map(|row| row.iter().map(|cell| cell.to_lowercase()).collect())
        .unwrap_or_default();

    let name_column = header
        .iter()
        .position(|h| h == NAME_FIELD)
        .ok_or(SheetError::MissingNameColumn)?;

    let wanted_field = field_name.to_lowercase();
    let column = header
        .iter()
        .position(|h| *h == wanted_field)
        .ok_or_else(|| SheetError::MissingFieldColumn(field_name.to_string()))?;

    let wanted_item = item_name.to_lowercase();
    let row = (1..grid.len())
        .find(|&r| cell_text(grid, r, name_column).to_lowercase() == wanted_item)
        .ok_or_else(|| SheetError::ItemNotFound(item_name.to_string()))?;

    Ok(CellLocation { row, column })
}
