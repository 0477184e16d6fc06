//! Mutation gateway: coordinates in, range-scoped backend requests out.
//!
//! All indices are zero-based full-grid coordinates (header row counted),
//! which is exactly what the backend's `GridRange`/`DimensionRange` expect,
//! so no offsetting happens here. What this module owns is the bounding-box
//! math and the request shapes.

use serde::{Deserialize, Serialize};

use crate::error::{BackendError, SheetError};
use crate::grid::SheetGrid;
use crate::requests::{
    BatchUpdateSpreadsheetRequest, BatchUpdateValuesByDataFilterRequest, DataFilter,
    DataFilterValueRange, DeleteDimensionRequest, Dimension, DimensionRange, GridRange,
    SpreadsheetRequest, ValueInputOption,
};

/// The spreadsheet tab a session is working on.
///
/// Persisted in the user's `sheets_mapping`, so the serialized field names
/// are part of the stored-state contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSheet {
    pub spreadsheet_id: String,
    pub sheet_id: i64,
    pub sheet_title: String,
}

/// One tab of a spreadsheet, as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
}

/// The remote tabular store.
///
/// Implemented over HTTP by `handsfree-sheets-client`; tests use in-memory
/// fakes.
pub trait SheetsBackend {
    /// All values of one tab, row-major. Empty when the tab has no data.
    fn fetch_values(&self, spreadsheet_id: &str, sheet_title: &str)
        -> Result<SheetGrid, BackendError>;

    /// Range-scoped value write.
    fn batch_update_values(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateValuesByDataFilterRequest,
    ) -> Result<(), BackendError>;

    /// Structural update (row deletion).
    fn batch_update_spreadsheet(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateSpreadsheetRequest,
    ) -> Result<(), BackendError>;

    /// Tabs of a spreadsheet.
    fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, BackendError>;
}

impl<B: SheetsBackend + ?Sized> SheetsBackend for Box<B> {
    fn fetch_values(&self, spreadsheet_id: &str, sheet_title: &str) -> Result<SheetGrid, BackendError> {
        (**self).fetch_values(spreadsheet_id, sheet_title)
    }

    fn batch_update_values(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateValuesByDataFilterRequest,
    ) -> Result<(), BackendError> {
        (**self).batch_update_values(spreadsheet_id, request)
    }

    fn batch_update_spreadsheet(
        &self,
        spreadsheet_id: &str,
        request: &BatchUpdateSpreadsheetRequest,
    ) -> Result<(), BackendError> {
        (**self).batch_update_spreadsheet(spreadsheet_id, request)
    }

    fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, BackendError> {
        (**self).sheet_properties(spreadsheet_id)
    }
}

/// Thin request-shaping layer over a backend.
pub struct MutationGateway<'a, B: SheetsBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: SheetsBackend + ?Sized> MutationGateway<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Fresh snapshot of the open sheet. Never cached.
    pub fn fetch_grid(&self, sheet: &OpenSheet) -> Result<SheetGrid, SheetError> {
        Ok(self.backend.fetch_values(&sheet.spreadsheet_id, &sheet.sheet_title)?)
    }

    /// Write `values` with its top-left cell at `(row_index, column_index)`.
    ///
    /// Exactly the payload's bounding box is touched. Values are sent with
    /// user-entered semantics so numbers land as numeric cells.
    pub fn update_range(
        &self,
        sheet: &OpenSheet,
        row_index: usize,
        column_index: usize,
        values: &[Vec<serde_json::Value>],
    ) -> Result<GridRange, SheetError> {
        let range = bounding_box(sheet.sheet_id, row_index, column_index, values)
            .ok_or(SheetError::EmptyPayload)?;
        let request = values_request(range, values.to_vec());
        self.backend.batch_update_values(&sheet.spreadsheet_id, &request)?;
        Ok(range)
    }

    /// Delete the single row at `row_index`. Rows below shift up, so any
    /// index computed before this call is stale afterwards.
    pub fn delete_row(&self, sheet: &OpenSheet, row_index: usize) -> Result<DimensionRange, SheetError> {
        let range = DimensionRange {
            sheet_id: sheet.sheet_id,
            dimension: Dimension::Rows,
            start_index: row_index,
            end_index: row_index + 1,
        };
        let request = BatchUpdateSpreadsheetRequest {
            requests: vec![SpreadsheetRequest::DeleteDimension(DeleteDimensionRequest { range })],
        };
        self.backend.batch_update_spreadsheet(&sheet.spreadsheet_id, &request)?;
        Ok(range)
    }

    pub fn sheet_properties(&self, spreadsheet_id: &str) -> Result<Vec<SheetProperties>, SheetError> {
        Ok(self.backend.sheet_properties(spreadsheet_id)?)
    }
}

/// End-exclusive box covering `values` anchored at `(row, column)`.
/// Height is the row count, width the widest row. `None` for no cells.
fn bounding_box(
    sheet_id: i64,
    row: usize,
    column: usize,
    values: &[Vec<serde_json::Value>],
) -> Option<GridRange> {
    let height = values.len();
    let width = values.iter().map(Vec::len).max().unwrap_or(0);
    if height == 0 || width == 0 {
        return None;
    }
    Some(GridRange {
        sheet_id,
        start_row_index: row,
        end_row_index: row + height,
        start_column_index: column,
        end_column_index: column + width,
    })
}

fn values_request(
    range: GridRange,
    values: Vec<Vec<serde_json::Value>>,
) -> BatchUpdateValuesByDataFilterRequest {
    BatchUpdateValuesByDataFilterRequest {
        value_input_option: ValueInputOption::UserEntered,
        data: vec![DataFilterValueRange {
            data_filter: DataFilter { grid_range: range },
            major_dimension: Dimension::Rows,
            values,
        }],
    }
}
