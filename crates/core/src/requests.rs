//! Request bodies for the spreadsheet backend (Google Sheets v4 shapes).
//!
//! Field names follow the REST wire format (camelCase). Index ranges are
//! zero-based and end-exclusive on both axes.

use serde::{Deserialize, Serialize};

// ── Values: batchUpdateByDataFilter ─────────────────────────────────

/// A rectangle on one sheet, `[start, end)` on rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRange {
    pub sheet_id: i64,
    pub start_row_index: usize,
    pub end_row_index: usize,
    pub start_column_index: usize,
    pub end_column_index: usize,
}

impl GridRange {
    pub fn height(&self) -> usize {
        self.end_row_index - self.start_row_index
    }

    pub fn width(&self) -> usize {
        self.end_column_index - self.start_column_index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    pub grid_range: GridRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilterValueRange {
    pub data_filter: DataFilter,
    pub major_dimension: Dimension,
    pub values: Vec<Vec<serde_json::Value>>,
}

/// How the backend interprets written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueInputOption {
    /// Stored verbatim as literals
    Raw,
    /// Parsed as if typed into the UI (numbers stay numbers)
    UserEntered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateValuesByDataFilterRequest {
    pub value_input_option: ValueInputOption,
    pub data: Vec<DataFilterValueRange>,
}

// ── Spreadsheet: batchUpdate ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Dimension {
    Rows,
    Columns,
}

/// A run of whole rows or columns, `[start_index, end_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRange {
    pub sheet_id: i64,
    pub dimension: Dimension,
    pub start_index: usize,
    pub end_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDimensionRequest {
    pub range: DimensionRange,
}

/// One entry of a spreadsheet batch update. Only the kinds this
/// service issues are modelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpreadsheetRequest {
    DeleteDimension(DeleteDimensionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateSpreadsheetRequest {
    pub requests: Vec<SpreadsheetRequest>,
}
