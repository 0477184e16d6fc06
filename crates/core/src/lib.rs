//! Item index core: resolver, modifications and the mutation gateway.
//!
//! Two pieces:
//! - the resolver, which maps `(item name, field name)` to grid coordinates
//! - the mutation gateway, which turns coordinates into range-scoped
//!   requests against a [`SheetsBackend`]
//!
//! No HTTP here. The Google implementation of the backend lives in
//! `handsfree-sheets-client`.

mod error;
mod gateway;
mod grid;
mod modify;
mod requests;
mod resolver;

pub use error::{BackendError, SheetError};
pub use gateway::{MutationGateway, OpenSheet, SheetProperties, SheetsBackend};
pub use grid::{cell_text, SheetGrid};
pub use modify::{format_number, number_value, parse_cell_number, Modification};
pub use requests::{
    BatchUpdateSpreadsheetRequest, BatchUpdateValuesByDataFilterRequest, DataFilter,
    DataFilterValueRange, DeleteDimensionRequest, Dimension, DimensionRange, GridRange,
    SpreadsheetRequest, ValueInputOption,
};
pub use resolver::{locate, CellLocation, NAME_FIELD};
