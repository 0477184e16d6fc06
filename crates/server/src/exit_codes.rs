//! Exit codes of the `handsfree` binary.
//!
//! | Code | Meaning                                          |
//! |------|--------------------------------------------------|
//! | 0    | Clean shutdown                                   |
//! | 1    | Runtime failure (bind error, bad client secret)  |
//! | 2    | Usage or configuration error                     |

/// Success.
pub const EXIT_SUCCESS: u8 = 0;

/// Runtime failure after configuration was accepted.
pub const EXIT_ERROR: u8 = 1;

/// Bad arguments, missing or invalid configuration.
pub const EXIT_USAGE: u8 = 2;
