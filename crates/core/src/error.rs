/// Failure talking to the remote spreadsheet backend.
///
/// Opaque to the core: it is carried through, logged by the caller and
/// never interpreted further.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// No usable credentials (missing, expired, revoked)
    NotAuthenticated,
    /// Network error
    Network(String),
    /// HTTP error with status code
    Http(u16, String),
    /// Response body could not be understood
    Parse(String),
    /// OAuth endpoint rejected the grant (e.g. `invalid_grant`)
    OAuth(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAuthenticated => write!(f, "Not authenticated with Google"),
            BackendError::Network(msg) => write!(f, "Network error: {}", msg),
            BackendError::Http(code, msg) => write!(f, "HTTP {}: {}", code, msg),
            BackendError::Parse(msg) => write!(f, "Parse error: {}", msg),
            BackendError::OAuth(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

/// Everything that can go wrong locating or mutating an item.
///
/// The resolver variants carry the sentence spoken back to the user,
/// so `Display` is user-facing text.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetError {
    /// Header row has no "name" column (or there is no header at all)
    MissingNameColumn,
    /// Header row has no column with the requested field name
    MissingFieldColumn(String),
    /// No data row has the requested item name
    ItemNotFound(String),
    /// A write was requested with no cells in it
    EmptyPayload,
    /// The backend call failed
    Backend(BackendError),
}

impl SheetError {
    /// True for failures raised by the resolver, before any backend write.
    pub fn is_lookup_failure(&self) -> bool {
        matches!(
            self,
            SheetError::MissingNameColumn
                | SheetError::MissingFieldColumn(_)
                | SheetError::ItemNotFound(_)
        )
    }
}

impl std::fmt::Display for SheetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetError::MissingNameColumn => {
                write!(f, "Cannot find the \"Name\" column in the spreadsheet.")
            }
            SheetError::MissingFieldColumn(field) => {
                write!(f, "Cannot find the \"{}\" column in the spreadsheet.", field)
            }
            SheetError::ItemNotFound(item) => {
                write!(f, "Cannot find a row with name \"{}\" in the spreadsheet.", item)
            }
            SheetError::EmptyPayload => write!(f, "Nothing to write: the value grid is empty."),
            SheetError::Backend(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SheetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SheetError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BackendError> for SheetError {
    fn from(e: BackendError) -> Self {
        SheetError::Backend(e)
    }
}
