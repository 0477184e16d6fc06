//! State persisted by the assistant between turns.
//!
//! User params (survive across conversations):
//! - `access_token`: the Google token, as a JSON string
//! - `sheets_mapping`: spoken name → linked sheet, in linking order
//!
//! Session params (one conversation):
//! - `sheet_name`: the sheet currently open, or null

use handsfree_core::OpenSheet;
use handsfree_protocol::{Params, TypeOverride};
use handsfree_sheets_client::GoogleToken;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub const ACCESS_TOKEN_PARAM: &str = "access_token";
pub const SHEETS_MAPPING_PARAM: &str = "sheets_mapping";
pub const SHEET_NAME_PARAM: &str = "sheet_name";

/// Assistant type whose values are replaced by the linked sheet names.
pub const SHEET_NAME_TYPE: &str = "sheet_name";

/// Linked sheets keyed by the name the user speaks, in linking order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetsMapping {
    entries: Vec<(String, OpenSheet)>,
}

impl SheetsMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mapping stored in user params. Missing or unreadable means empty.
    pub fn from_params(params: &Params) -> Self {
        match params.get(SHEETS_MAPPING_PARAM) {
            None | Some(Value::Null) => Self::new(),
            Some(value) => match Self::deserialize(value) {
                Ok(mapping) => mapping,
                Err(e) => {
                    log::warn!("Ignoring unreadable {}: {}", SHEETS_MAPPING_PARAM, e);
                    Self::new()
                }
            },
        }
    }

    /// Write the mapping back into user params.
    pub fn store(&self, params: &mut Params) {
        let value = serde_json::to_value(self).unwrap_or_else(|e| {
            log::error!("Cannot encode {}: {}", SHEETS_MAPPING_PARAM, e);
            Value::Object(Params::new())
        });
        params.insert(SHEETS_MAPPING_PARAM.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&OpenSheet> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Link `name`. Re-linking an existing name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, sheet: OpenSheet) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = sheet,
            None => self.entries.push((name, sheet)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<OpenSheet> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SheetsMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, sheet) in &self.entries {
            map.serialize_entry(name, sheet)?;
        }
        map.end()
    }
}

/// An object of sheets, or an empty array (how an empty mapping may have
/// been stored).
impl<'de> Deserialize<'de> for SheetsMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => {
                let mut mapping = SheetsMapping::new();
                for (name, value) in map {
                    let sheet = OpenSheet::deserialize(value).map_err(D::Error::custom)?;
                    mapping.insert(name, sheet);
                }
                Ok(mapping)
            }
            Value::Array(items) if items.is_empty() => Ok(SheetsMapping::new()),
            other => Err(D::Error::custom(format!(
                "expected an object of sheets, got {}",
                other
            ))),
        }
    }
}

/// Name of the sheet open in this session, if any.
pub fn open_sheet_name(session_params: &Params) -> Option<&str> {
    session_params
        .get(SHEET_NAME_PARAM)
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
}

pub fn set_open_sheet_name(session_params: &mut Params, name: Option<&str>) {
    let value = name.map_or(Value::Null, |n| Value::String(n.to_string()));
    session_params.insert(SHEET_NAME_PARAM.to_string(), value);
}

/// Token stored in user params. Unreadable tokens count as absent.
pub fn stored_token(user_params: &Params) -> Option<GoogleToken> {
    let raw = user_params.get(ACCESS_TOKEN_PARAM)?.as_str()?;
    if raw.is_empty() {
        return None;
    }
    match GoogleToken::from_param(raw) {
        Ok(token) => Some(token),
        Err(e) => {
            log::warn!("Ignoring unreadable {}: {}", ACCESS_TOKEN_PARAM, e);
            None
        }
    }
}

pub fn store_token(user_params: &mut Params, token: &GoogleToken) {
    user_params.insert(ACCESS_TOKEN_PARAM.to_string(), Value::String(token.to_param()));
}

/// Restrict the `sheet_name` type to the linked names.
pub fn sheet_name_override(mapping: &SheetsMapping) -> TypeOverride {
    TypeOverride::replace_with(SHEET_NAME_TYPE, mapping.names())
}
