//! Conversational webhook protocol: request/response wire format.
//!
//! The assistant runtime POSTs one JSON request per fulfillment call and
//! expects one JSON response back. Field names follow the runtime's
//! camelCase format.
//!
//! # Response invariants
//!
//! The runtime rejects responses where `session.params`, `user.params` or
//! `scene` are missing or are not objects. [`WebhookResponse`] types them
//! as maps/structs, so they always serialize as objects, even when empty.
//!
//! # Usage
//!
//! ```ignore
//! use handsfree_protocol::{WebhookRequest, WebhookResponse};
//!
//! let request: WebhookRequest = serde_json::from_str(&body)?;
//! let mut response = WebhookResponse::for_request(&request);
//! response.say("What should I do?");
//! let json = serde_json::to_string_pretty(&response)?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form parameter storage (session and user params).
pub type Params = Map<String, Value>;

// =============================================================================
// Request
// =============================================================================

/// One fulfillment call from the assistant runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookRequest {
    #[serde(default)]
    pub handler: Handler,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub scene: SceneState,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub device: Device,
}

/// The webhook handler the runtime wants invoked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Handler {
    #[serde(default)]
    pub name: String,
}

/// The matched intent and its parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Current scene and its slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneState {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slots: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_filling_status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "params_or_empty")]
    pub params: Params,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default, deserialize_with = "params_or_empty")]
    pub params: Params,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Device capability required to open an account-linking URL.
pub const CAPABILITY_WEB_LINK: &str = "WEB_LINK";

/// Accepts an object, or `null`/`[]` (both meaning "nothing stored").
fn params_or_empty<'de, D>(deserializer: D) -> Result<Params, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Params::new()),
        Value::Array(items) if items.is_empty() => Ok(Params::new()),
        other => Err(serde::de::Error::custom(format!(
            "params must be an object, got {}",
            other
        ))),
    }
}

impl WebhookRequest {
    /// Resolved value of an intent parameter, `None` when absent or null.
    pub fn intent_param(&self, name: &str) -> Option<&Value> {
        self.intent
            .params
            .get(name)
            .and_then(|p| p.get("resolved"))
            .filter(|v| !v.is_null())
    }

    /// Resolved intent parameter as text. Numbers are rendered as text.
    pub fn intent_string(&self, name: &str) -> Option<String> {
        self.intent_param(name).and_then(value_as_string)
    }

    /// Resolved intent parameter as a number. Numeric strings are accepted.
    pub fn intent_number(&self, name: &str) -> Option<f64> {
        match self.intent_param(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Value of a scene slot as text.
    pub fn slot_string(&self, name: &str) -> Option<String> {
        self.scene
            .slots
            .get(name)
            .and_then(|s| s.get("value"))
            .and_then(value_as_string)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.device.capabilities.iter().any(|c| c == capability)
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// Response
// =============================================================================

/// Fulfillment response. See the module docs for the always-object fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub session: SessionUpdate,
    pub user: UserUpdate,
    pub scene: SceneUpdate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdate {
    pub id: String,
    pub params: Params,
    #[serde(default)]
    pub type_overrides: Vec<TypeOverride>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    pub params: Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<NextScene>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextScene {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// Append to (false) or replace (true) prompts queued by the runtime.
    #[serde(rename = "override")]
    pub override_queued: bool,
    pub first_simple: Simple,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simple {
    pub speech: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Visual content attached to a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Content {
    Card(Card),
    List(List),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub text: String,
    pub button: Button,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    pub name: String,
    pub open: OpenUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct List {
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub key: String,
}

// =============================================================================
// Type overrides
// =============================================================================

/// Session-scoped replacement of a type's allowed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeOverride {
    pub name: String,
    pub mode: TypeOverrideMode,
    pub synonym: SynonymType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeOverrideMode {
    TypeReplace,
    TypeMerge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymType {
    pub entries: Vec<SynonymEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynonymEntry {
    pub name: String,
    pub synonyms: Vec<String>,
    pub display: EntryDisplay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDisplay {
    pub title: String,
}

impl TypeOverride {
    /// Replace a type with exactly `names`, each its own only synonym.
    pub fn replace_with<I, S>(type_name: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = names
            .into_iter()
            .map(|n| {
                let n = n.into();
                SynonymEntry {
                    name: n.clone(),
                    synonyms: vec![n.clone()],
                    display: EntryDisplay { title: n },
                }
            })
            .collect();
        Self {
            name: type_name.to_string(),
            mode: TypeOverrideMode::TypeReplace,
            synonym: SynonymType { entries },
        }
    }
}

/// Slot status that makes the runtime re-prompt for the slot.
pub const SLOT_STATUS_INVALID: &str = "INVALID";

impl WebhookResponse {
    /// Response pre-filled from the request: session id echoed, stored
    /// session and user params preserved, empty scene.
    pub fn for_request(request: &WebhookRequest) -> Self {
        Self {
            session: SessionUpdate {
                id: request.session.id.clone(),
                params: request.session.params.clone(),
                type_overrides: Vec::new(),
            },
            user: UserUpdate {
                params: request.user.params.clone(),
            },
            scene: SceneUpdate::default(),
            prompt: None,
        }
    }

    /// Speak `speech` (replacing any prompt set earlier in this response).
    pub fn say(&mut self, speech: impl Into<String>) -> &mut Self {
        self.prompt = Some(Prompt {
            override_queued: false,
            first_simple: Simple { speech: speech.into(), text: None },
            content: None,
        });
        self
    }

    /// Transition to `scene` after this turn.
    pub fn go_to(&mut self, scene: impl Into<String>) -> &mut Self {
        self.scene.next = Some(NextScene { name: scene.into() });
        self
    }

    /// Speech of the current prompt, if any.
    pub fn speech(&self) -> Option<&str> {
        self.prompt.as_ref().map(|p| p.first_simple.speech.as_str())
    }

    /// Name of the scene transition, if any.
    pub fn next_scene(&self) -> Option<&str> {
        self.scene.next.as_ref().map(|n| n.name.as_str())
    }
}
