//! Conversational commands.
//!
//! Every webhook call names a handler. It maps to one `Command`, whose
//! preconditions are checked in order (account linked, then sheet open)
//! before its body runs. Every response then gets the `sheet_name` type
//! override, so the assistant only recognizes linked sheet names.

use handsfree_core::{
    cell_text, format_number, locate, number_value, Modification, MutationGateway, OpenSheet,
    SheetError, SheetsBackend, NAME_FIELD,
};
use handsfree_protocol::{
    Button, Card, Content, List, ListItem, OpenUrl, Prompt, Simple, WebhookRequest,
    WebhookResponse, CAPABILITY_WEB_LINK, SLOT_STATUS_INVALID,
};
use serde_json::Value;

use crate::accounts::AccountProvider;
use crate::links::parse_sheet_link;
use crate::session::{
    open_sheet_name, set_open_sheet_name, sheet_name_override, store_token, stored_token,
    SheetsMapping,
};

// =============================================================================
// Scenes and fixed prompts
// =============================================================================

pub const SCENE_LINK_ACCOUNT: &str = "LinkAccount";
pub const SCENE_WORK: &str = "Work";
pub const SCENE_END_CONVERSATION: &str = "actions.scene.END_CONVERSATION";

const MSG_NEEDS_ACCOUNT: &str = "To manipulate your item indices in Google Sheets, you need to link your Google account and allow me to edit the spreadsheets.";
const MSG_NEEDS_OPEN_SHEET: &str = "No spreadsheet is currently opened. Open one by saying \"open spreadsheet\" and the name of the spreadsheet to open.";
const MSG_BACKEND_FAILURE: &str = "Sorry, I couldn't reach Google Sheets. Please try again later.";
const MSG_UNKNOWN_HANDLER: &str = "This handler has not been created yet.";

// =============================================================================
// Commands
// =============================================================================

/// What a command needs before its body may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// A usable Google token is stored for the user
    Authenticated,
    /// The session has a linked sheet open
    OpenSheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ReadField,
    ModifyNumberField,
    RemoveRecord,
    LinkAccount,
    VerifyCode,
    LinkSheet,
    UnlinkSheet,
    OpenSheet,
    ListSheets,
    ValidateSheetName,
    Unknown,
}

impl Command {
    pub fn from_handler(name: &str) -> Self {
        match name {
            "start" => Command::Start,
            "read_field" => Command::ReadField,
            "modify_number_field" => Command::ModifyNumberField,
            "remove_record" => Command::RemoveRecord,
            "link_account" => Command::LinkAccount,
            "verify_code" => Command::VerifyCode,
            "link_sheet" => Command::LinkSheet,
            "unlink_sheet" => Command::UnlinkSheet,
            "open_sheet" => Command::OpenSheet,
            "list_sheets" => Command::ListSheets,
            "validate_sheet_name" => Command::ValidateSheetName,
            _ => Command::Unknown,
        }
    }

    /// Checked in this order; the first unmet one answers the request.
    pub fn preconditions(&self) -> &'static [Precondition] {
        match self {
            Command::ReadField | Command::ModifyNumberField | Command::RemoveRecord => {
                &[Precondition::Authenticated, Precondition::OpenSheet]
            }
            Command::Start
            | Command::LinkSheet
            | Command::UnlinkSheet
            | Command::OpenSheet
            | Command::ListSheets
            | Command::ValidateSheetName => &[Precondition::Authenticated],
            Command::LinkAccount | Command::VerifyCode | Command::Unknown => &[],
        }
    }

    pub fn requires(&self, precondition: Precondition) -> bool {
        self.preconditions().contains(&precondition)
    }
}

// =============================================================================
// Entry point
// =============================================================================

/// Answer one webhook request.
pub fn handle(request: &WebhookRequest, accounts: &dyn AccountProvider) -> WebhookResponse {
    let command = Command::from_handler(&request.handler.name);
    log::debug!("Handler {:?} -> {:?}", request.handler.name, command);

    let mut response = WebhookResponse::for_request(request);
    let mut mapping = SheetsMapping::from_params(&request.user.params);
    let open_sheet = open_sheet_name(&request.session.params)
        .and_then(|name| mapping.get(name))
        .cloned();

    let sheets = if command.requires(Precondition::Authenticated) {
        authenticate(request, accounts, &mut response)
    } else {
        None
    };

    if command.requires(Precondition::Authenticated) && sheets.is_none() {
        response.say(MSG_NEEDS_ACCOUNT).go_to(SCENE_LINK_ACCOUNT);
    } else if command.requires(Precondition::OpenSheet) && open_sheet.is_none() {
        response.say(MSG_NEEDS_OPEN_SHEET).go_to(SCENE_WORK);
    } else {
        run(command, request, accounts, sheets.as_deref(), open_sheet.as_ref(), &mut mapping, &mut response);
    }

    let final_mapping = SheetsMapping::from_params(&response.user.params);
    response.session.type_overrides = vec![sheet_name_override(&final_mapping)];
    response
}

/// Backend for the stored token, refreshing it first when expired. The
/// refreshed token is written back to the response's user params.
fn authenticate(
    request: &WebhookRequest,
    accounts: &dyn AccountProvider,
    response: &mut WebhookResponse,
) -> Option<Box<dyn SheetsBackend>> {
    let mut token = stored_token(&request.user.params)?;

    if token.is_expired() {
        match accounts.refresh(&token) {
            Ok(fresh) => {
                log::debug!("Refreshed access token for session {}", request.session.id);
                store_token(&mut response.user.params, &fresh);
                token = fresh;
            }
            Err(e) => {
                log::warn!("Token refresh failed for session {}: {}", request.session.id, e);
                return None;
            }
        }
    }

    match accounts.sheets(&token) {
        Ok(sheets) => Some(sheets),
        Err(e) => {
            log::error!("Cannot create Sheets client: {}", e);
            None
        }
    }
}

fn run(
    command: Command,
    request: &WebhookRequest,
    accounts: &dyn AccountProvider,
    sheets: Option<&dyn SheetsBackend>,
    open_sheet: Option<&OpenSheet>,
    mapping: &mut SheetsMapping,
    response: &mut WebhookResponse,
) {
    match (command, sheets, open_sheet) {
        (Command::Start, _, _) => start(mapping, response),
        (Command::ReadField, Some(sheets), Some(sheet)) => read_field(request, sheets, sheet, response),
        (Command::ModifyNumberField, Some(sheets), Some(sheet)) => {
            modify_number_field(request, sheets, sheet, response)
        }
        (Command::RemoveRecord, Some(sheets), Some(sheet)) => remove_record(request, sheets, sheet, response),
        (Command::LinkAccount, _, _) => link_account(request, accounts, response),
        (Command::VerifyCode, _, _) => verify_code(request, accounts, response),
        (Command::LinkSheet, Some(sheets), _) => link_sheet(request, sheets, mapping, response),
        (Command::UnlinkSheet, _, _) => unlink_sheet(request, mapping, response),
        (Command::OpenSheet, _, _) => open_sheet_command(request, mapping, response),
        (Command::ListSheets, _, _) => list_sheets(mapping, response),
        (Command::ValidateSheetName, _, _) => validate_sheet_name(request, mapping, response),
        (Command::Unknown, _, _) => {
            response.say(MSG_UNKNOWN_HANDLER);
        }
        (command, _, _) => {
            // Preconditions guarantee the backend and open sheet above.
            log::error!("{:?} reached without its preconditions", command);
            response.say(MSG_BACKEND_FAILURE);
        }
    }
}

/// Resolver failures are spoken as-is; anything else is logged and
/// answered generically.
fn speak_failure(response: &mut WebhookResponse, err: &SheetError) {
    if err.is_lookup_failure() {
        response.say(err.to_string());
    } else {
        log::error!("Sheets request failed: {}", err);
        response.say(MSG_BACKEND_FAILURE);
    }
}

fn param(request: &WebhookRequest, name: &str) -> String {
    request.intent_string(name).unwrap_or_default()
}

// =============================================================================
// Working with items
// =============================================================================

fn start(mapping: &SheetsMapping, response: &mut WebhookResponse) {
    if mapping.is_empty() {
        response.say(
            "You have no spreadsheets to work on. To link a spreadsheet, say \"link spreadsheet\".",
        );
    } else {
        response.say("What should I do?");
    }
}

fn read_field(
    request: &WebhookRequest,
    sheets: &dyn SheetsBackend,
    sheet: &OpenSheet,
    response: &mut WebhookResponse,
) {
    let item = param(request, "item_name");
    let field = param(request, "field_name");

    let gateway = MutationGateway::new(sheets);
    let grid = match gateway.fetch_grid(sheet) {
        Ok(grid) => grid,
        Err(e) => return speak_failure(response, &e),
    };
    let cell = match locate(&grid, &item, &field) {
        Ok(cell) => cell,
        Err(e) => return speak_failure(response, &e),
    };

    let value = cell_text(&grid, cell.row, cell.column);
    response.say(format!("The {} of {} is {}.", field, item, value));
}

fn modify_number_field(
    request: &WebhookRequest,
    sheets: &dyn SheetsBackend,
    sheet: &OpenSheet,
    response: &mut WebhookResponse,
) {
    let item = param(request, "item_name");
    let field = param(request, "field_name");

    let Some(modification) = Modification::from_params(
        request.intent_number("field_value_number"),
        request.intent_number("field_value_increment"),
        request.intent_number("field_value_decrement"),
    ) else {
        response.say(format!(
            "You need to specify the number for the {} of {} to change to, increase by or decrease by.",
            field, item
        ));
        return;
    };

    let gateway = MutationGateway::new(sheets);
    let grid = match gateway.fetch_grid(sheet) {
        Ok(grid) => grid,
        Err(e) => return speak_failure(response, &e),
    };
    let cell = match locate(&grid, &item, &field) {
        Ok(cell) => cell,
        Err(e) => return speak_failure(response, &e),
    };

    let original = cell_text(&grid, cell.row, cell.column);
    let updated = modification.apply(original);

    if let Err(e) = gateway.update_range(sheet, cell.row, cell.column, &[vec![number_value(updated)]]) {
        return speak_failure(response, &e);
    }

    response.say(format!(
        "The {} of {} has been {} from {} to {}.",
        field,
        item,
        modification.past_tense(),
        original,
        format_number(updated)
    ));
}

fn remove_record(
    request: &WebhookRequest,
    sheets: &dyn SheetsBackend,
    sheet: &OpenSheet,
    response: &mut WebhookResponse,
) {
    let item = param(request, "item_name");

    let gateway = MutationGateway::new(sheets);
    let grid = match gateway.fetch_grid(sheet) {
        Ok(grid) => grid,
        Err(e) => return speak_failure(response, &e),
    };
    let cell = match locate(&grid, &item, NAME_FIELD) {
        Ok(cell) => cell,
        Err(e) => return speak_failure(response, &e),
    };

    if let Err(e) = gateway.delete_row(sheet, cell.row) {
        return speak_failure(response, &e);
    }

    response.say(format!("{} has been removed.", item));
}

// =============================================================================
// Account linking
// =============================================================================

fn link_account(request: &WebhookRequest, accounts: &dyn AccountProvider, response: &mut WebhookResponse) {
    if !request.has_capability(CAPABILITY_WEB_LINK) {
        response
            .say("To link an account, you need to switch to a device capable of opening web links, like a phone.")
            .go_to(SCENE_END_CONVERSATION);
        return;
    }

    response.prompt = Some(Prompt {
        override_queued: false,
        first_simple: Simple {
            speech: "Click the button to authenticate to your Google Account.".into(),
            text: None,
        },
        content: Some(Content::Card(Card {
            text: "Click the button below:".into(),
            button: Button {
                name: "Link Account".into(),
                open: OpenUrl { url: accounts.authorization_url() },
            },
        })),
    });
}

fn verify_code(request: &WebhookRequest, accounts: &dyn AccountProvider, response: &mut WebhookResponse) {
    let code = request.slot_string("verification_code").unwrap_or_default();

    match accounts.link_account(&code) {
        Ok(token) => {
            store_token(&mut response.user.params, &token);
            response.say("Account linking successful.").go_to(SCENE_WORK);
        }
        Err(e) => {
            log::warn!("Account linking failed for session {}: {}", request.session.id, e);
            response
                .say(format!("Authentication failed: {}", e))
                .go_to(SCENE_END_CONVERSATION);
        }
    }
}

// =============================================================================
// Managing linked sheets
// =============================================================================

fn link_sheet(
    request: &WebhookRequest,
    sheets: &dyn SheetsBackend,
    mapping: &mut SheetsMapping,
    response: &mut WebhookResponse,
) {
    let name = request.slot_string("sheet_name").unwrap_or_default();
    let url = request.slot_string("sheet_url").unwrap_or_default();

    let Some(link) = parse_sheet_link(&url) else {
        response.say("That doesn't look like a Google Sheets link.");
        return;
    };

    let tabs = match MutationGateway::new(sheets).sheet_properties(&link.spreadsheet_id) {
        Ok(tabs) => tabs,
        Err(e) => return speak_failure(response, &e),
    };
    let Some(tab) = tabs.into_iter().find(|t| t.sheet_id == link.sheet_id) else {
        response.say("I couldn't find that tab in the spreadsheet.");
        return;
    };

    mapping.insert(
        name.clone(),
        OpenSheet {
            spreadsheet_id: link.spreadsheet_id,
            sheet_id: tab.sheet_id,
            sheet_title: tab.title,
        },
    );
    mapping.store(&mut response.user.params);
    set_open_sheet_name(&mut response.session.params, Some(&name));

    response
        .say(format!("Spreadsheet {} has been linked.", name))
        .go_to(SCENE_WORK);
}

fn unlink_sheet(request: &WebhookRequest, mapping: &mut SheetsMapping, response: &mut WebhookResponse) {
    let name = request
        .intent_string("sheet_name")
        .filter(|n| !n.is_empty())
        .or_else(|| open_sheet_name(&request.session.params).map(String::from));

    let Some(name) = name else {
        response.say("You need to specify a spreadsheet to unlink.");
        return;
    };

    if mapping.remove(&name).is_none() {
        response.say(format!("Spreadsheet {} does not exist.", name));
        return;
    }

    mapping.store(&mut response.user.params);
    set_open_sheet_name(&mut response.session.params, None);

    response
        .say(format!("Spreadsheet {} has been unlinked.", name))
        .go_to(SCENE_WORK);
}

fn open_sheet_command(request: &WebhookRequest, mapping: &SheetsMapping, response: &mut WebhookResponse) {
    let name = param(request, "sheet_name");

    if !mapping.contains(&name) {
        response.say(format!("Spreadsheet {} does not exist.", name));
        return;
    }

    set_open_sheet_name(&mut response.session.params, Some(&name));
    response
        .say(format!("You are now working on {}.", name))
        .go_to(SCENE_WORK);
}

fn list_sheets(mapping: &SheetsMapping, response: &mut WebhookResponse) {
    if mapping.is_empty() {
        response.say("There are no linked spreadsheets.");
        return;
    }

    let names: Vec<&str> = mapping.names().collect();
    response.prompt = Some(Prompt {
        override_queued: false,
        first_simple: Simple {
            speech: format!("You have the following spreadsheets: {}", names.join(", ")),
            text: Some("You have the following spreadsheets:".into()),
        },
        content: Some(Content::List(List {
            items: names
                .iter()
                .map(|n| ListItem { key: n.to_string() })
                .collect(),
        })),
    });
}

fn validate_sheet_name(request: &WebhookRequest, mapping: &SheetsMapping, response: &mut WebhookResponse) {
    let mut slots = request.scene.slots.clone();
    let name = request.slot_string("sheet_name").unwrap_or_default();

    if !mapping.contains(&name) {
        if let Some(Value::Object(slot)) = slots.get_mut("sheet_name") {
            slot.insert("status".into(), Value::String(SLOT_STATUS_INVALID.into()));
        }
        response.say(format!("Spreadsheet {} does not exist.", name));
    }

    response.scene.slots = Some(slots);
}

#[cfg(test)]
mod tests {
    use super::*;
    use handsfree_core::{
        BackendError, BatchUpdateSpreadsheetRequest, BatchUpdateValuesByDataFilterRequest, SheetGrid,
        SheetProperties, SpreadsheetRequest,
    };
    use handsfree_sheets_client::GoogleToken;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    // ── Fakes ───────────────────────────────────────────────────────

    /// One in-memory spreadsheet, shared by every backend the fake hands out.
    #[derive(Default)]
    struct Store {
        grid: SheetGrid,
        tabs: Vec<SheetProperties>,
        writes: Vec<BatchUpdateValuesByDataFilterRequest>,
        structural: Vec<BatchUpdateSpreadsheetRequest>,
        fail: bool,
    }

    struct FakeBackend(Arc<Mutex<Store>>);

    impl SheetsBackend for FakeBackend {
        fn fetch_values(&self, _: &str, _: &str) -> Result<SheetGrid, BackendError> {
            let store = self.0.lock().unwrap();
            if store.fail {
                return Err(BackendError::Http(500, "backend down".into()));
            }
            Ok(store.grid.clone())
        }

        fn batch_update_values(
            &self,
            _: &str,
            request: &BatchUpdateValuesByDataFilterRequest,
        ) -> Result<(), BackendError> {
            self.0.lock().unwrap().writes.push(request.clone());
            Ok(())
        }

        fn batch_update_spreadsheet(
            &self,
            _: &str,
            request: &BatchUpdateSpreadsheetRequest,
        ) -> Result<(), BackendError> {
            let mut store = self.0.lock().unwrap();
            for SpreadsheetRequest::DeleteDimension(d) in &request.requests {
                store.grid.remove(d.range.start_index);
            }
            store.structural.push(request.clone());
            Ok(())
        }

        fn sheet_properties(&self, _: &str) -> Result<Vec<SheetProperties>, BackendError> {
            Ok(self.0.lock().unwrap().tabs.clone())
        }
    }

    struct FakeAccounts {
        store: Arc<Mutex<Store>>,
        refresh_ok: bool,
        refreshed: Mutex<u32>,
    }

    impl FakeAccounts {
        fn with_grid(grid: Vec<Vec<&str>>) -> Self {
            let store = Store {
                grid: grid
                    .into_iter()
                    .map(|row| row.into_iter().map(String::from).collect())
                    .collect(),
                tabs: vec![
                    SheetProperties { sheet_id: 0, title: "Sheet1".into() },
                    SheetProperties { sheet_id: 42, title: "Stock".into() },
                ],
                ..Store::default()
            };
            Self {
                store: Arc::new(Mutex::new(store)),
                refresh_ok: true,
                refreshed: Mutex::new(0),
            }
        }
    }

    impl AccountProvider for FakeAccounts {
        fn authorization_url(&self) -> String {
            "https://accounts.example/auth?client_id=cid".into()
        }

        fn link_account(&self, code: &str) -> Result<GoogleToken, BackendError> {
            if code == "good" {
                Ok(token("linked", Some(i64::MAX / 2)))
            } else {
                Err(BackendError::OAuth("invalid_grant".into()))
            }
        }

        fn refresh(&self, _: &GoogleToken) -> Result<GoogleToken, BackendError> {
            *self.refreshed.lock().unwrap() += 1;
            if self.refresh_ok {
                Ok(token("refreshed", Some(i64::MAX / 2)))
            } else {
                Err(BackendError::OAuth("invalid_grant".into()))
            }
        }

        fn sheets(&self, _: &GoogleToken) -> Result<Box<dyn SheetsBackend>, BackendError> {
            Ok(Box::new(FakeBackend(Arc::clone(&self.store))))
        }
    }

    fn token(access: &str, created: Option<i64>) -> GoogleToken {
        GoogleToken {
            access_token: access.into(),
            refresh_token: Some("rt".into()),
            expires_in: 3599,
            created,
            token_type: Some("Bearer".into()),
            scope: None,
            id_token: None,
        }
    }

    fn fresh_token_param() -> String {
        token("stored", Some(i64::MAX / 2)).to_param()
    }

    fn mapping_json() -> Value {
        json!({
            "Pantry": { "spreadsheet_id": "abc", "sheet_id": 42, "sheet_title": "Stock" },
            "Garage": { "spreadsheet_id": "def", "sheet_id": 0, "sheet_title": "Sheet1" }
        })
    }

    /// A linked, authenticated user with "Pantry" open.
    fn request(handler: &str, intent_params: Value) -> WebhookRequest {
        serde_json::from_value(json!({
            "handler": { "name": handler },
            "intent": { "name": handler, "params": intent_params },
            "session": { "id": "sess-1", "params": { "sheet_name": "Pantry" } },
            "user": { "params": {
                "access_token": fresh_token_param(),
                "sheets_mapping": mapping_json()
            }},
            "device": { "capabilities": ["SPEECH", "WEB_LINK"] }
        }))
        .unwrap()
    }

    fn resolved(pairs: &[(&str, Value)]) -> Value {
        let mut params = serde_json::Map::new();
        for (k, v) in pairs {
            params.insert(k.to_string(), json!({ "original": v.to_string(), "resolved": v }));
        }
        Value::Object(params)
    }

    fn stock_accounts() -> FakeAccounts {
        FakeAccounts::with_grid(vec![vec!["Name", "Stock"], vec!["Widget", "10"], vec!["Gadget", "4"]])
    }

    // ── Dispatch ────────────────────────────────────────────────────

    #[test]
    fn test_handler_names() {
        assert_eq!(Command::from_handler("modify_number_field"), Command::ModifyNumberField);
        assert_eq!(Command::from_handler("validate_sheet_name"), Command::ValidateSheetName);
        assert_eq!(Command::from_handler("Start"), Command::Unknown);
        assert_eq!(Command::from_handler(""), Command::Unknown);
    }

    #[test]
    fn test_precondition_order() {
        assert_eq!(
            Command::ReadField.preconditions(),
            &[Precondition::Authenticated, Precondition::OpenSheet]
        );
        assert!(Command::LinkSheet.requires(Precondition::Authenticated));
        assert!(!Command::LinkSheet.requires(Precondition::OpenSheet));
        assert!(Command::VerifyCode.preconditions().is_empty());
    }

    #[test]
    fn test_unknown_handler() {
        let accounts = stock_accounts();
        let resp = handle(&request("make_coffee", json!({})), &accounts);
        assert_eq!(resp.speech(), Some("This handler has not been created yet."));
        assert_eq!(resp.next_scene(), None);
    }

    #[test]
    fn test_unauthenticated_is_sent_to_link_account() {
        let accounts = stock_accounts();
        let mut req = request("read_field", json!({}));
        req.user.params.remove("access_token");

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some(MSG_NEEDS_ACCOUNT));
        assert_eq!(resp.next_scene(), Some("LinkAccount"));
    }

    #[test]
    fn test_no_open_sheet_is_sent_to_work() {
        let accounts = stock_accounts();
        let mut req = request("read_field", json!({}));
        req.session.params.insert("sheet_name".into(), Value::Null);

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some(MSG_NEEDS_OPEN_SHEET));
        assert_eq!(resp.next_scene(), Some("Work"));
    }

    #[test]
    fn test_open_sheet_name_not_in_mapping_counts_as_closed() {
        let accounts = stock_accounts();
        let mut req = request("read_field", json!({}));
        req.session.params.insert("sheet_name".into(), json!("Basement"));

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some(MSG_NEEDS_OPEN_SHEET));
    }

    #[test]
    fn test_type_override_on_every_response() {
        let accounts = stock_accounts();
        let resp = handle(&request("make_coffee", json!({})), &accounts);
        assert_eq!(resp.session.type_overrides.len(), 1);
        let names: Vec<_> = resp.session.type_overrides[0]
            .synonym
            .entries
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["Pantry", "Garage"]);
    }

    #[test]
    fn test_stored_state_is_preserved() {
        let accounts = stock_accounts();
        let req = request("start", json!({}));
        let resp = handle(&req, &accounts);
        assert_eq!(resp.session.id, "sess-1");
        assert_eq!(resp.session.params, req.session.params);
        assert_eq!(resp.user.params, req.user.params);
    }

    // ── Authentication ──────────────────────────────────────────────

    #[test]
    fn test_expired_token_is_refreshed_and_stored() {
        let accounts = stock_accounts();
        let mut req = request("start", json!({}));
        req.user.params.insert("access_token".into(), json!(token("old", Some(0)).to_param()));

        let resp = handle(&req, &accounts);
        assert_eq!(*accounts.refreshed.lock().unwrap(), 1);
        assert_eq!(resp.speech(), Some("What should I do?"));
        let stored = GoogleToken::from_param(resp.user.params["access_token"].as_str().unwrap()).unwrap();
        assert_eq!(stored.access_token, "refreshed");
    }

    #[test]
    fn test_failed_refresh_counts_as_unauthenticated() {
        let mut accounts = stock_accounts();
        accounts.refresh_ok = false;
        let mut req = request("start", json!({}));
        req.user.params.insert("access_token".into(), json!(token("old", None).to_param()));

        let resp = handle(&req, &accounts);
        assert_eq!(resp.next_scene(), Some("LinkAccount"));
    }

    #[test]
    fn test_fresh_token_is_not_refreshed() {
        let accounts = stock_accounts();
        handle(&request("start", json!({})), &accounts);
        assert_eq!(*accounts.refreshed.lock().unwrap(), 0);
    }

    // ── start ───────────────────────────────────────────────────────

    #[test]
    fn test_start_without_sheets() {
        let accounts = stock_accounts();
        let mut req = request("start", json!({}));
        req.user.params.insert("sheets_mapping".into(), json!([]));

        let resp = handle(&req, &accounts);
        assert_eq!(
            resp.speech(),
            Some("You have no spreadsheets to work on. To link a spreadsheet, say \"link spreadsheet\".")
        );
        assert!(resp.session.type_overrides[0].synonym.entries.is_empty());
    }

    // ── read_field ──────────────────────────────────────────────────

    #[test]
    fn test_read_field() {
        let accounts = stock_accounts();
        let req = request(
            "read_field",
            resolved(&[("item_name", json!("gadget")), ("field_name", json!("stock"))]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("The stock of gadget is 4."));
        assert!(accounts.store.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn test_read_field_missing_column_is_spoken() {
        let accounts = stock_accounts();
        let req = request(
            "read_field",
            resolved(&[("item_name", json!("Widget")), ("field_name", json!("Colour"))]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Cannot find the \"Colour\" column in the spreadsheet."));
    }

    #[test]
    fn test_backend_failure_is_generic() {
        let accounts = stock_accounts();
        accounts.store.lock().unwrap().fail = true;
        let req = request(
            "read_field",
            resolved(&[("item_name", json!("Widget")), ("field_name", json!("Stock"))]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some(MSG_BACKEND_FAILURE));
    }

    // ── modify_number_field ─────────────────────────────────────────

    #[test]
    fn test_increase_widget_stock_by_three() {
        let accounts = stock_accounts();
        let req = request(
            "modify_number_field",
            resolved(&[
                ("item_name", json!("Widget")),
                ("field_name", json!("stock")),
                ("field_value_increment", json!(3)),
            ]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("The stock of Widget has been increased from 10 to 13."));

        let store = accounts.store.lock().unwrap();
        assert_eq!(store.writes.len(), 1);
        let data = &store.writes[0].data[0];
        let range = data.data_filter.grid_range;
        assert_eq!((range.sheet_id, range.start_row_index, range.end_row_index), (42, 1, 2));
        assert_eq!((range.start_column_index, range.end_column_index), (1, 2));
        assert_eq!(data.values, vec![vec![json!(13)]]);
    }

    #[test]
    fn test_decrease_non_numeric_cell_counts_from_zero() {
        let accounts = FakeAccounts::with_grid(vec![vec!["Name", "Stock"], vec!["Widget", "lots"]]);
        let req = request(
            "modify_number_field",
            resolved(&[
                ("item_name", json!("Widget")),
                ("field_name", json!("Stock")),
                ("field_value_decrement", json!(2.5)),
            ]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("The Stock of Widget has been decreased from lots to -2.5."));
    }

    #[test]
    fn test_set_wins_over_increment() {
        let accounts = stock_accounts();
        let req = request(
            "modify_number_field",
            resolved(&[
                ("item_name", json!("Gadget")),
                ("field_name", json!("Stock")),
                ("field_value_number", json!(7)),
                ("field_value_increment", json!(1)),
            ]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("The Stock of Gadget has been changed from 4 to 7."));
    }

    #[test]
    fn test_modify_without_number() {
        let accounts = stock_accounts();
        let req = request(
            "modify_number_field",
            resolved(&[("item_name", json!("Widget")), ("field_name", json!("Stock"))]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(
            resp.speech(),
            Some("You need to specify the number for the Stock of Widget to change to, increase by or decrease by.")
        );
    }

    #[test]
    fn test_modify_unknown_item_writes_nothing() {
        let accounts = stock_accounts();
        let req = request(
            "modify_number_field",
            resolved(&[
                ("item_name", json!("Sprocket")),
                ("field_name", json!("Stock")),
                ("field_value_increment", json!(1)),
            ]),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Cannot find a row with name \"Sprocket\" in the spreadsheet."));
        assert!(accounts.store.lock().unwrap().writes.is_empty());
    }

    // ── remove_record ───────────────────────────────────────────────

    #[test]
    fn test_remove_record_then_rows_shift() {
        let accounts = stock_accounts();
        let resp = handle(&request("remove_record", resolved(&[("item_name", json!("widget"))])), &accounts);
        assert_eq!(resp.speech(), Some("widget has been removed."));

        {
            let store = accounts.store.lock().unwrap();
            let SpreadsheetRequest::DeleteDimension(d) = &store.structural[0].requests[0];
            assert_eq!((d.range.sheet_id, d.range.start_index, d.range.end_index), (42, 1, 2));
        }

        let req = request(
            "read_field",
            resolved(&[("item_name", json!("Gadget")), ("field_name", json!("Stock"))]),
        );
        assert_eq!(handle(&req, &accounts).speech(), Some("The Stock of Gadget is 4."));
    }

    // ── link_account / verify_code ──────────────────────────────────

    #[test]
    fn test_link_account_needs_web_link() {
        let accounts = stock_accounts();
        let mut req = request("link_account", json!({}));
        req.device.capabilities = vec!["SPEECH".into()];

        let resp = handle(&req, &accounts);
        assert_eq!(resp.next_scene(), Some(SCENE_END_CONVERSATION));
    }

    #[test]
    fn test_link_account_card() {
        let accounts = stock_accounts();
        let resp = handle(&request("link_account", json!({})), &accounts);
        let prompt = resp.prompt.unwrap();
        match prompt.content {
            Some(Content::Card(card)) => {
                assert_eq!(card.button.name, "Link Account");
                assert_eq!(card.button.open.url, "https://accounts.example/auth?client_id=cid");
            }
            other => panic!("expected card, got {:?}", other),
        }
    }

    #[test]
    fn test_verify_code_success_stores_token() {
        let accounts = stock_accounts();
        let mut req = request("verify_code", json!({}));
        req.user.params.remove("access_token");
        req.scene.slots.insert("verification_code".into(), json!({ "value": "good" }));

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Account linking successful."));
        assert_eq!(resp.next_scene(), Some("Work"));
        let stored = GoogleToken::from_param(resp.user.params["access_token"].as_str().unwrap()).unwrap();
        assert_eq!(stored.access_token, "linked");
    }

    #[test]
    fn test_verify_code_failure() {
        let accounts = stock_accounts();
        let mut req = request("verify_code", json!({}));
        req.scene.slots.insert("verification_code".into(), json!({ "value": "bad" }));

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Authentication failed: invalid_grant"));
        assert_eq!(resp.next_scene(), Some(SCENE_END_CONVERSATION));
    }

    #[test]
    fn test_verify_code_is_exchanged_verbatim() {
        let accounts = stock_accounts();
        let mut req = request("verify_code", json!({}));
        req.user.params.remove("access_token");
        req.scene.slots.insert("verification_code".into(), json!({ "value": " good " }));

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Authentication failed: invalid_grant"));
        assert!(!resp.user.params.contains_key("access_token"));
    }

    // ── link / unlink / open / list / validate ──────────────────────

    #[test]
    fn test_link_sheet() {
        let accounts = stock_accounts();
        let mut req = request("link_sheet", json!({}));
        req.scene.slots.insert("sheet_name".into(), json!({ "value": "Shed" }));
        req.scene.slots.insert(
            "sheet_url".into(),
            json!({ "value": "https://docs.google.com/spreadsheets/d/newId/edit#gid=42" }),
        );

        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Spreadsheet Shed has been linked."));
        assert_eq!(resp.next_scene(), Some("Work"));
        assert_eq!(resp.session.params["sheet_name"], "Shed");
        assert_eq!(
            resp.user.params["sheets_mapping"]["Shed"],
            json!({ "spreadsheet_id": "newId", "sheet_id": 42, "sheet_title": "Stock" })
        );
        let names: Vec<_> = resp.session.type_overrides[0].synonym.entries.iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, vec!["Pantry", "Garage", "Shed"]);
    }

    #[test]
    fn test_link_sheet_bad_url_and_unknown_tab() {
        let accounts = stock_accounts();
        let mut req = request("link_sheet", json!({}));
        req.scene.slots.insert("sheet_name".into(), json!({ "value": "Shed" }));
        req.scene.slots.insert("sheet_url".into(), json!({ "value": "https://example.com" }));
        assert_eq!(
            handle(&req, &accounts).speech(),
            Some("That doesn't look like a Google Sheets link.")
        );

        req.scene.slots.insert(
            "sheet_url".into(),
            json!({ "value": "https://docs.google.com/spreadsheets/d/newId/edit#gid=9" }),
        );
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("I couldn't find that tab in the spreadsheet."));
        assert!(resp.user.params["sheets_mapping"].get("Shed").is_none());
    }

    #[test]
    fn test_unlink_open_sheet() {
        let accounts = stock_accounts();
        let resp = handle(&request("unlink_sheet", json!({})), &accounts);
        assert_eq!(resp.speech(), Some("Spreadsheet Pantry has been unlinked."));
        assert!(resp.session.params["sheet_name"].is_null());
        assert!(resp.user.params["sheets_mapping"].get("Pantry").is_none());
        assert!(resp.user.params["sheets_mapping"].get("Garage").is_some());
    }

    #[test]
    fn test_unlink_errors() {
        let accounts = stock_accounts();
        let resp = handle(&request("unlink_sheet", resolved(&[("sheet_name", json!("Attic"))])), &accounts);
        assert_eq!(resp.speech(), Some("Spreadsheet Attic does not exist."));

        let mut req = request("unlink_sheet", json!({}));
        req.session.params.remove("sheet_name");
        assert_eq!(
            handle(&req, &accounts).speech(),
            Some("You need to specify a spreadsheet to unlink.")
        );
    }

    #[test]
    fn test_open_sheet() {
        let accounts = stock_accounts();
        let resp = handle(&request("open_sheet", resolved(&[("sheet_name", json!("Garage"))])), &accounts);
        assert_eq!(resp.speech(), Some("You are now working on Garage."));
        assert_eq!(resp.session.params["sheet_name"], "Garage");

        let resp = handle(&request("open_sheet", resolved(&[("sheet_name", json!("Attic"))])), &accounts);
        assert_eq!(resp.speech(), Some("Spreadsheet Attic does not exist."));
        assert_eq!(resp.session.params["sheet_name"], "Pantry");
    }

    #[test]
    fn test_list_sheets() {
        let accounts = stock_accounts();
        let resp = handle(&request("list_sheets", json!({})), &accounts);
        let prompt = resp.prompt.unwrap();
        assert_eq!(prompt.first_simple.speech, "You have the following spreadsheets: Pantry, Garage");
        assert_eq!(prompt.first_simple.text.as_deref(), Some("You have the following spreadsheets:"));
        assert_eq!(
            prompt.content,
            Some(Content::List(List {
                items: vec![ListItem { key: "Pantry".into() }, ListItem { key: "Garage".into() }]
            }))
        );

        let mut req = request("list_sheets", json!({}));
        req.user.params.insert("sheets_mapping".into(), json!({}));
        assert_eq!(handle(&req, &accounts).speech(), Some("There are no linked spreadsheets."));
    }

    #[test]
    fn test_validate_sheet_name() {
        let accounts = stock_accounts();
        let mut req = request("validate_sheet_name", json!({}));
        req.scene.slots.insert("sheet_name".into(), json!({ "mode": "REQUIRED", "value": "Garage" }));
        let resp = handle(&req, &accounts);
        assert_eq!(resp.prompt, None);
        assert_eq!(resp.scene.slots.unwrap()["sheet_name"]["value"], "Garage");

        req.scene.slots.insert("sheet_name".into(), json!({ "mode": "REQUIRED", "value": "Attic" }));
        let resp = handle(&req, &accounts);
        assert_eq!(resp.speech(), Some("Spreadsheet Attic does not exist."));
        assert_eq!(resp.scene.slots.unwrap()["sheet_name"]["status"], "INVALID");
    }
}
