pub mod attendance;
pub mod core;
pub mod leave;
pub mod roster;

use super::respond;
use super::types::{AppState, Request};
use crate::domain::LeaveRequest;
use crate::error::EngineError;
use crate::facade::Portal;
use crate::store::SqliteStore;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Typed parameter extraction; shape problems are `bad_params`.
fn parse_params<T: DeserializeOwned>(req: &Request) -> Result<T, serde_json::Value> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| respond::err(&req.id, "bad_params", e.to_string(), None))
}

/// Run an operation against a freshly opened portal, mapping the outcome to
/// the wire envelope. Settings are re-read per request.
fn with_portal<F>(state: &AppState, req: &Request, op: F) -> serde_json::Value
where
    F: FnOnce(&Portal<SqliteStore>) -> Result<serde_json::Value, EngineError>,
{
    let Some(store) = state.store.as_ref() else {
        return respond::err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match Portal::open(store).and_then(|portal| op(&portal)) {
        Ok(result) => respond::ok(&req.id, result),
        Err(error) => respond::engine_err(&req.id, &error),
    }
}

/// A leave request on the wire, with the derived final status attached.
fn request_json(request: &LeaveRequest) -> serde_json::Value {
    let mut value = serde_json::to_value(request).unwrap_or_else(|_| json!({}));
    value["finalStatus"] = json!(request.final_status());
    value
}
