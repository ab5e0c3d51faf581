use super::{parse_params, with_portal};
use crate::domain::{Actor, EngineConfig};
use crate::ipc::respond::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match SqliteStore::open(&path) {
        Ok(store) => {
            info!(workspace = %path.display(), "workspace opened");
            state.workspace = Some(path.clone());
            state.store = Some(store);
            ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsUpdateParams {
    actor: Actor,
    risk_threshold: Option<u32>,
    max_leave_days: Option<u32>,
    non_instructional_weekday: Option<u32>,
}

fn handle_settings_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    with_portal(state, req, |portal| {
        Ok(serde_json::to_value(portal.config()).unwrap_or_else(|_| json!({})))
    })
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: SettingsUpdateParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let current = *portal.config();
        let next = EngineConfig {
            risk_threshold: params.risk_threshold.unwrap_or(current.risk_threshold),
            max_leave_days: params.max_leave_days.unwrap_or(current.max_leave_days),
            non_instructional_weekday: params
                .non_instructional_weekday
                .unwrap_or(current.non_instructional_weekday),
        };
        portal.update_settings(&params.actor, &next)?;
        info!(?next, "engine settings updated");
        Ok(serde_json::to_value(&next).unwrap_or_else(|_| json!({})))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "settings.get" => Some(handle_settings_get(state, req)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
