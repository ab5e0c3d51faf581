use super::{parse_params, request_json, with_portal};
use crate::domain::Actor;
use crate::ipc::types::{AppState, Request};
use crate::validation::LeaveDraft;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct SubmitParams {
    actor: Actor,
    #[serde(flatten)]
    draft: LeaveDraft,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideParams {
    actor: Actor,
    request_id: String,
    approve: bool,
}

#[derive(Deserialize)]
struct ActorParams {
    actor: Actor,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    actor: Actor,
    student_id: String,
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: SubmitParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let request = portal.submit_leave(&params.actor, &params.draft)?;
        Ok(request_json(&request))
    })
}

fn handle_faculty_decide(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: DecideParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let request = portal.faculty_decide(&params.actor, &params.request_id, params.approve)?;
        Ok(request_json(&request))
    })
}

fn handle_hod_decide(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: DecideParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let request = portal.hod_decide(&params.actor, &params.request_id, params.approve)?;
        Ok(request_json(&request))
    })
}

fn handle_faculty_queue(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: ActorParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let requests = portal.faculty_queue(&params.actor)?;
        Ok(json!({ "requests": requests.iter().map(request_json).collect::<Vec<_>>() }))
    })
}

fn handle_hod_queue(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: ActorParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let requests = portal.hod_queue(&params.actor)?;
        Ok(json!({ "requests": requests.iter().map(request_json).collect::<Vec<_>>() }))
    })
}

fn handle_list_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: StudentParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let requests = portal.leave_requests_for_student(&params.actor, &params.student_id)?;
        Ok(json!({ "requests": requests.iter().map(request_json).collect::<Vec<_>>() }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leave.submit" => Some(handle_submit(state, req)),
        "leave.facultyDecide" => Some(handle_faculty_decide(state, req)),
        "leave.hodDecide" => Some(handle_hod_decide(state, req)),
        "leave.facultyQueue" => Some(handle_faculty_queue(state, req)),
        "leave.hodQueue" => Some(handle_hod_queue(state, req)),
        "leave.listForStudent" => Some(handle_list_for_student(state, req)),
        _ => None,
    }
}
