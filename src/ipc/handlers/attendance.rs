use super::{parse_params, with_portal};
use crate::domain::Actor;
use crate::facade::MarkAttendance;
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct MarkParams {
    actor: Actor,
    #[serde(flatten)]
    mark: MarkAttendance,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentParams {
    actor: Actor,
    student_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseParams {
    actor: Actor,
    course_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepartmentParams {
    actor: Actor,
    department: String,
}

#[derive(Deserialize)]
struct ActorParams {
    actor: Actor,
}

fn handle_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: MarkParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let event = portal.mark_attendance(&params.actor, &params.mark)?;
        Ok(serde_json::to_value(&event).unwrap_or_else(|_| json!({})))
    })
}

fn handle_student_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: StudentParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let stats = portal.student_statistics(&params.actor, &params.student_id)?;
        Ok(serde_json::to_value(&stats).unwrap_or_else(|_| json!({})))
    })
}

fn handle_course_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: CourseParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let average = portal.course_average(&params.actor, &params.course_code)?;
        Ok(serde_json::to_value(&average).unwrap_or_else(|_| json!({})))
    })
}

fn handle_department_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: DepartmentParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let summary = portal.department_summary(&params.actor, &params.department)?;
        Ok(serde_json::to_value(&summary).unwrap_or_else(|_| json!({})))
    })
}

fn handle_all_department_summaries(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: ActorParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let summaries = portal.all_department_summaries(&params.actor)?;
        Ok(json!({ "departments": summaries }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_mark(state, req)),
        "attendance.studentStats" => Some(handle_student_stats(state, req)),
        "attendance.courseAverage" => Some(handle_course_average(state, req)),
        "attendance.departmentSummary" => Some(handle_department_summary(state, req)),
        "attendance.allDepartmentSummaries" => Some(handle_all_department_summaries(state, req)),
        _ => None,
    }
}
