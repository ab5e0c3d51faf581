//! Administrator-gated reference data loading. The engine treats students
//! and courses as read-only; this is the store's write primitive exposed for
//! hosting applications and tests.

use super::{parse_params, with_portal};
use crate::domain::{Actor, Course, Student};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct UpsertStudentsParams {
    actor: Actor,
    students: Vec<Student>,
}

#[derive(Deserialize)]
struct UpsertCoursesParams {
    actor: Actor,
    courses: Vec<Course>,
}

fn handle_upsert_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: UpsertStudentsParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let count = portal.upsert_students(&params.actor, &params.students)?;
        Ok(json!({ "count": count }))
    })
}

fn handle_upsert_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let params: UpsertCoursesParams = match parse_params(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    with_portal(state, req, |portal| {
        let count = portal.upsert_courses(&params.actor, &params.courses)?;
        Ok(json!({ "count": count }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.upsertStudents" => Some(handle_upsert_students(state, req)),
        "roster.upsertCourses" => Some(handle_upsert_courses(state, req)),
        _ => None,
    }
}
