//! Two-stage leave approval: faculty first, then the department head. Pure
//! transition checks and materialization planning live here; the facade owns
//! the store round-trips and the atomic writes.

use crate::domain::{
    Approval, AttendanceEvent, AttendanceStatus, Course, EngineConfig, LeaveRequest, Student,
};
use crate::error::EngineError;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::HashSet;

/// A resolved stage decision, ready to persist.
#[derive(Debug, Clone)]
pub struct Decision {
    pub approved: bool,
    pub actor_id: String,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn approval(&self) -> Approval {
        if self.approved {
            Approval::Approved
        } else {
            Approval::Denied
        }
    }
}

/// The faculty stage is legal only while it is still pending.
pub fn ensure_faculty_pending(request: &LeaveRequest) -> Result<(), EngineError> {
    if request.faculty_approval == Approval::Pending {
        Ok(())
    } else {
        Err(EngineError::illegal(format!(
            "faculty stage already {} for request {}",
            request.faculty_approval.as_str(),
            request.id
        )))
    }
}

/// The HOD stage is legal only after faculty approval, while it is pending.
/// A faculty denial never reaches this stage.
pub fn ensure_hod_ready(request: &LeaveRequest) -> Result<(), EngineError> {
    match request.faculty_approval {
        Approval::Approved => {}
        Approval::Pending => {
            return Err(EngineError::illegal(format!(
                "faculty stage still pending for request {}",
                request.id
            )))
        }
        Approval::Denied => {
            return Err(EngineError::illegal(format!(
                "request {} was denied at the faculty stage",
                request.id
            )))
        }
    }
    if request.hod_approval == Approval::Pending {
        Ok(())
    } else {
        Err(EngineError::illegal(format!(
            "hod stage already {} for request {}",
            request.hod_approval.as_str(),
            request.id
        )))
    }
}

/// Calendar days covered by the leave, skipping the configured
/// non-instructional weekday. Saturday stays instructional unless configured
/// otherwise.
pub fn instructional_days(
    from: NaiveDate,
    to: NaiveDate,
    config: &EngineConfig,
) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = from;
    while day <= to {
        if !config.is_non_instructional(day) {
            days.push(day);
        }
        day += Duration::days(1);
    }
    days
}

/// Set-reconciliation materialization: compute every event the approved leave
/// should produce, drop the ones the store already records as leave, and hand
/// back only the delta. Existing non-leave marks in range stay in the plan so
/// the upsert rewrites them to leave; re-running the plan yields nothing new.
pub fn plan_leave_events(
    request: &LeaveRequest,
    student: &Student,
    courses_in_scope: &[Course],
    existing_in_range: &[AttendanceEvent],
    approver_id: &str,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<AttendanceEvent> {
    let already_leave: HashSet<(String, NaiveDate, u32)> = existing_in_range
        .iter()
        .filter(|e| e.status == AttendanceStatus::Leave)
        .map(|e| (e.course_code.clone(), e.date, e.hour))
        .collect();

    let mut plan = Vec::new();
    for day in instructional_days(request.from_date, request.to_date, config) {
        for course in courses_in_scope {
            for hour in 1..=course.weekly_contact_hours {
                if already_leave.contains(&(course.code.clone(), day, hour)) {
                    continue;
                }
                plan.push(AttendanceEvent {
                    student_id: student.id.clone(),
                    course_code: course.code.clone(),
                    date: day,
                    hour,
                    status: AttendanceStatus::Leave,
                    recorded_by: approver_id.to_string(),
                    recorded_at: now,
                    academic_year: day.year(),
                });
            }
        }
    }
    plan
}
