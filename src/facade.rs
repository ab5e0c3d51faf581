//! Role-filtered operations over the store. Every read resolves the caller's
//! scope before data leaves the store; every write re-checks capability and
//! state. The portal itself is stateless: it is rebuilt per request from the
//! store plus the current settings snapshot.

use crate::approval::{self, Decision};
use crate::domain::{
    Actor, AttendanceEvent, AttendanceStatus, Course, EngineConfig, LeaveRequest, Role, Student,
};
use crate::error::EngineError;
use crate::permissions::{capabilities, read_scope};
use crate::stats::{self, CourseAverage, DepartmentSummary, StudentStatistics};
use crate::store::Store;
use crate::validation::{self, LeaveDraft, Violation};
use chrono::{Datelike, Local, NaiveDate, Utc};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    pub student_id: String,
    pub course_code: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub status: AttendanceStatus,
}

pub struct Portal<'a, S: Store> {
    store: &'a S,
    config: EngineConfig,
}

impl<'a, S: Store> Portal<'a, S> {
    /// Settings are re-read on every open so configuration changes apply to
    /// the next operation without any cache to invalidate.
    pub fn open(store: &'a S) -> EngineResult<Self> {
        let config = store.settings().map_err(EngineError::dependency)?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn load_student(&self, student_id: &str) -> EngineResult<Student> {
        self.store
            .student(student_id)
            .map_err(EngineError::dependency)?
            .ok_or_else(|| EngineError::not_found(format!("student {student_id}")))
    }

    fn load_course(&self, course_code: &str) -> EngineResult<Course> {
        self.store
            .course(course_code)
            .map_err(EngineError::dependency)?
            .ok_or_else(|| EngineError::not_found(format!("course {course_code}")))
    }

    fn scoped_student(&self, actor: &Actor, student_id: &str) -> EngineResult<Student> {
        let student = self.load_student(student_id)?;
        let scope = read_scope(actor)?;
        if !scope.permits(&student) {
            return Err(EngineError::forbidden(format!(
                "actor {} may not access student {}",
                actor.id, student.id
            )));
        }
        Ok(student)
    }

    // ---- statistics ----

    pub fn student_statistics(
        &self,
        actor: &Actor,
        student_id: &str,
    ) -> EngineResult<StudentStatistics> {
        let student = self.scoped_student(actor, student_id)?;
        let events = self
            .store
            .events_for_student(&student.id)
            .map_err(EngineError::dependency)?;
        let offered = self
            .store
            .courses_for(&student.department, student.enrollment_year)
            .map_err(EngineError::dependency)?;
        debug!(student = %student.id, events = events.len(), "computing student statistics");
        Ok(stats::student_statistics(
            &student,
            &events,
            &offered,
            self.config.risk_threshold,
        ))
    }

    pub fn course_average(&self, actor: &Actor, course_code: &str) -> EngineResult<CourseAverage> {
        let course = self.load_course(course_code)?;
        let scope = read_scope(actor)?;
        if !scope.permits_department(&course.department) {
            return Err(EngineError::forbidden(format!(
                "actor {} may not read courses of department {}",
                actor.id, course.department
            )));
        }
        let enrolled: Vec<Student> = self
            .store
            .students_in_department(&course.department)
            .map_err(EngineError::dependency)?
            .into_iter()
            .filter(|s| s.enrollment_year == course.year)
            .collect();
        let events = self
            .store
            .events_for_course(&course.code)
            .map_err(EngineError::dependency)?;
        Ok(stats::course_average(&course, &enrolled, &events))
    }

    pub fn department_summary(
        &self,
        actor: &Actor,
        department: &str,
    ) -> EngineResult<DepartmentSummary> {
        if !capabilities(actor.role).can_generate_reports {
            return Err(EngineError::forbidden(format!(
                "role {:?} may not generate department reports",
                actor.role
            )));
        }
        let scope = read_scope(actor)?;
        if !scope.permits_department(department) {
            return Err(EngineError::forbidden(format!(
                "actor {} is not scoped to department {}",
                actor.id, department
            )));
        }
        self.summarize_department(department)
    }

    /// Department-level rollup for every department, for all-students views.
    pub fn all_department_summaries(&self, actor: &Actor) -> EngineResult<Vec<DepartmentSummary>> {
        let caps = capabilities(actor.role);
        if !caps.can_view_all_students || !caps.can_generate_reports {
            return Err(EngineError::forbidden(format!(
                "role {:?} may not view all-student statistics",
                actor.role
            )));
        }
        self.store
            .departments()
            .map_err(EngineError::dependency)?
            .iter()
            .map(|d| self.summarize_department(d))
            .collect()
    }

    fn summarize_department(&self, department: &str) -> EngineResult<DepartmentSummary> {
        let students = self
            .store
            .students_in_department(department)
            .map_err(EngineError::dependency)?;
        let mut ratios = Vec::with_capacity(students.len());
        for student in &students {
            let events = self
                .store
                .events_for_student(&student.id)
                .map_err(EngineError::dependency)?;
            ratios.push(stats::student_ratio(&events));
        }
        Ok(stats::department_summary(
            department,
            &ratios,
            self.config.risk_threshold,
        ))
    }

    // ---- direct marking ----

    /// Faculty marking and administrative correction: the only attendance
    /// origin besides leave materialization. Upserts on the event key.
    pub fn mark_attendance(&self, actor: &Actor, mark: &MarkAttendance) -> EngineResult<AttendanceEvent> {
        if !capabilities(actor.role).can_mutate_records {
            return Err(EngineError::forbidden(format!(
                "role {:?} may not mutate attendance records",
                actor.role
            )));
        }
        let student = self.scoped_student(actor, &mark.student_id)?;
        let course = self.load_course(&mark.course_code)?;

        let mut violations = Vec::new();
        if mark.hour < 1 || mark.hour > course.weekly_contact_hours {
            violations.push(Violation::HourOutOfRange {
                max_hour: course.weekly_contact_hours,
            });
        }
        if !violations.is_empty() {
            return Err(EngineError::Validation(violations));
        }

        let event = AttendanceEvent {
            student_id: student.id,
            course_code: course.code,
            date: mark.date,
            hour: mark.hour,
            status: mark.status,
            recorded_by: actor.id.clone(),
            recorded_at: Utc::now(),
            academic_year: mark.date.year(),
        };
        self.store
            .upsert_event(&event)
            .map_err(EngineError::dependency)?;
        Ok(event)
    }

    // ---- leave workflow ----

    pub fn submit_leave(&self, actor: &Actor, draft: &LeaveDraft) -> EngineResult<LeaveRequest> {
        if actor.role != Role::Student || actor.id != draft.student_id {
            return Err(EngineError::forbidden(
                "a leave request is filed by its owning student".to_string(),
            ));
        }
        let student = self.load_student(&draft.student_id)?;

        let today = Local::now().date_naive();
        let violations = validation::validate(draft, today, self.config.max_leave_days);
        if !violations.is_empty() {
            return Err(EngineError::Validation(violations));
        }
        if let Some(code) = draft.course_code.as_deref() {
            // The pattern passed; the course must also exist for this student.
            let course = self.load_course(code)?;
            if course.department != student.department || course.year != student.enrollment_year {
                return Err(EngineError::not_found(format!(
                    "course {code} is not offered for student {}",
                    student.id
                )));
            }
        }

        // Validation guarantees both dates are present.
        let from_date = draft
            .from_date
            .ok_or_else(|| EngineError::Validation(vec![Violation::MissingFromDate]))?;
        let to_date = draft
            .to_date
            .ok_or_else(|| EngineError::Validation(vec![Violation::MissingToDate]))?;

        let request = LeaveRequest {
            id: Uuid::new_v4().to_string(),
            student_id: student.id,
            from_date,
            to_date,
            reason: draft.reason.trim().to_string(),
            course_code: draft.course_code.clone(),
            faculty_approval: crate::domain::Approval::Pending,
            hod_approval: crate::domain::Approval::Pending,
            faculty_decided_by: None,
            hod_decided_by: None,
            created_at: Utc::now(),
        };
        self.store
            .insert_leave_request(&request)
            .map_err(EngineError::dependency)?;
        debug!(request = %request.id, student = %request.student_id, "leave request submitted");
        Ok(request)
    }

    fn load_request(&self, request_id: &str) -> EngineResult<(LeaveRequest, Student)> {
        let request = self
            .store
            .leave_request(request_id)
            .map_err(EngineError::dependency)?
            .ok_or_else(|| EngineError::not_found(format!("leave request {request_id}")))?;
        let student = self.load_student(&request.student_id)?;
        Ok((request, student))
    }

    fn ensure_stage_capability(
        &self,
        actor: &Actor,
        student: &Student,
        hod_stage: bool,
    ) -> EngineResult<()> {
        let caps = capabilities(actor.role);
        let capable = if hod_stage {
            caps.can_approve_hod_stage
        } else {
            caps.can_approve_faculty_stage
        };
        if !capable {
            return Err(EngineError::forbidden(format!(
                "role {:?} may not approve at the {} stage",
                actor.role,
                if hod_stage { "hod" } else { "faculty" }
            )));
        }
        let in_scope = caps.can_view_all_students
            || actor.departments.iter().any(|d| d == &student.department);
        if !in_scope {
            return Err(EngineError::forbidden(format!(
                "actor {} is not scoped to department {}",
                actor.id, student.department
            )));
        }
        Ok(())
    }

    pub fn faculty_decide(
        &self,
        actor: &Actor,
        request_id: &str,
        approve: bool,
    ) -> EngineResult<LeaveRequest> {
        let (request, student) = self.load_request(request_id)?;
        self.ensure_stage_capability(actor, &student, false)?;
        approval::ensure_faculty_pending(&request)?;

        let decision = Decision {
            approved: approve,
            actor_id: actor.id.clone(),
            decided_at: Utc::now(),
        };
        let applied = self
            .store
            .apply_faculty_decision(&request.id, &decision)
            .map_err(EngineError::dependency)?;
        if !applied {
            // Lost the race: someone decided between our read and the write.
            return Err(EngineError::illegal(format!(
                "faculty stage already decided for request {}",
                request.id
            )));
        }
        debug!(request = %request.id, approve, "faculty decision applied");
        self.load_request(request_id).map(|(r, _)| r)
    }

    pub fn hod_decide(
        &self,
        actor: &Actor,
        request_id: &str,
        approve: bool,
    ) -> EngineResult<LeaveRequest> {
        let (request, student) = self.load_request(request_id)?;
        self.ensure_stage_capability(actor, &student, true)?;
        approval::ensure_hod_ready(&request)?;

        let decision = Decision {
            approved: approve,
            actor_id: actor.id.clone(),
            decided_at: Utc::now(),
        };
        let materialized = if approve {
            let courses = self.leave_scope_courses(&request, &student)?;
            let existing = self
                .store
                .events_for_student_in_range(&student.id, request.from_date, request.to_date)
                .map_err(EngineError::dependency)?;
            approval::plan_leave_events(
                &request,
                &student,
                &courses,
                &existing,
                &actor.id,
                decision.decided_at,
                &self.config,
            )
        } else {
            Vec::new()
        };

        let applied = self
            .store
            .finalize_hod_decision(&request.id, &decision, &materialized)
            .map_err(EngineError::dependency)?;
        if !applied {
            return Err(EngineError::illegal(format!(
                "hod stage already decided for request {}",
                request.id
            )));
        }
        debug!(
            request = %request.id,
            approve,
            materialized = materialized.len(),
            "hod decision applied"
        );
        self.load_request(request_id).map(|(r, _)| r)
    }

    fn leave_scope_courses(
        &self,
        request: &LeaveRequest,
        student: &Student,
    ) -> EngineResult<Vec<Course>> {
        match request.course_code.as_deref() {
            Some(code) => Ok(vec![self.load_course(code)?]),
            None => self
                .store
                .courses_for(&student.department, student.enrollment_year)
                .map_err(EngineError::dependency),
        }
    }

    // ---- queues and listings ----

    /// Requests awaiting a faculty decision, filtered to the actor's scope.
    /// A recomputed view, never a stored queue.
    pub fn faculty_queue(&self, actor: &Actor) -> EngineResult<Vec<LeaveRequest>> {
        if !capabilities(actor.role).can_approve_faculty_stage {
            return Err(EngineError::forbidden(format!(
                "role {:?} has no faculty approval queue",
                actor.role
            )));
        }
        let pending = self
            .store
            .pending_faculty_requests()
            .map_err(EngineError::dependency)?;
        self.filter_by_department(actor, pending)
    }

    /// Faculty-approved requests awaiting the department head.
    pub fn hod_queue(&self, actor: &Actor) -> EngineResult<Vec<LeaveRequest>> {
        if !capabilities(actor.role).can_approve_hod_stage {
            return Err(EngineError::forbidden(format!(
                "role {:?} has no hod approval queue",
                actor.role
            )));
        }
        let pending = self
            .store
            .pending_hod_requests()
            .map_err(EngineError::dependency)?;
        self.filter_by_department(actor, pending)
    }

    fn filter_by_department(
        &self,
        actor: &Actor,
        requests: Vec<LeaveRequest>,
    ) -> EngineResult<Vec<LeaveRequest>> {
        let caps = capabilities(actor.role);
        let mut kept = Vec::new();
        for request in requests {
            let student = self.load_student(&request.student_id)?;
            if caps.can_view_all_students
                || actor.departments.iter().any(|d| d == &student.department)
            {
                kept.push(request);
            }
        }
        Ok(kept)
    }

    pub fn leave_requests_for_student(
        &self,
        actor: &Actor,
        student_id: &str,
    ) -> EngineResult<Vec<LeaveRequest>> {
        let student = self.scoped_student(actor, student_id)?;
        self.store
            .leave_requests_for_student(&student.id)
            .map_err(EngineError::dependency)
    }

    // ---- roster / settings (administrator surface) ----

    fn ensure_administrator(&self, actor: &Actor) -> EngineResult<()> {
        if actor.role != Role::Administrator {
            return Err(EngineError::forbidden(format!(
                "role {:?} may not manage reference data",
                actor.role
            )));
        }
        Ok(())
    }

    pub fn upsert_students(&self, actor: &Actor, students: &[Student]) -> EngineResult<usize> {
        self.ensure_administrator(actor)?;
        for student in students {
            self.store
                .upsert_student(student)
                .map_err(EngineError::dependency)?;
        }
        Ok(students.len())
    }

    pub fn upsert_courses(&self, actor: &Actor, courses: &[Course]) -> EngineResult<usize> {
        self.ensure_administrator(actor)?;
        for course in courses {
            self.store
                .upsert_course(course)
                .map_err(EngineError::dependency)?;
        }
        Ok(courses.len())
    }

    pub fn update_settings(&self, actor: &Actor, config: &EngineConfig) -> EngineResult<()> {
        self.ensure_administrator(actor)?;
        self.store
            .update_settings(config)
            .map_err(EngineError::dependency)
    }
}
