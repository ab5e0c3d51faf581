//! The persistence boundary. The engine talks to an injected `Store` with
//! create/update/query-by-filter primitives only; `SqliteStore` is the
//! workspace-backed implementation. Store failures surface to the engine as
//! `Dependency` errors and are never retried here.

use crate::approval::Decision;
use crate::db;
use crate::domain::{
    AttendanceEvent, AttendanceStatus, Course, EngineConfig, LeaveRequest, Student,
};
use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub trait Store {
    fn student(&self, id: &str) -> anyhow::Result<Option<Student>>;
    fn students_in_department(&self, department: &str) -> anyhow::Result<Vec<Student>>;
    fn departments(&self) -> anyhow::Result<Vec<String>>;
    fn upsert_student(&self, student: &Student) -> anyhow::Result<()>;

    fn course(&self, code: &str) -> anyhow::Result<Option<Course>>;
    fn courses_for(&self, department: &str, year: i32) -> anyhow::Result<Vec<Course>>;
    fn upsert_course(&self, course: &Course) -> anyhow::Result<()>;

    fn events_for_student(&self, student_id: &str) -> anyhow::Result<Vec<AttendanceEvent>>;
    fn events_for_course(&self, course_code: &str) -> anyhow::Result<Vec<AttendanceEvent>>;
    fn events_for_student_in_range(
        &self,
        student_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceEvent>>;
    fn upsert_event(&self, event: &AttendanceEvent) -> anyhow::Result<()>;

    fn insert_leave_request(&self, request: &LeaveRequest) -> anyhow::Result<()>;
    fn leave_request(&self, id: &str) -> anyhow::Result<Option<LeaveRequest>>;
    fn leave_requests_for_student(&self, student_id: &str) -> anyhow::Result<Vec<LeaveRequest>>;
    fn pending_faculty_requests(&self) -> anyhow::Result<Vec<LeaveRequest>>;
    fn pending_hod_requests(&self) -> anyhow::Result<Vec<LeaveRequest>>;

    /// Guarded faculty-stage write: succeeds only while the stage is still
    /// pending. Returns false when another decision got there first.
    fn apply_faculty_decision(&self, id: &str, decision: &Decision) -> anyhow::Result<bool>;

    /// Guarded HOD-stage write plus leave materialization, one transaction.
    /// Returns false (and writes nothing) when the stage guard fails.
    fn finalize_hod_decision(
        &self,
        id: &str,
        decision: &Decision,
        materialized: &[AttendanceEvent],
    ) -> anyhow::Result<bool>;

    fn settings(&self) -> anyhow::Result<EngineConfig>;
    fn update_settings(&self, config: &EngineConfig) -> anyhow::Result<()>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    fn query_events(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> anyhow::Result<Vec<AttendanceEvent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, u32>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, String>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, i32>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(
                |(student_id, course_code, date, hour, status, recorded_by, recorded_at, year)| {
                    Ok(AttendanceEvent {
                        student_id,
                        course_code,
                        date: parse_date(&date)?,
                        hour,
                        status: parse_status(&status)?,
                        recorded_by,
                        recorded_at: parse_timestamp(&recorded_at)?,
                        academic_year: year,
                    })
                },
            )
            .collect()
    }

    fn query_requests(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> anyhow::Result<Vec<LeaveRequest>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, Option<String>>(8)?,
                    r.get::<_, Option<String>>(9)?,
                    r.get::<_, String>(10)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(
                |(
                    id,
                    student_id,
                    from_date,
                    to_date,
                    reason,
                    course_code,
                    faculty,
                    hod,
                    faculty_decided_by,
                    hod_decided_by,
                    created_at,
                )| {
                    Ok(LeaveRequest {
                        id,
                        student_id,
                        from_date: parse_date(&from_date)?,
                        to_date: parse_date(&to_date)?,
                        reason,
                        course_code,
                        faculty_approval: parse_approval(&faculty)?,
                        hod_approval: parse_approval(&hod)?,
                        faculty_decided_by,
                        hod_decided_by,
                        created_at: parse_timestamp(&created_at)?,
                    })
                },
            )
            .collect()
    }
}

const EVENT_COLUMNS: &str = "student_id, course_code, date, hour, status, recorded_by, recorded_at, academic_year";
const REQUEST_COLUMNS: &str = "id, student_id, from_date, to_date, reason, course_code, \
     faculty_approval, hod_approval, faculty_decided_by, hod_decided_by, created_at";

impl Store for SqliteStore {
    fn student(&self, id: &str) -> anyhow::Result<Option<Student>> {
        self.conn
            .query_row(
                "SELECT id, department, enrollment_year, section FROM students WHERE id = ?",
                [id],
                |r| {
                    Ok(Student {
                        id: r.get(0)?,
                        department: r.get(1)?,
                        enrollment_year: r.get(2)?,
                        section: r.get(3)?,
                    })
                },
            )
            .optional()
            .context("fetch student")
    }

    fn students_in_department(&self, department: &str) -> anyhow::Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, department, enrollment_year, section
             FROM students WHERE department = ? ORDER BY id",
        )?;
        let students = stmt
            .query_map([department], |r| {
                Ok(Student {
                    id: r.get(0)?,
                    department: r.get(1)?,
                    enrollment_year: r.get(2)?,
                    section: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    fn departments(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT department FROM students ORDER BY department")?;
        let departments = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(departments)
    }

    fn upsert_student(&self, student: &Student) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO students(id, department, enrollment_year, section)
             VALUES(?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               department = excluded.department,
               enrollment_year = excluded.enrollment_year,
               section = excluded.section",
            (
                &student.id,
                &student.department,
                student.enrollment_year,
                &student.section,
            ),
        )?;
        Ok(())
    }

    fn course(&self, code: &str) -> anyhow::Result<Option<Course>> {
        self.conn
            .query_row(
                "SELECT code, name, department, year, weekly_contact_hours, instructor_id
                 FROM courses WHERE code = ?",
                [code],
                |r| {
                    Ok(Course {
                        code: r.get(0)?,
                        name: r.get(1)?,
                        department: r.get(2)?,
                        year: r.get(3)?,
                        weekly_contact_hours: r.get(4)?,
                        instructor_id: r.get(5)?,
                    })
                },
            )
            .optional()
            .context("fetch course")
    }

    fn courses_for(&self, department: &str, year: i32) -> anyhow::Result<Vec<Course>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, name, department, year, weekly_contact_hours, instructor_id
             FROM courses WHERE department = ? AND year = ? ORDER BY code",
        )?;
        let courses = stmt
            .query_map((department, year), |r| {
                Ok(Course {
                    code: r.get(0)?,
                    name: r.get(1)?,
                    department: r.get(2)?,
                    year: r.get(3)?,
                    weekly_contact_hours: r.get(4)?,
                    instructor_id: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(courses)
    }

    fn upsert_course(&self, course: &Course) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO courses(code, name, department, year, weekly_contact_hours, instructor_id)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
               name = excluded.name,
               department = excluded.department,
               year = excluded.year,
               weekly_contact_hours = excluded.weekly_contact_hours,
               instructor_id = excluded.instructor_id",
            (
                &course.code,
                &course.name,
                &course.department,
                course.year,
                course.weekly_contact_hours,
                &course.instructor_id,
            ),
        )?;
        Ok(())
    }

    fn events_for_student(&self, student_id: &str) -> anyhow::Result<Vec<AttendanceEvent>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM attendance_events
                 WHERE student_id = ? ORDER BY date, course_code, hour"
            ),
            &[&student_id],
        )
    }

    fn events_for_course(&self, course_code: &str) -> anyhow::Result<Vec<AttendanceEvent>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM attendance_events
                 WHERE course_code = ? ORDER BY date, student_id, hour"
            ),
            &[&course_code],
        )
    }

    fn events_for_student_in_range(
        &self,
        student_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> anyhow::Result<Vec<AttendanceEvent>> {
        // ISO dates compare correctly as text.
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM attendance_events
                 WHERE student_id = ? AND date >= ? AND date <= ?
                 ORDER BY date, course_code, hour"
            ),
            &[&student_id, &from.to_string(), &to.to_string()],
        )
    }

    fn upsert_event(&self, event: &AttendanceEvent) -> anyhow::Result<()> {
        upsert_event_on(&self.conn, event)
    }

    fn insert_leave_request(&self, request: &LeaveRequest) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO leave_requests(id, student_id, from_date, to_date, reason, course_code,
                                        faculty_approval, hod_approval, faculty_decided_by,
                                        hod_decided_by, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &request.id,
                &request.student_id,
                request.from_date.to_string(),
                request.to_date.to_string(),
                &request.reason,
                &request.course_code,
                request.faculty_approval.as_str(),
                request.hod_approval.as_str(),
                &request.faculty_decided_by,
                &request.hod_decided_by,
                request.created_at.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn leave_request(&self, id: &str) -> anyhow::Result<Option<LeaveRequest>> {
        let mut found = self.query_requests(
            &format!("SELECT {REQUEST_COLUMNS} FROM leave_requests WHERE id = ?"),
            &[&id],
        )?;
        Ok(found.pop())
    }

    fn leave_requests_for_student(&self, student_id: &str) -> anyhow::Result<Vec<LeaveRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM leave_requests
                 WHERE student_id = ? ORDER BY created_at DESC"
            ),
            &[&student_id],
        )
    }

    fn pending_faculty_requests(&self) -> anyhow::Result<Vec<LeaveRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM leave_requests
                 WHERE faculty_approval = 'pending' ORDER BY created_at"
            ),
            &[],
        )
    }

    fn pending_hod_requests(&self) -> anyhow::Result<Vec<LeaveRequest>> {
        self.query_requests(
            &format!(
                "SELECT {REQUEST_COLUMNS} FROM leave_requests
                 WHERE faculty_approval = 'approved' AND hod_approval = 'pending'
                 ORDER BY created_at"
            ),
            &[],
        )
    }

    fn apply_faculty_decision(&self, id: &str, decision: &Decision) -> anyhow::Result<bool> {
        // Single guarded statement; two concurrent decisions cannot both pass
        // the WHERE clause.
        let updated = self.conn.execute(
            "UPDATE leave_requests
             SET faculty_approval = ?, faculty_decided_by = ?
             WHERE id = ? AND faculty_approval = 'pending'",
            (decision.approval().as_str(), &decision.actor_id, id),
        )?;
        Ok(updated > 0)
    }

    fn finalize_hod_decision(
        &self,
        id: &str,
        decision: &Decision,
        materialized: &[AttendanceEvent],
    ) -> anyhow::Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE leave_requests
             SET hod_approval = ?, hod_decided_by = ?
             WHERE id = ? AND faculty_approval = 'approved' AND hod_approval = 'pending'",
            (decision.approval().as_str(), &decision.actor_id, id),
        )?;
        if updated == 0 {
            tx.rollback()?;
            return Ok(false);
        }
        for event in materialized {
            upsert_event_on(&tx, event)?;
        }
        tx.commit()?;
        Ok(true)
    }

    fn settings(&self) -> anyhow::Result<EngineConfig> {
        self.conn
            .query_row(
                "SELECT risk_threshold, max_leave_days, non_instructional_weekday
                 FROM engine_settings WHERE id = 1",
                [],
                |r| {
                    Ok(EngineConfig {
                        risk_threshold: r.get(0)?,
                        max_leave_days: r.get(1)?,
                        non_instructional_weekday: r.get(2)?,
                    })
                },
            )
            .context("fetch settings")
    }

    fn update_settings(&self, config: &EngineConfig) -> anyhow::Result<()> {
        self.conn.execute(
            "UPDATE engine_settings
             SET risk_threshold = ?, max_leave_days = ?, non_instructional_weekday = ?
             WHERE id = 1",
            (
                config.risk_threshold,
                config.max_leave_days,
                config.non_instructional_weekday,
            ),
        )?;
        Ok(())
    }
}

fn upsert_event_on(conn: &Connection, event: &AttendanceEvent) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO attendance_events(student_id, course_code, date, hour, status,
                                       recorded_by, recorded_at, academic_year)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, course_code, date, hour) DO UPDATE SET
           status = excluded.status,
           recorded_by = excluded.recorded_by,
           recorded_at = excluded.recorded_at,
           academic_year = excluded.academic_year",
        (
            &event.student_id,
            &event.course_code,
            event.date.to_string(),
            event.hour,
            event.status.as_str(),
            &event.recorded_by,
            event.recorded_at.to_rfc3339(),
            event.academic_year,
        ),
    )?;
    Ok(())
}

fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    s.parse::<NaiveDate>()
        .with_context(|| format!("bad date in store: {s}"))
}

fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp in store: {s}"))?
        .with_timezone(&Utc))
}

fn parse_status(s: &str) -> anyhow::Result<AttendanceStatus> {
    AttendanceStatus::parse(s).ok_or_else(|| anyhow!("unknown attendance status in store: {s}"))
}

fn parse_approval(s: &str) -> anyhow::Result<crate::domain::Approval> {
    crate::domain::Approval::parse(s).ok_or_else(|| anyhow!("unknown approval state in store: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Approval;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().expect("open store")
    }

    fn seed_student(store: &SqliteStore, id: &str, department: &str) {
        store
            .upsert_student(&Student {
                id: id.into(),
                department: department.into(),
                enrollment_year: 2023,
                section: "A".into(),
            })
            .expect("upsert student");
    }

    fn request(id: &str, student_id: &str) -> LeaveRequest {
        LeaveRequest {
            id: id.into(),
            student_id: student_id.into(),
            from_date: "2025-03-10".parse().unwrap(),
            to_date: "2025-03-12".parse().unwrap(),
            reason: "attending a family wedding".into(),
            course_code: None,
            faculty_approval: Approval::Pending,
            hod_approval: Approval::Pending,
            faculty_decided_by: None,
            hod_decided_by: None,
            created_at: Utc::now(),
        }
    }

    fn decision(approved: bool, actor: &str) -> Decision {
        Decision {
            approved,
            actor_id: actor.into(),
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn leave_request_roundtrip() {
        let s = store();
        seed_student(&s, "s1", "CSE");
        s.insert_leave_request(&request("r1", "s1")).unwrap();
        let loaded = s.leave_request("r1").unwrap().expect("request present");
        assert_eq!(loaded.student_id, "s1");
        assert_eq!(loaded.faculty_approval, Approval::Pending);
        assert_eq!(loaded.from_date.to_string(), "2025-03-10");
    }

    #[test]
    fn faculty_decision_guard_rejects_second_write() {
        let s = store();
        seed_student(&s, "s1", "CSE");
        s.insert_leave_request(&request("r1", "s1")).unwrap();

        assert!(s.apply_faculty_decision("r1", &decision(true, "f1")).unwrap());
        assert!(!s.apply_faculty_decision("r1", &decision(false, "f2")).unwrap());

        let loaded = s.leave_request("r1").unwrap().unwrap();
        assert_eq!(loaded.faculty_approval, Approval::Approved);
        assert_eq!(loaded.faculty_decided_by.as_deref(), Some("f1"));
    }

    #[test]
    fn hod_finalize_requires_faculty_approval() {
        let s = store();
        seed_student(&s, "s1", "CSE");
        s.insert_leave_request(&request("r1", "s1")).unwrap();

        // Faculty stage untouched: the guard must refuse and write no events.
        assert!(!s.finalize_hod_decision("r1", &decision(true, "h1"), &[]).unwrap());

        s.apply_faculty_decision("r1", &decision(true, "f1")).unwrap();
        assert!(s.finalize_hod_decision("r1", &decision(true, "h1"), &[]).unwrap());
        assert!(!s.finalize_hod_decision("r1", &decision(false, "h2"), &[]).unwrap());

        let loaded = s.leave_request("r1").unwrap().unwrap();
        assert_eq!(loaded.hod_approval, Approval::Approved);
        assert_eq!(loaded.hod_decided_by.as_deref(), Some("h1"));
    }

    #[test]
    fn settings_default_and_update() {
        let s = store();
        assert_eq!(s.settings().unwrap(), EngineConfig::default());
        let custom = EngineConfig {
            risk_threshold: 60,
            max_leave_days: 30,
            non_instructional_weekday: 6,
        };
        s.update_settings(&custom).unwrap();
        assert_eq!(s.settings().unwrap(), custom);
    }
}
