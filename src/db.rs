use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            department TEXT NOT NULL,
            enrollment_year INTEGER NOT NULL,
            section TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_department ON students(department)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            year INTEGER NOT NULL,
            weekly_contact_hours INTEGER NOT NULL,
            instructor_id TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_department_year ON courses(department, year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_events(
            student_id TEXT NOT NULL,
            course_code TEXT NOT NULL,
            date TEXT NOT NULL,
            hour INTEGER NOT NULL,
            status TEXT NOT NULL,
            recorded_by TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            academic_year INTEGER NOT NULL,
            PRIMARY KEY(student_id, course_code, date, hour),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_code) REFERENCES courses(code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_events_course ON attendance_events(course_code)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_events_student_date ON attendance_events(student_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leave_requests(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            from_date TEXT NOT NULL,
            to_date TEXT NOT NULL,
            reason TEXT NOT NULL,
            course_code TEXT,
            faculty_approval TEXT NOT NULL DEFAULT 'pending',
            hod_approval TEXT NOT NULL DEFAULT 'pending',
            faculty_decided_by TEXT,
            hod_decided_by TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_requests_student ON leave_requests(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_requests_stages ON leave_requests(faculty_approval, hod_approval)",
        [],
    )?;

    // Single-row settings; defaults are seeded once and updated in place.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS engine_settings(
            id INTEGER PRIMARY KEY CHECK (id = 1),
            risk_threshold INTEGER NOT NULL,
            max_leave_days INTEGER NOT NULL,
            non_instructional_weekday INTEGER NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO engine_settings(id, risk_threshold, max_leave_days, non_instructional_weekday)
         VALUES(1, 75, 7, 0)",
        [],
    )?;

    Ok(())
}
