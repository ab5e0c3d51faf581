//! Attendance statistics. Pure aggregation over explicit inputs: the facade
//! hands in snapshots, nothing here touches the store or the clock.
//!
//! Policy, deliberate: approved leave counts as attended, so leave never
//! penalizes a student's percentage.

use crate::domain::{AttendanceEvent, AttendanceStatus, Course, Student};
use serde::Serialize;

/// Half-up integer rounding of `100 * attended / total`; 0 when `total` is 0.
/// Never NaN, never an error, always in [0, 100].
pub fn percent(attended: usize, total: usize) -> u32 {
    (percent_exact(attended, total) + 0.5).floor() as u32
}

/// Same ratio without the rounding, for aggregates that must round once at
/// the end instead of averaging already-rounded values.
pub fn percent_exact(attended: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * attended as f64 / total as f64
    }
}

#[derive(Debug, Clone, Default)]
struct Tally {
    present: usize,
    absent: usize,
    leave: usize,
}

impl Tally {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Leave => self.leave += 1,
        }
    }

    fn total(&self) -> usize {
        self.present + self.absent + self.leave
    }

    fn attended(&self) -> usize {
        self.present + self.leave
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAttendance {
    pub course_code: String,
    pub course_name: String,
    pub total_classes: usize,
    pub present_classes: usize,
    pub absent_classes: usize,
    pub leave_classes: usize,
    pub attendance_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStatistics {
    pub student_id: String,
    pub department: String,
    pub total_classes: usize,
    pub present_classes: usize,
    pub absent_classes: usize,
    pub leave_classes: usize,
    pub attendance_percentage: u32,
    pub per_course: Vec<CourseAttendance>,
    pub at_risk: bool,
}

/// Per-student statistics over that student's full event history. The
/// per-course breakdown covers every course offered for the student's
/// department and enrollment year, including courses with no events yet.
pub fn student_statistics(
    student: &Student,
    events: &[AttendanceEvent],
    offered_courses: &[Course],
    risk_threshold: u32,
) -> StudentStatistics {
    let mut overall = Tally::default();
    for e in events {
        overall.add(e.status);
    }

    let per_course = offered_courses
        .iter()
        .map(|course| {
            let mut tally = Tally::default();
            for e in events.iter().filter(|e| e.course_code == course.code) {
                tally.add(e.status);
            }
            CourseAttendance {
                course_code: course.code.clone(),
                course_name: course.name.clone(),
                total_classes: tally.total(),
                present_classes: tally.present,
                absent_classes: tally.absent,
                leave_classes: tally.leave,
                attendance_percentage: percent(tally.attended(), tally.total()),
            }
        })
        .collect();

    let attendance_percentage = percent(overall.attended(), overall.total());
    StudentStatistics {
        student_id: student.id.clone(),
        department: student.department.clone(),
        total_classes: overall.total(),
        present_classes: overall.present,
        absent_classes: overall.absent,
        leave_classes: overall.leave,
        attendance_percentage,
        per_course,
        at_risk: attendance_percentage < risk_threshold,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAverage {
    pub course_code: String,
    pub student_count: usize,
    pub average_percentage: u32,
}

/// Mean of each enrolled student's course ratio. Each ratio stays unrounded;
/// the mean is rounded once at the end. Enrollment is department + year
/// membership, so students with no events yet drag the average down as 0.
pub fn course_average(
    course: &Course,
    enrolled: &[Student],
    course_events: &[AttendanceEvent],
) -> CourseAverage {
    let mut sum = 0.0;
    for student in enrolled {
        let mut tally = Tally::default();
        for e in course_events.iter().filter(|e| e.student_id == student.id) {
            tally.add(e.status);
        }
        sum += percent_exact(tally.attended(), tally.total());
    }
    let average = if enrolled.is_empty() {
        0
    } else {
        (sum / enrolled.len() as f64 + 0.5).floor() as u32
    };
    CourseAverage {
        course_code: course.code.clone(),
        student_count: enrolled.len(),
        average_percentage: average,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub department: String,
    pub student_count: usize,
    pub average_percentage: u32,
    pub at_risk_count: usize,
}

/// One student's contribution to a department rollup.
#[derive(Debug, Clone, Copy)]
pub struct StudentRatio {
    pub exact: f64,
    pub rounded: u32,
}

pub fn student_ratio(events: &[AttendanceEvent]) -> StudentRatio {
    let mut tally = Tally::default();
    for e in events {
        tally.add(e.status);
    }
    StudentRatio {
        exact: percent_exact(tally.attended(), tally.total()),
        rounded: percent(tally.attended(), tally.total()),
    }
}

/// Department-wide average and at-risk count. The average is the mean of the
/// unrounded per-student percentages, rounded once; at-risk is judged on each
/// student's rounded percentage, consistent with `student_statistics`.
pub fn department_summary(
    department: &str,
    ratios: &[StudentRatio],
    risk_threshold: u32,
) -> DepartmentSummary {
    let average = if ratios.is_empty() {
        0
    } else {
        let sum: f64 = ratios.iter().map(|r| r.exact).sum();
        (sum / ratios.len() as f64 + 0.5).floor() as u32
    };
    DepartmentSummary {
        department: department.to_string(),
        student_count: ratios.len(),
        average_percentage: average,
        at_risk_count: ratios.iter().filter(|r| r.rounded < risk_threshold).count(),
    }
}
