use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Leave => "leave",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "absent" => Some(Self::Absent),
            "leave" => Some(Self::Leave),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    Pending,
    Approved,
    Denied,
}

impl Approval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            _ => None,
        }
    }
}

/// Resolved outcome of a leave request, derived from the two stage fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Hod,
    Principal,
    Administrator,
}

/// The already-authenticated caller. Identity resolution happens outside the
/// engine; we only ever authorize a resolved (id, role, departments) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub departments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub department: String,
    pub enrollment_year: i32,
    pub section: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub code: String,
    pub name: String,
    pub department: String,
    pub year: i32,
    pub weekly_contact_hours: u32,
    pub instructor_id: String,
}

/// One recorded status for one student, one course, one hour slot, one date.
/// Unique on (student, course, date, hour); corrections overwrite in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEvent {
    pub student_id: String,
    pub course_code: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub status: AttendanceStatus,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
    pub academic_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub id: String,
    pub student_id: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub reason: String,
    pub course_code: Option<String>,
    pub faculty_approval: Approval,
    pub hod_approval: Approval,
    pub faculty_decided_by: Option<String>,
    pub hod_decided_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LeaveRequest {
    /// Denied short-circuits: a faculty denial is final without HOD action.
    /// Approved requires both stages.
    pub fn final_status(&self) -> FinalStatus {
        if self.faculty_approval == Approval::Denied || self.hod_approval == Approval::Denied {
            FinalStatus::Denied
        } else if self.faculty_approval == Approval::Approved
            && self.hod_approval == Approval::Approved
        {
            FinalStatus::Approved
        } else {
            FinalStatus::Pending
        }
    }
}

/// Externally supplied settings. Nothing here is baked into the engine; the
/// hosting application owns the values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Students whose rounded percentage falls below this are flagged at risk.
    pub risk_threshold: u32,
    /// Maximum inclusive day span of one leave request. The source system
    /// disagreed with itself (7 vs 30); it is a single knob here.
    pub max_leave_days: u32,
    /// Day of week with no instruction, as days from Sunday (0 = Sunday).
    pub non_instructional_weekday: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            risk_threshold: 75,
            max_leave_days: 7,
            non_instructional_weekday: 0,
        }
    }
}

impl EngineConfig {
    pub fn is_non_instructional(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        date.weekday().num_days_from_sunday() == self.non_instructional_weekday
    }
}
