//! Structural checks on a leave draft. All rules are independent: every
//! violated rule is reported, nothing short-circuits, and nothing is created
//! unless the list comes back empty.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_REASON_CHARS: usize = 10;

/// What a student submits before any request exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDraft {
    pub student_id: String,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub course_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "rule")]
pub enum Violation {
    MissingFromDate,
    MissingToDate,
    DateRangeInverted,
    FromDateInPast,
    SpanTooLong { max_days: u32 },
    ReasonTooShort { min_chars: usize },
    BadCourseCode,
    HourOutOfRange { max_hour: u32 },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFromDate => write!(f, "fromDate is required"),
            Self::MissingToDate => write!(f, "toDate is required"),
            Self::DateRangeInverted => write!(f, "fromDate must not be after toDate"),
            Self::FromDateInPast => write!(f, "leave cannot start before today"),
            Self::SpanTooLong { max_days } => {
                write!(f, "leave span exceeds the maximum of {} days", max_days)
            }
            Self::ReasonTooShort { min_chars } => {
                write!(f, "reason must be at least {} characters", min_chars)
            }
            Self::BadCourseCode => {
                write!(f, "course code must be 2-4 uppercase letters followed by 3 digits")
            }
            Self::HourOutOfRange { max_hour } => {
                write!(f, "hour must be between 1 and {}", max_hour)
            }
        }
    }
}

/// Check every rule against `draft`. `today` comes from the caller so the
/// engine itself stays clock-free; `max_days` is the configured span limit.
pub fn validate(draft: &LeaveDraft, today: NaiveDate, max_days: u32) -> Vec<Violation> {
    let mut violations = Vec::new();

    if draft.from_date.is_none() {
        violations.push(Violation::MissingFromDate);
    }
    if draft.to_date.is_none() {
        violations.push(Violation::MissingToDate);
    }

    if let Some(from) = draft.from_date {
        if from < today {
            violations.push(Violation::FromDateInPast);
        }
        if let Some(to) = draft.to_date {
            if from > to {
                violations.push(Violation::DateRangeInverted);
            } else {
                let span = (to - from).num_days() + 1;
                if span > i64::from(max_days) {
                    violations.push(Violation::SpanTooLong { max_days });
                }
            }
        }
    }

    if draft.reason.trim().chars().count() < MIN_REASON_CHARS {
        violations.push(Violation::ReasonTooShort {
            min_chars: MIN_REASON_CHARS,
        });
    }

    if let Some(code) = draft.course_code.as_deref() {
        if !is_course_code(code) {
            violations.push(Violation::BadCourseCode);
        }
    }

    violations
}

/// 2-4 uppercase ASCII letters followed by exactly 3 digits, e.g. MATH301.
pub fn is_course_code(s: &str) -> bool {
    let letters: Vec<char> = s.chars().take_while(|c| c.is_ascii_uppercase()).collect();
    if !(2..=4).contains(&letters.len()) {
        return false;
    }
    let rest = &s[letters.len()..];
    rest.len() == 3 && rest.chars().all(|c| c.is_ascii_digit())
}
