//! The one place role capabilities are defined. Every access check in the
//! engine consults this table; nothing re-derives permissions from the role
//! elsewhere.

use crate::domain::{Actor, Role, Student};
use crate::error::EngineError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCapability {
    pub can_view_all_students: bool,
    pub can_view_department_students: bool,
    pub can_view_own_records_only: bool,
    pub can_mutate_records: bool,
    pub can_approve_faculty_stage: bool,
    pub can_approve_hod_stage: bool,
    pub can_generate_reports: bool,
}

const NONE: RoleCapability = RoleCapability {
    can_view_all_students: false,
    can_view_department_students: false,
    can_view_own_records_only: false,
    can_mutate_records: false,
    can_approve_faculty_stage: false,
    can_approve_hod_stage: false,
    can_generate_reports: false,
};

pub const fn capabilities(role: Role) -> RoleCapability {
    match role {
        Role::Student => RoleCapability {
            can_view_own_records_only: true,
            ..NONE
        },
        Role::Faculty => RoleCapability {
            can_view_department_students: true,
            can_mutate_records: true,
            can_approve_faculty_stage: true,
            ..NONE
        },
        Role::Hod => RoleCapability {
            can_view_department_students: true,
            can_mutate_records: true,
            can_approve_hod_stage: true,
            can_generate_reports: true,
            ..NONE
        },
        Role::Principal => RoleCapability {
            can_view_all_students: true,
            can_generate_reports: true,
            ..NONE
        },
        Role::Administrator => RoleCapability {
            can_view_all_students: true,
            can_mutate_records: true,
            can_generate_reports: true,
            ..NONE
        },
    }
}

/// Which student records a read may touch. A role with no view capability
/// does not get an empty scope; it gets `Forbidden`, so callers can always
/// tell "zero records" apart from "not permitted to ask".
#[derive(Debug, Clone, PartialEq)]
pub enum ReadScope {
    All,
    Departments(Vec<String>),
    OwnRecords(String),
}

pub fn read_scope(actor: &Actor) -> Result<ReadScope, EngineError> {
    let caps = capabilities(actor.role);
    if caps.can_view_all_students {
        Ok(ReadScope::All)
    } else if caps.can_view_department_students {
        Ok(ReadScope::Departments(actor.departments.clone()))
    } else if caps.can_view_own_records_only {
        Ok(ReadScope::OwnRecords(actor.id.clone()))
    } else {
        Err(EngineError::forbidden(format!(
            "role {:?} has no read capability",
            actor.role
        )))
    }
}

impl ReadScope {
    pub fn permits(&self, student: &Student) -> bool {
        match self {
            Self::All => true,
            Self::Departments(depts) => depts.iter().any(|d| d == &student.department),
            Self::OwnRecords(id) => id == &student.id,
        }
    }

    pub fn permits_department(&self, department: &str) -> bool {
        match self {
            Self::All => true,
            Self::Departments(depts) => depts.iter().any(|d| d == department),
            Self::OwnRecords(_) => false,
        }
    }
}
