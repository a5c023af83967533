use crate::data::{ClassroomId, SchoolDay, ScheduleId, SubjectId, TeacherId};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Start date {start} must not be after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Subject {subject} has {remaining} hour(s) left, {requested} requested")]
    InsufficientHours {
        subject: SubjectId,
        requested: u32,
        remaining: u32,
    },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u32 },

    #[error("Classroom {classroom} is already booked in week {week} on {day} by schedule {by}")]
    ClassroomOccupied {
        classroom: ClassroomId,
        week: u32,
        day: SchoolDay,
        by: ScheduleId,
    },

    #[error("Teacher {teacher} is already teaching in week {week} on {day} (schedule {by})")]
    TeacherDoubleBooked {
        teacher: TeacherId,
        week: u32,
        day: SchoolDay,
        by: ScheduleId,
    },

    #[error("Snapshot file could not be read or written: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScheduleError {
    pub fn not_found(kind: &'static str, id: u32) -> Self {
        ScheduleError::NotFound { kind, id }
    }

    /// Errors raised by the slot-conflict invariant rather than by bad data.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ScheduleError::ClassroomOccupied { .. } | ScheduleError::TeacherDoubleBooked { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
