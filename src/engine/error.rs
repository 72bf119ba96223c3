use std::fmt;

use serde_json::json;

use crate::model::*;

/// Identifies a stored entity in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Schedule(ScheduleId),
    Course(CourseId),
    Instructor(InstructorId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Schedule(id) => write!(f, "schedule {id}"),
            EntityRef::Course(id) => write!(f, "course {id}"),
            EntityRef::Instructor(id) => write!(f, "instructor {id}"),
        }
    }
}

/// A rejected create or update. Shown to the end user as-is: `field()` is the
/// machine-readable key, `Display` the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateAssignment {
        semester: Semester,
        course_id: CourseId,
        instructor_id: InstructorId,
    },
    BusyClassroom {
        classroom: Classroom,
        class_time: ClassTime,
        semester: Semester,
    },
    BusyInstructor {
        instructor: String,
        class_time: ClassTime,
        semester: Semester,
    },
    OverlappingSchedule {
        conflicting_id: ScheduleId,
        semester: Semester,
        classroom: Classroom,
        class_time: ClassTime,
    },
    ReferenceNotFound(EntityRef),
}

impl ValidationError {
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::DuplicateAssignment { .. } => "Schedule",
            ValidationError::BusyClassroom { .. } => "Busy Classroom",
            ValidationError::BusyInstructor { .. } => "Busy Instructor",
            ValidationError::OverlappingSchedule { .. } => "Overlapping Schedules",
            ValidationError::ReferenceNotFound(EntityRef::Course(_)) => "Course ID",
            ValidationError::ReferenceNotFound(EntityRef::Instructor(_)) => "Instructor ID",
            ValidationError::ReferenceNotFound(EntityRef::Schedule(_)) => "Schedule ID",
        }
    }

    /// Body for a 400-style response: `{"field": .., "message": ..}`.
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "field": self.field(),
            "message": self.to_string(),
        })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateAssignment {
                semester,
                course_id,
                instructor_id,
            } => write!(
                f,
                "instructor {instructor_id} is already assigned to course {course_id} in the {semester} semester"
            ),
            ValidationError::BusyClassroom {
                classroom,
                class_time,
                semester,
            } => write!(
                f,
                "classroom {classroom} is already booked at {class_time} in the {semester} semester"
            ),
            ValidationError::BusyInstructor {
                instructor,
                class_time,
                semester,
            } => write!(
                f,
                "instructor {instructor} is already teaching at {class_time} in the {semester} semester"
            ),
            ValidationError::OverlappingSchedule {
                conflicting_id,
                semester,
                classroom,
                class_time,
            } => write!(
                f,
                "schedule overlaps schedule {conflicting_id} ({classroom}, {class_time}, {semester})"
            ),
            ValidationError::ReferenceNotFound(entity) => write!(f, "{entity} does not exist"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum EngineError {
    Rejected(ValidationError),
    NotFound(EntityRef),
    AlreadyExists(EntityRef),
    StillReferenced(EntityRef),
    InvalidInput(String),
    LimitExceeded(&'static str),
    UniqueViolation(&'static str),
    WalError(String),
}

impl EngineError {
    /// The rejection, if this is a user-input validation failure.
    pub fn rejection(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Rejected(v) => Some(v),
            _ => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(v: ValidationError) -> Self {
        EngineError::Rejected(v)
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError::InvalidInput(e.0)
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Rejected(v) => write!(f, "{}: {v}", v.field()),
            EngineError::NotFound(entity) => write!(f, "not found: {entity}"),
            EngineError::AlreadyExists(entity) => write!(f, "already exists: {entity}"),
            EngineError::StillReferenced(entity) => {
                write!(f, "cannot delete {entity}: still referenced by schedules")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::UniqueViolation(key) => write!(f, "unique constraint violated: {key}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
