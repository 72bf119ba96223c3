use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::limits::MAX_CLASSROOM_LEN;

pub type ScheduleId = i64;
pub type CourseId = i64;
pub type InstructorId = i64;

const CLOCK_FORMAT: &str = "%H:%M";

/// Malformed user input (semester name, clock time, classroom).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Semester {
    Fall,
    Spring,
    Summer,
    Winter,
}

impl Semester {
    pub const ALL: [Semester; 4] = [
        Semester::Fall,
        Semester::Spring,
        Semester::Summer,
        Semester::Winter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::Fall => "Fall",
            Semester::Spring => "Spring",
            Semester::Summer => "Summer",
            Semester::Winter => "Winter",
        }
    }
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Semester {
    type Err = ParseError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Semester::ALL
            .into_iter()
            .find(|sem| sem.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseError(format!("unknown semester: {s:?}")))
    }
}

/// A same-day `[start, end)` class meeting, rendered `"HH:mm - HH:mm"`.
///
/// Two class times are the same slot only when their renderings are equal.
/// Partially overlapping ranges are distinct slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClassTime {
    start: NaiveTime,
    end: NaiveTime,
}

impl ClassTime {
    /// Seconds are dropped so that equality matches the rendered form.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, ParseError> {
        let start = truncate_to_minute(start);
        let end = truncate_to_minute(end);
        if start >= end {
            return Err(ParseError(format!(
                "class must end after it starts: {} - {}",
                start.format(CLOCK_FORMAT),
                end.format(CLOCK_FORMAT)
            )));
        }
        Ok(Self { start, end })
    }

    /// Build from two `HH:mm` clock strings.
    pub fn from_clock(start: &str, end: &str) -> Result<Self, ParseError> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }
}

fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}

fn parse_clock(s: &str) -> Result<NaiveTime, ParseError> {
    NaiveTime::parse_from_str(s.trim(), CLOCK_FORMAT)
        .map_err(|e| ParseError(format!("invalid clock time {s:?}: {e}")))
}

impl fmt::Display for ClassTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format(CLOCK_FORMAT),
            self.end.format(CLOCK_FORMAT)
        )
    }
}

impl FromStr for ClassTime {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ParseError(format!("class time must look like \"HH:mm - HH:mm\": {s:?}")))?;
        Self::from_clock(start, end)
    }
}

impl TryFrom<String> for ClassTime {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ClassTime> for String {
    fn from(t: ClassTime) -> Self {
        t.to_string()
    }
}

/// Room display name. Trimmed on input, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Classroom(String);

impl Classroom {
    pub fn new(name: &str) -> Result<Self, ParseError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ParseError("classroom must not be empty".into()));
        }
        if trimmed.len() > MAX_CLASSROOM_LEN {
            return Err(ParseError(format!(
                "classroom longer than {MAX_CLASSROOM_LEN} bytes"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Comparison key: lowercased display name.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }
}

impl PartialEq for Classroom {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Classroom {}

impl Hash for Classroom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Classroom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Classroom {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Classroom::new(&s)
    }
}

impl From<Classroom> for String {
    fn from(c: Classroom) -> Self {
        c.0
    }
}

/// A persisted class meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub id: ScheduleId,
    pub semester: Semester,
    pub class_time: ClassTime,
    pub classroom: Classroom,
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
}

/// A fully populated candidate that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub semester: Semester,
    pub class_time: ClassTime,
    pub classroom: Classroom,
    pub course_id: CourseId,
    pub instructor_id: InstructorId,
}

impl NewSchedule {
    /// Build a candidate from raw request values.
    pub fn parse(
        semester: &str,
        class_time: &str,
        classroom: &str,
        course_id: CourseId,
        instructor_id: InstructorId,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            semester: semester.parse()?,
            class_time: class_time.parse()?,
            classroom: Classroom::new(classroom)?,
            course_id,
            instructor_id,
        })
    }

    pub fn with_id(self, id: ScheduleId) -> ScheduleAssignment {
        ScheduleAssignment {
            id,
            semester: self.semester,
            class_time: self.class_time,
            classroom: self.classroom,
            course_id: self.course_id,
            instructor_id: self.instructor_id,
        }
    }
}

/// Partial update. `None` leaves the stored value in place; every `Some`
/// is taken literally, including an id of 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulePatch {
    pub semester: Option<Semester>,
    pub class_time: Option<ClassTime>,
    pub classroom: Option<Classroom>,
    pub course_id: Option<CourseId>,
    pub instructor_id: Option<InstructorId>,
}

/// Result of laying a [`SchedulePatch`] over a stored assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedSchedule {
    pub candidate: ScheduleAssignment,
    pub course_changed: bool,
    pub instructor_changed: bool,
}

impl SchedulePatch {
    pub fn is_empty(&self) -> bool {
        self.semester.is_none()
            && self.class_time.is_none()
            && self.classroom.is_none()
            && self.course_id.is_none()
            && self.instructor_id.is_none()
    }

    pub fn merge(&self, current: &ScheduleAssignment) -> MergedSchedule {
        let course_changed = self.course_id.is_some_and(|id| id != current.course_id);
        let instructor_changed = self
            .instructor_id
            .is_some_and(|id| id != current.instructor_id);
        let candidate = ScheduleAssignment {
            id: current.id,
            semester: self.semester.unwrap_or(current.semester),
            class_time: self.class_time.unwrap_or(current.class_time),
            classroom: self
                .classroom
                .clone()
                .unwrap_or_else(|| current.classroom.clone()),
            course_id: self.course_id.unwrap_or(current.course_id),
            instructor_id: self.instructor_id.unwrap_or(current.instructor_id),
        };
        MergedSchedule {
            candidate,
            course_changed,
            instructor_changed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructor {
    pub id: InstructorId,
    pub first_name: String,
    pub last_name: String,
}

impl Instructor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Listing filter; every `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub semester: Option<Semester>,
    pub classroom: Option<Classroom>,
    pub course_id: Option<CourseId>,
    pub instructor_id: Option<InstructorId>,
}

impl ScheduleFilter {
    pub fn matches(&self, a: &ScheduleAssignment) -> bool {
        self.semester.is_none_or(|s| s == a.semester)
            && self.classroom.as_ref().is_none_or(|c| *c == a.classroom)
            && self.course_id.is_none_or(|id| id == a.course_id)
            && self.instructor_id.is_none_or(|id| id == a.instructor_id)
    }
}

/// A pair of persisted assignments that break one of the uniqueness rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub first: ScheduleId,
    pub second: ScheduleId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    DoubleBookedClassroom,
    DoubleBookedInstructor,
    DuplicateCourseAssignment,
}

/// Flat event types, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourseRegistered {
        id: CourseId,
        name: String,
    },
    CourseRemoved {
        id: CourseId,
    },
    InstructorRegistered {
        id: InstructorId,
        first_name: String,
        last_name: String,
    },
    InstructorRemoved {
        id: InstructorId,
    },
    ScheduleCreated {
        id: ScheduleId,
        semester: Semester,
        class_time: ClassTime,
        classroom: Classroom,
        course_id: CourseId,
        instructor_id: InstructorId,
    },
    ScheduleUpdated {
        id: ScheduleId,
        semester: Semester,
        class_time: ClassTime,
        classroom: Classroom,
        course_id: CourseId,
        instructor_id: InstructorId,
    },
    ScheduleDeleted {
        id: ScheduleId,
    },
    /// Written at the head of a compacted log so deleted ids are never reused.
    SequenceAdvanced {
        next_id: ScheduleId,
    },
}

impl Event {
    pub fn schedule_created(a: &ScheduleAssignment) -> Self {
        Event::ScheduleCreated {
            id: a.id,
            semester: a.semester,
            class_time: a.class_time,
            classroom: a.classroom.clone(),
            course_id: a.course_id,
            instructor_id: a.instructor_id,
        }
    }

    pub fn schedule_updated(a: &ScheduleAssignment) -> Self {
        Event::ScheduleUpdated {
            id: a.id,
            semester: a.semester,
            class_time: a.class_time,
            classroom: a.classroom.clone(),
            course_id: a.course_id,
            instructor_id: a.instructor_id,
        }
    }

    /// The assignment carried by a create/update event.
    pub fn assignment(&self) -> Option<ScheduleAssignment> {
        match self {
            Event::ScheduleCreated {
                id,
                semester,
                class_time,
                classroom,
                course_id,
                instructor_id,
            }
            | Event::ScheduleUpdated {
                id,
                semester,
                class_time,
                classroom,
                course_id,
                instructor_id,
            } => Some(ScheduleAssignment {
                id: *id,
                semester: *semester,
                class_time: *class_time,
                classroom: classroom.clone(),
                course_id: *course_id,
                instructor_id: *instructor_id,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(id: ScheduleId) -> ScheduleAssignment {
        NewSchedule::parse("Fall", "09:00 - 10:00", "Room 101", 5, 7)
            .unwrap()
            .with_id(id)
    }

    #[test]
    fn semester_parse_is_case_insensitive() {
        assert_eq!("fall".parse::<Semester>().unwrap(), Semester::Fall);
        assert_eq!("  SPRING ".parse::<Semester>().unwrap(), Semester::Spring);
        assert_eq!("sUmMeR".parse::<Semester>().unwrap(), Semester::Summer);
        assert!("Autumn".parse::<Semester>().is_err());
        assert_eq!(Semester::Winter.to_string(), "Winter");
    }

    #[test]
    fn class_time_renders_canonically() {
        let t: ClassTime = "9:00-10:30".parse().unwrap();
        assert_eq!(t.to_string(), "09:00 - 10:30");
        let u = ClassTime::from_clock("09:00", "10:30").unwrap();
        assert_eq!(t, u);
    }

    #[test]
    fn class_time_rejects_inverted_and_garbage() {
        assert!("10:00 - 09:00".parse::<ClassTime>().is_err());
        assert!("10:00 - 10:00".parse::<ClassTime>().is_err());
        assert!("10:00".parse::<ClassTime>().is_err());
        assert!("25:00 - 26:00".parse::<ClassTime>().is_err());
    }

    #[test]
    fn class_time_overlap_is_not_equality() {
        let a: ClassTime = "09:00 - 10:00".parse().unwrap();
        let b: ClassTime = "09:30 - 10:30".parse().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn class_time_drops_seconds() {
        let start = NaiveTime::from_hms_opt(9, 0, 42).unwrap();
        let end = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let t = ClassTime::new(start, end).unwrap();
        assert_eq!(t, "09:00 - 10:00".parse().unwrap());
    }

    #[test]
    fn classroom_compares_case_insensitively() {
        let a = Classroom::new(" Room 101 ").unwrap();
        let b = Classroom::new("room 101").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Room 101");
        assert!(Classroom::new("   ").is_err());
        assert!(Classroom::new(&"x".repeat(MAX_CLASSROOM_LEN + 1)).is_err());
    }

    #[test]
    fn empty_patch_merges_to_current() {
        let current = assignment(1);
        let merged = SchedulePatch::default().merge(&current);
        assert_eq!(merged.candidate, current);
        assert!(!merged.course_changed);
        assert!(!merged.instructor_changed);
    }

    #[test]
    fn patch_same_ids_are_unchanged() {
        let current = assignment(1);
        let patch = SchedulePatch {
            course_id: Some(5),
            instructor_id: Some(7),
            ..Default::default()
        };
        let merged = patch.merge(&current);
        assert!(!merged.course_changed);
        assert!(!merged.instructor_changed);
    }

    #[test]
    fn patch_zero_id_is_a_real_value() {
        let current = assignment(1);
        let patch = SchedulePatch {
            instructor_id: Some(0),
            ..Default::default()
        };
        let merged = patch.merge(&current);
        assert!(merged.instructor_changed);
        assert_eq!(merged.candidate.instructor_id, 0);
        assert_eq!(merged.candidate.course_id, 5);
    }

    #[test]
    fn patch_replaces_only_supplied_fields() {
        let current = assignment(1);
        let patch = SchedulePatch {
            classroom: Some(Classroom::new("Room 303").unwrap()),
            ..Default::default()
        };
        let merged = patch.merge(&current);
        assert_eq!(merged.candidate.classroom.as_str(), "Room 303");
        assert_eq!(merged.candidate.semester, Semester::Fall);
        assert_eq!(merged.candidate.class_time, current.class_time);
    }

    #[test]
    fn filter_matches_on_all_given_fields() {
        let a = assignment(1);
        let filter = ScheduleFilter {
            semester: Some(Semester::Fall),
            classroom: Some(Classroom::new("ROOM 101").unwrap()),
            ..Default::default()
        };
        assert!(filter.matches(&a));
        let other = ScheduleFilter {
            instructor_id: Some(8),
            ..Default::default()
        };
        assert!(!other.matches(&a));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::schedule_created(&assignment(3));
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.assignment(), Some(assignment(3)));
    }
}
