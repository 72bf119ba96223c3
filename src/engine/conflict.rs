use crate::model::*;

use super::store::{AssignmentRepository, EntityDirectory};
use super::{EngineError, EntityRef, ValidationError};

/// One predicate for every collision lookup. `None` fields are wildcards;
/// `exclude` skips the record being updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub semester: Semester,
    pub classroom: Option<Classroom>,
    pub class_time: Option<ClassTime>,
    pub instructor_id: Option<InstructorId>,
    pub course_id: Option<CourseId>,
    pub exclude: Option<ScheduleId>,
}

impl SlotQuery {
    /// Who holds this room at this time?
    pub fn room_slot(semester: Semester, classroom: &Classroom, class_time: ClassTime) -> Self {
        Self {
            semester,
            classroom: Some(classroom.clone()),
            class_time: Some(class_time),
            instructor_id: None,
            course_id: None,
            exclude: None,
        }
    }

    /// What is this instructor teaching at this time?
    pub fn instructor_slot(
        semester: Semester,
        class_time: ClassTime,
        instructor_id: InstructorId,
    ) -> Self {
        Self {
            semester,
            classroom: None,
            class_time: Some(class_time),
            instructor_id: Some(instructor_id),
            course_id: None,
            exclude: None,
        }
    }

    /// Is this instructor already on this course this semester?
    pub fn course_assignment(
        semester: Semester,
        course_id: CourseId,
        instructor_id: InstructorId,
    ) -> Self {
        Self {
            semester,
            classroom: None,
            class_time: None,
            instructor_id: Some(instructor_id),
            course_id: Some(course_id),
            exclude: None,
        }
    }

    pub fn excluding(mut self, id: ScheduleId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn matches(&self, a: &ScheduleAssignment) -> bool {
        self.exclude != Some(a.id)
            && self.semester == a.semester
            && self.classroom.as_ref().is_none_or(|c| *c == a.classroom)
            && self.class_time.is_none_or(|t| t == a.class_time)
            && self.instructor_id.is_none_or(|id| id == a.instructor_id)
            && self.course_id.is_none_or(|id| id == a.course_id)
    }
}

async fn instructor_display_name<D>(directory: &D, id: InstructorId) -> Result<String, EngineError>
where
    D: EntityDirectory + ?Sized,
{
    Ok(directory
        .instructor_name(id)
        .await?
        .unwrap_or_else(|| format!("#{id}")))
}

/// Admissibility of a brand-new assignment. Course and instructor are assumed
/// to exist. Stops at the first rule broken, in this order: duplicate course
/// assignment, busy classroom, busy instructor.
pub async fn validate_for_create<R, D>(
    repo: &R,
    directory: &D,
    candidate: &NewSchedule,
) -> Result<(), EngineError>
where
    R: AssignmentRepository + ?Sized,
    D: EntityDirectory + ?Sized,
{
    let NewSchedule {
        semester,
        class_time,
        classroom,
        course_id,
        instructor_id,
    } = candidate;

    let duplicate = SlotQuery::course_assignment(*semester, *course_id, *instructor_id);
    if repo.find_assignment(&duplicate).await?.is_some() {
        return Err(ValidationError::DuplicateAssignment {
            semester: *semester,
            course_id: *course_id,
            instructor_id: *instructor_id,
        }
        .into());
    }

    let room = SlotQuery::room_slot(*semester, classroom, *class_time);
    if repo.find_assignment(&room).await?.is_some() {
        return Err(ValidationError::BusyClassroom {
            classroom: classroom.clone(),
            class_time: *class_time,
            semester: *semester,
        }
        .into());
    }

    let teaching = SlotQuery::instructor_slot(*semester, *class_time, *instructor_id);
    if repo.find_assignment(&teaching).await?.is_some() {
        return Err(ValidationError::BusyInstructor {
            instructor: instructor_display_name(directory, *instructor_id).await?,
            class_time: *class_time,
            semester: *semester,
        }
        .into());
    }

    Ok(())
}

/// Merge `patch` onto schedule `existing_id` and check the result, never
/// counting the schedule itself as a collision. Returns the merged candidate.
///
/// Check order: new instructor exists, new course exists, busy instructor,
/// busy classroom, overlapping schedule.
pub async fn validate_for_update<R, D>(
    repo: &R,
    directory: &D,
    existing_id: ScheduleId,
    patch: &SchedulePatch,
) -> Result<ScheduleAssignment, EngineError>
where
    R: AssignmentRepository + ?Sized,
    D: EntityDirectory + ?Sized,
{
    let current = repo
        .get_assignment(existing_id)
        .await?
        .ok_or(EngineError::NotFound(EntityRef::Schedule(existing_id)))?;
    let MergedSchedule {
        candidate,
        course_changed,
        instructor_changed,
    } = patch.merge(&current);

    if instructor_changed && !directory.instructor_exists(candidate.instructor_id).await? {
        return Err(
            ValidationError::ReferenceNotFound(EntityRef::Instructor(candidate.instructor_id))
                .into(),
        );
    }
    if course_changed && !directory.course_exists(candidate.course_id).await? {
        return Err(ValidationError::ReferenceNotFound(EntityRef::Course(candidate.course_id)).into());
    }

    let teaching = SlotQuery::instructor_slot(
        candidate.semester,
        candidate.class_time,
        candidate.instructor_id,
    )
    .excluding(existing_id);
    if repo.find_assignment(&teaching).await?.is_some() {
        return Err(ValidationError::BusyInstructor {
            instructor: instructor_display_name(directory, candidate.instructor_id).await?,
            class_time: candidate.class_time,
            semester: candidate.semester,
        }
        .into());
    }

    let room = SlotQuery::room_slot(candidate.semester, &candidate.classroom, candidate.class_time)
        .excluding(existing_id);
    if repo.find_assignment(&room).await?.is_some() {
        return Err(ValidationError::BusyClassroom {
            classroom: candidate.classroom.clone(),
            class_time: candidate.class_time,
            semester: candidate.semester,
        }
        .into());
    }

    // Room/time overlaps were caught just above; what is left to overlap on
    // is the same course taught twice by one instructor in the semester.
    let duplicate = SlotQuery::course_assignment(
        candidate.semester,
        candidate.course_id,
        candidate.instructor_id,
    )
    .excluding(existing_id);
    if let Some(other) = repo.find_assignment(&duplicate).await? {
        return Err(ValidationError::OverlappingSchedule {
            conflicting_id: other.id,
            semester: other.semester,
            classroom: other.classroom,
            class_time: other.class_time,
        }
        .into());
    }

    Ok(candidate)
}
