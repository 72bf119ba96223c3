use crate::model::*;

use super::{Engine, EngineError, EntityRef};

impl Engine {
    pub fn get_schedule(&self, id: ScheduleId) -> Result<ScheduleAssignment, EngineError> {
        self.store
            .get_schedule(id)
            .ok_or(EngineError::NotFound(EntityRef::Schedule(id)))
    }

    /// Schedules matching `filter`, ordered by id.
    pub fn list_schedules(&self, filter: &ScheduleFilter) -> Vec<ScheduleAssignment> {
        self.store
            .schedules()
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect()
    }

    /// One instructor's week for a semester, ordered by start time.
    pub fn instructor_timetable(
        &self,
        instructor_id: InstructorId,
        semester: Semester,
    ) -> Result<Vec<ScheduleAssignment>, EngineError> {
        if !self.store.contains_instructor(instructor_id) {
            return Err(EngineError::NotFound(EntityRef::Instructor(instructor_id)));
        }
        let filter = ScheduleFilter {
            semester: Some(semester),
            instructor_id: Some(instructor_id),
            ..Default::default()
        };
        Ok(by_start_time(self.list_schedules(&filter)))
    }

    /// Everything booked into a room for a semester, ordered by start time.
    pub fn classroom_timetable(
        &self,
        classroom: &Classroom,
        semester: Semester,
    ) -> Vec<ScheduleAssignment> {
        let filter = ScheduleFilter {
            semester: Some(semester),
            classroom: Some(classroom.clone()),
            ..Default::default()
        };
        by_start_time(self.list_schedules(&filter))
    }

    pub fn get_course(&self, id: CourseId) -> Result<Course, EngineError> {
        self.store
            .get_course(id)
            .ok_or(EngineError::NotFound(EntityRef::Course(id)))
    }

    pub fn get_instructor(&self, id: InstructorId) -> Result<Instructor, EngineError> {
        self.store
            .get_instructor(id)
            .ok_or(EngineError::NotFound(EntityRef::Instructor(id)))
    }

    /// Every pair of schedules that shares a room slot, an instructor slot, or
    /// a (semester, course, instructor) triple. Empty unless the log was
    /// written by something other than this engine.
    pub fn find_violations(&self) -> Vec<Violation> {
        let all = self.store.schedules();
        let mut found = Vec::new();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                if a.semester != b.semester {
                    continue;
                }
                let kind = if a.classroom == b.classroom && a.class_time == b.class_time {
                    Some(ViolationKind::DoubleBookedClassroom)
                } else if a.class_time == b.class_time && a.instructor_id == b.instructor_id {
                    Some(ViolationKind::DoubleBookedInstructor)
                } else if a.course_id == b.course_id && a.instructor_id == b.instructor_id {
                    Some(ViolationKind::DuplicateCourseAssignment)
                } else {
                    None
                };
                if let Some(kind) = kind {
                    found.push(Violation {
                        kind,
                        first: a.id,
                        second: b.id,
                    });
                }
            }
        }
        found
    }
}

fn by_start_time(mut schedules: Vec<ScheduleAssignment>) -> Vec<ScheduleAssignment> {
    schedules.sort_by_key(|a| (a.class_time.start(), a.class_time.end(), a.id));
    schedules
}
