use async_trait::async_trait;
use dashmap::DashMap;

use crate::model::*;

use super::conflict::SlotQuery;
use super::EngineError;

/// Lookups the allocation validator needs from wherever schedules live.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// The lowest-id assignment matching `query`, if any.
    async fn find_assignment(
        &self,
        query: &SlotQuery,
    ) -> Result<Option<ScheduleAssignment>, EngineError>;

    async fn get_assignment(
        &self,
        id: ScheduleId,
    ) -> Result<Option<ScheduleAssignment>, EngineError>;
}

/// Existence oracle for the entities a schedule points at.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn course_exists(&self, id: CourseId) -> Result<bool, EngineError>;

    /// Full display name, or `None` if the instructor does not exist.
    async fn instructor_name(&self, id: InstructorId) -> Result<Option<String>, EngineError>;

    async fn instructor_exists(&self, id: InstructorId) -> Result<bool, EngineError> {
        Ok(self.instructor_name(id).await?.is_some())
    }
}

type RoomSlot = (Semester, Classroom, ClassTime);
type InstructorSlot = (Semester, ClassTime, InstructorId);
type CourseAssignment = (Semester, CourseId, InstructorId);

fn room_slot(a: &ScheduleAssignment) -> RoomSlot {
    (a.semester, a.classroom.clone(), a.class_time)
}

fn instructor_slot(a: &ScheduleAssignment) -> InstructorSlot {
    (a.semester, a.class_time, a.instructor_id)
}

fn course_assignment(a: &ScheduleAssignment) -> CourseAssignment {
    (a.semester, a.course_id, a.instructor_id)
}

/// Schedules plus the course/instructor directory, with one unique index per
/// allocation rule.
pub struct InMemoryStore {
    schedules: DashMap<ScheduleId, ScheduleAssignment>,
    by_room_slot: DashMap<RoomSlot, ScheduleId>,
    by_instructor_slot: DashMap<InstructorSlot, ScheduleId>,
    by_course_assignment: DashMap<CourseAssignment, ScheduleId>,
    courses: DashMap<CourseId, Course>,
    instructors: DashMap<InstructorId, Instructor>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            schedules: DashMap::new(),
            by_room_slot: DashMap::new(),
            by_instructor_slot: DashMap::new(),
            by_course_assignment: DashMap::new(),
            courses: DashMap::new(),
            instructors: DashMap::new(),
        }
    }

    // ── Schedules ────────────────────────────────────────────

    pub fn schedule_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn get_schedule(&self, id: ScheduleId) -> Option<ScheduleAssignment> {
        self.schedules.get(&id).map(|e| e.value().clone())
    }

    /// All schedules, ordered by id.
    pub fn schedules(&self) -> Vec<ScheduleAssignment> {
        let mut all: Vec<ScheduleAssignment> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|a| a.id);
        all
    }

    /// Refuse `a` if another id already holds one of its unique keys.
    pub fn check_unique(&self, a: &ScheduleAssignment) -> Result<(), EngineError> {
        let held_by_other = |holder: Option<ScheduleId>| holder.is_some_and(|id| id != a.id);
        if held_by_other(self.by_room_slot.get(&room_slot(a)).map(|e| *e.value())) {
            return Err(EngineError::UniqueViolation("semester, classroom, class_time"));
        }
        if held_by_other(
            self.by_instructor_slot
                .get(&instructor_slot(a))
                .map(|e| *e.value()),
        ) {
            return Err(EngineError::UniqueViolation("semester, class_time, instructor_id"));
        }
        if held_by_other(
            self.by_course_assignment
                .get(&course_assignment(a))
                .map(|e| *e.value()),
        ) {
            return Err(EngineError::UniqueViolation("semester, course_id, instructor_id"));
        }
        Ok(())
    }

    /// Insert or replace, keeping the indexes in step.
    pub fn put_schedule(&self, a: ScheduleAssignment) {
        if let Some(old) = self.schedules.get(&a.id).map(|e| e.value().clone()) {
            self.unindex(&old);
        }
        self.by_room_slot.insert(room_slot(&a), a.id);
        self.by_instructor_slot.insert(instructor_slot(&a), a.id);
        self.by_course_assignment.insert(course_assignment(&a), a.id);
        self.schedules.insert(a.id, a);
    }

    pub fn remove_schedule(&self, id: ScheduleId) -> Option<ScheduleAssignment> {
        let (_, old) = self.schedules.remove(&id)?;
        self.unindex(&old);
        Some(old)
    }

    fn unindex(&self, a: &ScheduleAssignment) {
        self.by_room_slot.remove_if(&room_slot(a), |_, id| *id == a.id);
        self.by_instructor_slot
            .remove_if(&instructor_slot(a), |_, id| *id == a.id);
        self.by_course_assignment
            .remove_if(&course_assignment(a), |_, id| *id == a.id);
    }

    /// Index lookup for the three unique key shapes, scan otherwise.
    pub fn find(&self, query: &SlotQuery) -> Option<ScheduleAssignment> {
        let indexed = match (&query.classroom, query.class_time, query.instructor_id, query.course_id) {
            (Some(room), Some(time), None, None) => Some(
                self.by_room_slot
                    .get(&(query.semester, room.clone(), time))
                    .map(|e| *e.value()),
            ),
            (None, Some(time), Some(instructor), None) => Some(
                self.by_instructor_slot
                    .get(&(query.semester, time, instructor))
                    .map(|e| *e.value()),
            ),
            (None, None, Some(instructor), Some(course)) => Some(
                self.by_course_assignment
                    .get(&(query.semester, course, instructor))
                    .map(|e| *e.value()),
            ),
            _ => None,
        };
        match indexed {
            Some(hit) => hit
                .and_then(|id| self.get_schedule(id))
                .filter(|a| query.matches(a)),
            None => self
                .schedules
                .iter()
                .filter(|e| query.matches(e.value()))
                .min_by_key(|e| *e.key())
                .map(|e| e.value().clone()),
        }
    }

    // ── Directory ────────────────────────────────────────────

    pub fn course_count(&self) -> usize {
        self.courses.len()
    }

    pub fn get_course(&self, id: CourseId) -> Option<Course> {
        self.courses.get(&id).map(|e| e.value().clone())
    }

    pub fn contains_course(&self, id: CourseId) -> bool {
        self.courses.contains_key(&id)
    }

    pub fn courses(&self) -> Vec<Course> {
        let mut all: Vec<Course> = self.courses.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|c| c.id);
        all
    }

    pub fn instructor_count(&self) -> usize {
        self.instructors.len()
    }

    pub fn get_instructor(&self, id: InstructorId) -> Option<Instructor> {
        self.instructors.get(&id).map(|e| e.value().clone())
    }

    pub fn contains_instructor(&self, id: InstructorId) -> bool {
        self.instructors.contains_key(&id)
    }

    pub fn instructors(&self) -> Vec<Instructor> {
        let mut all: Vec<Instructor> =
            self.instructors.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|i| i.id);
        all
    }

    pub fn course_referenced(&self, id: CourseId) -> bool {
        self.schedules.iter().any(|e| e.value().course_id == id)
    }

    pub fn instructor_referenced(&self, id: InstructorId) -> bool {
        self.schedules.iter().any(|e| e.value().instructor_id == id)
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) {
        match event {
            Event::CourseRegistered { id, name } => {
                self.courses.insert(
                    *id,
                    Course {
                        id: *id,
                        name: name.clone(),
                    },
                );
            }
            Event::CourseRemoved { id } => {
                self.courses.remove(id);
            }
            Event::InstructorRegistered {
                id,
                first_name,
                last_name,
            } => {
                self.instructors.insert(
                    *id,
                    Instructor {
                        id: *id,
                        first_name: first_name.clone(),
                        last_name: last_name.clone(),
                    },
                );
            }
            Event::InstructorRemoved { id } => {
                self.instructors.remove(id);
            }
            Event::ScheduleCreated { .. } | Event::ScheduleUpdated { .. } => {
                if let Some(a) = event.assignment() {
                    self.put_schedule(a);
                }
            }
            Event::ScheduleDeleted { id } => {
                self.remove_schedule(*id);
            }
            // Sequence bookkeeping lives in the engine.
            Event::SequenceAdvanced { .. } => {}
        }
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryStore {
    async fn find_assignment(
        &self,
        query: &SlotQuery,
    ) -> Result<Option<ScheduleAssignment>, EngineError> {
        Ok(self.find(query))
    }

    async fn get_assignment(
        &self,
        id: ScheduleId,
    ) -> Result<Option<ScheduleAssignment>, EngineError> {
        Ok(self.get_schedule(id))
    }
}

#[async_trait]
impl EntityDirectory for InMemoryStore {
    async fn course_exists(&self, id: CourseId) -> Result<bool, EngineError> {
        Ok(self.contains_course(id))
    }

    async fn instructor_name(&self, id: InstructorId) -> Result<Option<String>, EngineError> {
        Ok(self.get_instructor(id).map(|i| i.full_name()))
    }
}
