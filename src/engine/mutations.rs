use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{validate_for_create, validate_for_update};
use super::{Engine, EngineError, EntityRef, ValidationError, WalCommand};

fn validate_name(name: &str, what: &'static str) -> Result<String, EngineError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(format!("{what} must not be empty")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(trimmed.to_string())
}

impl Engine {
    pub async fn create_schedule(
        &self,
        candidate: NewSchedule,
    ) -> Result<ScheduleAssignment, EngineError> {
        let _write = self.write_lock.lock().await;
        let result = self.create_locked(candidate).await;
        observability::record_mutation("create", &result);
        result
    }

    async fn create_locked(&self, candidate: NewSchedule) -> Result<ScheduleAssignment, EngineError> {
        if self.store.schedule_count() >= MAX_SCHEDULES {
            return Err(EngineError::LimitExceeded("too many schedules"));
        }
        if !self.store.contains_instructor(candidate.instructor_id) {
            return Err(
                ValidationError::ReferenceNotFound(EntityRef::Instructor(candidate.instructor_id))
                    .into(),
            );
        }
        if !self.store.contains_course(candidate.course_id) {
            return Err(ValidationError::ReferenceNotFound(EntityRef::Course(candidate.course_id)).into());
        }

        let started = Instant::now();
        let verdict = validate_for_create(&self.store, &self.store, &candidate).await;
        metrics::histogram!(observability::VALIDATION_DURATION_SECONDS, "op" => "create")
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = verdict {
            debug!("create rejected: {e}");
            return Err(e);
        }

        let assignment = candidate.with_id(self.allocate_id());
        self.store.check_unique(&assignment)?;
        let event = Event::schedule_created(&assignment);
        self.persist_and_apply(&event).await?;
        self.notify.send(assignment.semester, &event);
        metrics::gauge!(observability::SCHEDULES_ACTIVE).set(self.store.schedule_count() as f64);
        info!(
            "schedule {} created: {} {} {} course={} instructor={}",
            assignment.id,
            assignment.semester,
            assignment.class_time,
            assignment.classroom,
            assignment.course_id,
            assignment.instructor_id
        );
        Ok(assignment)
    }

    /// Apply a partial update. An update that changes nothing is not written.
    pub async fn update_schedule(
        &self,
        id: ScheduleId,
        patch: SchedulePatch,
    ) -> Result<ScheduleAssignment, EngineError> {
        let _write = self.write_lock.lock().await;
        let result = self.update_locked(id, &patch).await;
        observability::record_mutation("update", &result);
        result
    }

    async fn update_locked(
        &self,
        id: ScheduleId,
        patch: &SchedulePatch,
    ) -> Result<ScheduleAssignment, EngineError> {
        let previous = self
            .store
            .get_schedule(id)
            .ok_or(EngineError::NotFound(EntityRef::Schedule(id)))?;

        let started = Instant::now();
        let verdict = validate_for_update(&self.store, &self.store, id, patch).await;
        metrics::histogram!(observability::VALIDATION_DURATION_SECONDS, "op" => "update")
            .record(started.elapsed().as_secs_f64());
        let updated = match verdict {
            Ok(updated) => updated,
            Err(e) => {
                debug!("update of schedule {id} rejected: {e}");
                return Err(e);
            }
        };
        if updated == previous {
            return Ok(previous);
        }

        self.store.check_unique(&updated)?;
        let event = Event::schedule_updated(&updated);
        self.persist_and_apply(&event).await?;
        self.notify.send(previous.semester, &event);
        if updated.semester != previous.semester {
            self.notify.send(updated.semester, &event);
        }
        info!(
            "schedule {id} updated: {} {} {} course={} instructor={}",
            updated.semester, updated.class_time, updated.classroom, updated.course_id, updated.instructor_id
        );
        Ok(updated)
    }

    /// Removing a schedule cannot create a collision, so nothing is checked.
    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<ScheduleAssignment, EngineError> {
        let _write = self.write_lock.lock().await;
        let result = self.delete_locked(id).await;
        observability::record_mutation("delete", &result);
        result
    }

    async fn delete_locked(&self, id: ScheduleId) -> Result<ScheduleAssignment, EngineError> {
        let existing = self
            .store
            .get_schedule(id)
            .ok_or(EngineError::NotFound(EntityRef::Schedule(id)))?;
        let event = Event::ScheduleDeleted { id };
        self.persist_and_apply(&event).await?;
        self.notify.send(existing.semester, &event);
        metrics::gauge!(observability::SCHEDULES_ACTIVE).set(self.store.schedule_count() as f64);
        info!("schedule {id} deleted");
        Ok(existing)
    }

    // ── Directory ────────────────────────────────────────────

    pub async fn register_course(&self, id: CourseId, name: &str) -> Result<Course, EngineError> {
        let name = validate_name(name, "course name")?;
        let _write = self.write_lock.lock().await;
        if self.store.course_count() >= MAX_COURSES {
            return Err(EngineError::LimitExceeded("too many courses"));
        }
        if self.store.contains_course(id) {
            return Err(EngineError::AlreadyExists(EntityRef::Course(id)));
        }
        let event = Event::CourseRegistered { id, name: name.clone() };
        self.persist_and_apply(&event).await?;
        Ok(Course { id, name })
    }

    pub async fn remove_course(&self, id: CourseId) -> Result<(), EngineError> {
        let _write = self.write_lock.lock().await;
        if !self.store.contains_course(id) {
            return Err(EngineError::NotFound(EntityRef::Course(id)));
        }
        if self.store.course_referenced(id) {
            return Err(EngineError::StillReferenced(EntityRef::Course(id)));
        }
        self.persist_and_apply(&Event::CourseRemoved { id }).await
    }

    pub async fn register_instructor(
        &self,
        id: InstructorId,
        first_name: &str,
        last_name: &str,
    ) -> Result<Instructor, EngineError> {
        let first_name = validate_name(first_name, "first name")?;
        let last_name = validate_name(last_name, "last name")?;
        let _write = self.write_lock.lock().await;
        if self.store.instructor_count() >= MAX_INSTRUCTORS {
            return Err(EngineError::LimitExceeded("too many instructors"));
        }
        if self.store.contains_instructor(id) {
            return Err(EngineError::AlreadyExists(EntityRef::Instructor(id)));
        }
        let event = Event::InstructorRegistered {
            id,
            first_name: first_name.clone(),
            last_name: last_name.clone(),
        };
        self.persist_and_apply(&event).await?;
        Ok(Instructor {
            id,
            first_name,
            last_name,
        })
    }

    pub async fn remove_instructor(&self, id: InstructorId) -> Result<(), EngineError> {
        let _write = self.write_lock.lock().await;
        if !self.store.contains_instructor(id) {
            return Err(EngineError::NotFound(EntityRef::Instructor(id)));
        }
        if self.store.instructor_referenced(id) {
            return Err(EngineError::StillReferenced(EntityRef::Instructor(id)));
        }
        self.persist_and_apply(&Event::InstructorRemoved { id }).await
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Rewrite the WAL with only the events needed to recreate the current
    /// state. Holds the write lock throughout so no append can slip between
    /// the snapshot and the swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _write = self.write_lock.lock().await;

        let mut events = vec![Event::SequenceAdvanced {
            next_id: self.peek_next_id(),
        }];
        for course in self.store.courses() {
            events.push(Event::CourseRegistered {
                id: course.id,
                name: course.name,
            });
        }
        for instructor in self.store.instructors() {
            events.push(Event::InstructorRegistered {
                id: instructor.id,
                first_name: instructor.first_name,
                last_name: instructor.last_name,
            });
        }
        for schedule in self.store.schedules() {
            events.push(Event::schedule_created(&schedule));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
