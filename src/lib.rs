//! Class-schedule allocation engine.
//!
//! Decides whether a (semester, class time, classroom, course, instructor)
//! assignment can be created or changed without double-booking a room or an
//! instructor, or assigning an instructor to the same course twice in a
//! semester. [`engine::validate_for_create`] and
//! [`engine::validate_for_update`] work against any
//! [`engine::AssignmentRepository`]; [`engine::Engine`] is the bundled
//! WAL-backed store that runs them under a single write lock.

pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
