//! Patient records: models and the repositories that read and write them.
//!
//! Every repository function takes a [`Database`](crate::db::Database) handle
//! and returns [`DatabaseError`](crate::db::DatabaseError) on failure. Lookups
//! that may miss return `Option`, deletes return whether a row was removed.

pub mod clinical;
pub mod consultations;
pub mod dashboard;
pub mod exams;
pub mod families;
mod models;
pub mod patients;

pub use models::*;
