//! Database operations for the supervisor service
//!
//! Plain sqlx query functions grouped by entity. Governance decisions
//! (role gates, status rules) live in `services`; these functions only
//! move rows. Guarded transitions return whether the row was actually in
//! the required source state so callers can report state conflicts.

pub mod ingest;
pub mod labs;
pub mod projects;
pub mod rdmp;
pub mod samples;
pub mod storage;
pub mod users;
