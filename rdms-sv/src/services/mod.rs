//! Rule engines
//!
//! Pure governance logic evaluated synchronously over snapshots fetched by
//! the handlers: role gating, RDMP lifecycle derivation, identifier
//! detection, and the remediation/needs-attention derivers.

pub mod detector;
pub mod lifecycle;
pub mod permissions;
pub mod remediation;
