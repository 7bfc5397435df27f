//! Database access for the RDM Supervisor
//!
//! Schema creation lives in [`init`]; entity-specific queries live in the
//! service crate next to the handlers that use them.

pub mod init;

pub use init::init_database;
