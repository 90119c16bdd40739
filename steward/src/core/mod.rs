//! Deterministic, pure logic shared by the steward engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod access_url;
pub mod error_class;
pub mod gate;
pub mod playbook;
pub mod redact;
pub mod resume;
pub mod types;
