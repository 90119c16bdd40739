//! I/O adapters for steward commands.

pub mod config;
pub mod health;
pub mod lock;
pub mod paths;
pub mod pipeline_store;
pub mod process;
pub mod project_state;
pub mod proofs;
pub mod recovery;
pub mod remediation;
pub mod report;
pub mod stage_worker;
