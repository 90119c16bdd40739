//! Reconciliation and orchestration engine for an unattended remote
//! browser-automation pipeline.
//!
//! The crate decides when to retry, when to escalate, and which remediation
//! to apply. The architecture keeps a strict separation:
//!
//! - **[`core`]**: pure, deterministic logic (playbook selection, gate
//!   evaluation, resume points, URL checks). No I/O.
//! - **[`io`]**: side-effecting adapters (lock files, child processes, state
//!   documents). Collaborators sit behind traits so tests can script them.
//!
//! Orchestration modules ([`reconcile`], [`pipeline`], [`escalation`]) combine
//! the two to implement the CLI commands.

pub mod core;
pub mod escalation;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod reconcile;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
