//! Migration file diffing and replay.
//!
//! [`diff::diff_plans`] compares two compiled [`selinonlib_core::plan::PlanArtifact`]s
//! and produces a [`diff::Migration`] — a per-flow old-edge-index to
//! new-edge-index table. [`store`] persists that as a numbered `{N}.json`
//! file in a migrations directory; [`replay::replay`] walks a chain of those
//! files forward against a persisted [`replay::Message`], keeping its
//! `waiting_edges` indices valid across config changes.

pub mod diff;
pub mod error;
pub mod replay;
pub mod store;

pub use diff::Migration;
pub use error::{MigrateError, Result};
pub use replay::Message;
