//! Configuration model, predicate language, failure lattice and plan emitter
//! for a declarative task-flow compiler.
//!
//! A [`system::System`] is built in two passes from YAML: first every task,
//! storage and flow is declared and assigned a stable id
//! ([`ids`]), then edges, failure descriptors and propagation settings are
//! resolved against those ids ([`system`]). [`check::check_system`] runs the
//! whole-system invariants, and [`plan::emit`] compiles the result into the
//! artifact a runtime dispatches against.

pub mod cache;
pub mod check;
pub mod edge;
pub mod envvar;
pub mod error;
pub mod failure;
pub mod ident;
pub mod ids;
pub mod node;
pub mod plan;
pub mod predicate;
pub mod simulate;
pub mod strategy;
pub mod system;

pub use error::{Result, SelinonError};
pub use ids::{FlowId, NodeRef, StorageId, TaskClassId, TaskId};
pub use system::System;
