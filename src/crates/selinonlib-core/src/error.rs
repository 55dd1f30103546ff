//! Error types for configuration parsing, static checking, and plan emission.
//!
//! All build-time failures surface as a [`SelinonError`]. The variants mirror the
//! taxonomy from the design document: configuration errors are fatal and name the
//! offending flow/node, cross-reference failures get their own subtypes for clearer
//! CLI output, and a handful of runtime-only variants exist so the predicate
//! evaluator and dispatcher-facing helpers can reuse the same error type.

use thiserror::Error;

/// Convenience result type used throughout the crate.
pub type Result<T> = std::result::Result<T, SelinonError>;

/// All errors raised by the configuration model, static checker, and plan emitter.
#[derive(Error, Debug)]
pub enum SelinonError {
    /// Malformed YAML, unknown keys, invalid identifiers, duplicate definitions,
    /// propagation-flag disjointness violations, or any other structural problem
    /// caught while building the `System`.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A flow name was referenced but never declared.
    #[error("unknown flow '{0}'")]
    UnknownFlow(String),

    /// A storage name was referenced but never declared.
    #[error("unknown storage '{0}'")]
    UnknownStorage(String),

    /// A task name was referenced but never declared.
    #[error("unknown task '{0}'")]
    UnknownTask(String),

    /// A cache class name was referenced but never registered.
    #[error("unknown cache '{0}'")]
    UnknownCache(String),

    /// A runtime leaf predicate asked for a parent's result on a starting edge,
    /// where there is no parent node to read from.
    #[error("node '{0}' has no parent to read a result from on a starting edge")]
    NoParentNode(String),

    /// A selective-run request named a task that is unreachable from the flow's
    /// start edges.
    #[error("task '{task}' is not reachable from the start of flow '{flow}'")]
    SelectiveNoPath { flow: String, task: String },

    /// Caller-side misuse at runtime, e.g. scheduling a flow that was never declared.
    #[error("request error: {0}")]
    Request(String),

    /// Raised by user task code to disable further retries. Not retried by the
    /// dispatcher; propagated as-is.
    #[error("fatal task error: {0}")]
    FatalTask(String),

    /// The migration generator found no differences between two configurations.
    #[error("no migration needed")]
    MigrationNotNeeded,

    /// The migration directory is missing, non-contiguous, or contains
    /// unparsable filenames.
    #[error("migration skew: {0}")]
    MigrationSkew(String),

    /// Environment variable expansion failed because the variable is unset.
    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    /// Wraps `serde_yaml` parse failures.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wraps `serde_json` (de)serialization failures, e.g. in the plan artifact.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wraps filesystem I/O failures encountered while loading configuration or
    /// writing generated artifacts.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local to the cache implementations in [`crate::cache`]; callers are
    /// expected to catch this and fall back to the storage lookup.
    #[error("cache miss for item '{0}'")]
    CacheMiss(String),
}

impl SelinonError {
    /// Build a [`SelinonError::Configuration`] with a `flow`/`node` prefix, matching
    /// the policy that build-time errors name the offending entity.
    pub fn config_in(flow: &str, node: impl std::fmt::Display, msg: impl std::fmt::Display) -> Self {
        Self::Configuration(format!("flow '{flow}', node '{node}': {msg}"))
    }
}
