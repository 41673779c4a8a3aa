//! Unified error handling for the stagegate library
//!
//! Every condition a caller can correct carries its own variant with the
//! offending identifier; there is no generic catch-all for the enumerated
//! failure modes. Unclassified engine or codec failures are fatal for the
//! request they occur in: nothing is persisted and the previously
//! committed execution state remains the system of record.

use crate::definition::DefinitionId;
use crate::engine::EngineError;
use crate::project::ProjectId;
use std::io;
use thiserror::Error;

/// The main error type for the stagegate library
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StagegateError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Document failed compilation validation; carries every problem found
    #[error("Process definition is invalid: {}", .errors.join("; "))]
    DefinitionInvalid {
        /// All syntax and reference problems, never silently truncated
        errors: Vec<String>,
    },

    /// A definition with this name already exists
    #[error("A process definition named '{0}' already exists")]
    DuplicateName(String),

    /// The definition is still referenced by projects
    #[error("Definition {definition_id} is referenced by {project_count} project(s) and cannot be deleted")]
    DefinitionInUse {
        /// The definition that was to be deleted
        definition_id: DefinitionId,
        /// How many projects reference it
        project_count: usize,
    },

    /// Definition not found
    #[error("Process definition not found: {0}")]
    DefinitionNotFound(String),

    /// Version not found within a definition
    #[error("Version {version} not found for definition {definition_id}")]
    VersionNotFound {
        /// The definition searched
        definition_id: DefinitionId,
        /// The missing version number
        version: u32,
    },

    /// The definition has no published version to instantiate from
    #[error("Definition {0} has no active version")]
    NoActiveVersion(DefinitionId),

    /// Project not found
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// The decision request is missing a required target or reason
    #[error("Invalid decision request: {0}")]
    InvalidDecisionRequest(String),

    /// A decision was issued against a completed instance
    #[error("Project workflow is already completed")]
    WorkflowAlreadyCompleted,

    /// A concurrent writer committed first; the caller should retry
    #[error("Execution state for project {project_id} was modified concurrently (expected revision {expected}, found {found})")]
    ConcurrentModification {
        /// The project whose state was contended
        project_id: ProjectId,
        /// The revision the losing writer based its work on
        expected: u64,
        /// The revision actually stored
        found: u64,
    },

    /// A persisted execution state uses an encoding this build cannot read
    #[error("Unsupported execution state format {found}")]
    UnsupportedCursorFormat {
        /// The format tag found in the stored document
        found: u32,
    },

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// YAML serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Engine traversal failure (unreachable with compiled graphs)
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Result type for stagegate operations
pub type Result<T> = std::result::Result<T, StagegateError>;
