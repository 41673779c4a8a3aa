//! # Stagegate
//!
//! Versioned process definitions and a resumable human-approval workflow
//! engine.
//!
//! ## Features
//!
//! - **Process Graph Model**: compile a definition document into a graph
//!   of human checkpoints, gateways, and nested workflow groups
//! - **Execution Engine**: deterministic token-passing that pauses at
//!   human checkpoints and persists its exact state between requests
//! - **Decision Protocol**: approve, send-back, skip-to, and
//!   complete-group resolutions, validated before any state is touched
//! - **Definition Store**: draft/published/archived lifecycle with
//!   at-most-one-active versioning and rollback-by-copy
//! - **State Codec**: schema-tagged serialization of in-flight execution
//!   state for durable, crash-safe resumption
//!
//! ## Quick Start
//!
//! ```rust
//! use stagegate::{
//!     Decision, NewDefinition, NewProject, ProcessId, StepDirectory, WorkflowService,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = r#"
//! processes:
//!   - id: Review
//!     nodes:
//!       - { id: start, kind: start }
//!       - { id: WFG1_WFI1, kind: user-task }
//!       - { id: end, kind: end }
//!     flows:
//!       - { from: start, to: WFG1_WFI1 }
//!       - { from: WFG1_WFI1, to: end }
//! "#;
//!
//! let mut service = WorkflowService::in_memory(StepDirectory::standard());
//! let definition = service.create_definition(NewDefinition {
//!     name: "Design Review".to_string(),
//!     description: None,
//!     process_id: ProcessId::new("Review"),
//!     document: document.to_string(),
//!     change_notes: None,
//!     created_by: "docs".to_string(),
//! })?;
//! service.publish_version(definition.id, 1)?;
//!
//! let project = service.instantiate_project(NewProject {
//!     name: "First project".to_string(),
//!     description: None,
//!     definition_id: Some(definition.id),
//!     created_by: "docs".to_string(),
//! })?;
//! assert_eq!(project.position.as_ref().unwrap().to_string(), "WFG1/WFI1");
//!
//! let outcome = service.decide(project.id, Decision::Approve, "reviewer")?;
//! assert!(outcome.completed);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

/// Execution cursors and their durable encoding
pub mod cursor;

/// The decision protocol resolving a paused checkpoint
pub mod decision;

/// Versioned process definitions and their store
pub mod definition;

/// Process-definition document model
pub mod document;

/// Deterministic token-passing over a compiled process graph
pub mod engine;

/// Unified error handling
pub mod error;

/// Compiled process graphs and document validation
pub mod graph;

/// Two-level step addressing and the static step directory
pub mod position;

/// Project instances and their durable execution state
pub mod project;

/// The workflow service facade
pub mod service;

#[cfg(test)]
mod test_helpers;

// Re-export core types
pub use cursor::{
    CheckpointData, CursorCodec, ExecutionCursor, ExecutionStatus, CURSOR_FORMAT_VERSION,
};
pub use decision::{Decision, DecisionAction, DecisionRequest, SendBackTarget};
pub use definition::{
    DefinitionId, DefinitionStatus, DefinitionStoreBackend, MemoryDefinitionStore,
    ProcessDefinition, ProcessDefinitionVersion, VersionId,
};
pub use document::ProcessDocument;
pub use engine::{EngineError, EngineOutcome, ExecutionEngine, MAX_ENGINE_STEPS};
pub use error::{Result, StagegateError};
pub use graph::{validate_document, DocumentValidation, NodeId, ProcessGraph, ProcessId};
pub use position::{
    AvailableTransitions, GroupId, GroupInfo, GroupTransitions, ItemId, ItemInfo, Position,
    StepDirectory,
};
pub use project::{
    Comment, ExecutionStateId, ExecutionStateRecord, FileSystemProjectStore, HistoryAction,
    HistoryEntry, MemoryProjectStore, ProjectId, ProjectInstance, ProjectStatus,
    ProjectStoreBackend,
};
pub use service::{
    DecisionOutcome, DefinitionUpdate, NewDefinition, NewProject, NewVersion, WorkflowService,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
