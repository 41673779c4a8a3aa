//! The workflow service: every operation the core exposes
//!
//! The service is an explicitly constructed, stateless object owning its
//! two store backends and a step directory; callers receive it by
//! dependency injection rather than through a global instance. Every
//! decision round-trips: load serialized cursor, decode, resolve, encode,
//! commit together with one history entry.

use crate::cursor::{CursorCodec, ExecutionStatus};
use crate::decision::{Decision, DecisionRequest, SendBackTarget};
use crate::definition::{
    DefinitionId, DefinitionStatus, DefinitionStoreBackend, MemoryDefinitionStore,
    ProcessDefinition, ProcessDefinitionVersion, VersionId,
};
use crate::document::ProcessDocument;
use crate::engine::{EngineOutcome, ExecutionEngine};
use crate::error::{Result, StagegateError};
use crate::graph::{DocumentValidation, ProcessGraph, ProcessId};
use crate::position::{AvailableTransitions, GroupId, Position, StepDirectory};
use crate::project::{
    Comment, ExecutionStateId, ExecutionStateRecord, HistoryAction, HistoryEntry,
    MemoryProjectStore, ProjectId, ProjectInstance, ProjectStatus, ProjectStoreBackend,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Request to create a definition together with its first version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDefinition {
    /// Globally unique name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// The root process inside the document
    pub process_id: ProcessId,
    /// Initial document text
    pub document: String,
    /// Notes for the initial version
    pub change_notes: Option<String>,
    /// Who is creating the definition
    pub created_by: String,
}

/// Request to save a new version of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVersion {
    /// Document text
    pub document: String,
    /// Notes describing the changes
    pub change_notes: Option<String>,
    /// Publish this version immediately
    pub publish: bool,
    /// Who is creating the version
    pub created_by: String,
}

/// Metadata-only definition update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionUpdate {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New lifecycle status
    pub status: Option<DefinitionStatus>,
}

/// Request to instantiate a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    /// Project name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Definition to instantiate; falls back to the service's configured
    /// default when absent
    pub definition_id: Option<DefinitionId>,
    /// Who is creating the project
    pub created_by: String,
}

/// Outcome of one applied decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// Position before the decision
    pub previous_position: Option<Position>,
    /// Position after the decision; the terminal position on completion
    pub new_position: Option<Position>,
    /// Whether the workflow completed
    pub completed: bool,
    /// Human-readable summary of the move
    pub message: String,
}

/// The workflow execution core's service facade
pub struct WorkflowService {
    definitions: Box<dyn DefinitionStoreBackend>,
    projects: Box<dyn ProjectStoreBackend>,
    directory: StepDirectory,
    default_definition: Option<DefinitionId>,
}

impl WorkflowService {
    /// Create a service with the given backends
    pub fn new(
        definitions: Box<dyn DefinitionStoreBackend>,
        projects: Box<dyn ProjectStoreBackend>,
        directory: StepDirectory,
    ) -> Self {
        Self {
            definitions,
            projects,
            directory,
            default_definition: None,
        }
    }

    /// Create a service with in-memory backends
    pub fn in_memory(directory: StepDirectory) -> Self {
        Self::new(
            Box::new(MemoryDefinitionStore::new()),
            Box::new(MemoryProjectStore::new()),
            directory,
        )
    }

    /// Configure the definition used when `NewProject.definition_id`
    /// is absent
    pub fn with_default_definition(mut self, definition_id: DefinitionId) -> Self {
        self.default_definition = Some(definition_id);
        self
    }

    /// The step directory this service validates against
    pub fn directory(&self) -> &StepDirectory {
        &self.directory
    }

    // ------------------------------------------------------------------
    // Definitions and versions
    // ------------------------------------------------------------------

    /// Create a definition together with its first version (v1, draft,
    /// inactive).
    pub fn create_definition(&mut self, request: NewDefinition) -> Result<ProcessDefinition> {
        if self.definitions.find_by_name(&request.name)?.is_some() {
            return Err(StagegateError::DuplicateName(request.name));
        }
        self.check_document(&request.document, &request.process_id)?;

        let now = Utc::now();
        let definition = ProcessDefinition {
            id: DefinitionId::new(),
            name: request.name,
            description: request.description,
            process_id: request.process_id,
            status: DefinitionStatus::Draft,
            created_by: request.created_by.clone(),
            created_at: now,
            updated_at: now,
        };
        self.definitions.insert_definition(definition.clone())?;
        self.definitions.insert_version(ProcessDefinitionVersion {
            id: VersionId::new(),
            definition_id: definition.id,
            version: 1,
            document: request.document,
            change_notes: request
                .change_notes
                .or_else(|| Some("Initial version".to_string())),
            is_active: false,
            created_by: request.created_by,
            created_at: now,
        })?;

        tracing::info!(definition = %definition.id, name = %definition.name, "created process definition");
        Ok(definition)
    }

    /// Save a new version; with `publish` it atomically becomes the
    /// active one.
    pub fn create_version(
        &mut self,
        definition_id: DefinitionId,
        request: NewVersion,
    ) -> Result<ProcessDefinitionVersion> {
        let definition = self.definitions.get_definition(definition_id)?;
        self.check_document(&request.document, &definition.process_id)?;

        let number = self.definitions.next_version_number(definition_id)?;
        let version = ProcessDefinitionVersion {
            id: VersionId::new(),
            definition_id,
            version: number,
            document: request.document,
            change_notes: request.change_notes,
            is_active: false,
            created_by: request.created_by,
            created_at: Utc::now(),
        };
        self.definitions.insert_version(version.clone())?;
        tracing::info!(definition = %definition_id, version = number, publish = request.publish, "created definition version");

        if request.publish {
            return self.publish_version(definition_id, number);
        }
        Ok(version)
    }

    /// Make an existing version the active one
    pub fn publish_version(
        &mut self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion> {
        let mut definition = self.definitions.get_definition(definition_id)?;
        let activated = self.definitions.set_active_version(definition_id, number)?;

        definition.status = DefinitionStatus::Published;
        definition.updated_at = Utc::now();
        self.definitions.update_definition(definition)?;

        tracing::info!(definition = %definition_id, version = number, "published definition version");
        Ok(activated)
    }

    /// Roll back by copying an old version's document into a new version
    /// and publishing it. History is never rewritten.
    pub fn rollback_to_version(
        &mut self,
        definition_id: DefinitionId,
        number: u32,
        created_by: &str,
    ) -> Result<ProcessDefinitionVersion> {
        let target = self.definitions.get_version(definition_id, number)?;
        let next = self.definitions.next_version_number(definition_id)?;
        self.definitions.insert_version(ProcessDefinitionVersion {
            id: VersionId::new(),
            definition_id,
            version: next,
            document: target.document,
            change_notes: Some(format!("Rollback to version {number}")),
            is_active: false,
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        })?;

        tracing::info!(definition = %definition_id, target = number, new_version = next, "rolling back definition");
        self.publish_version(definition_id, next)
    }

    /// Validate a document without saving it
    pub fn validate_document(
        &self,
        document: &str,
        process_id: Option<&str>,
    ) -> DocumentValidation {
        crate::graph::validate_document(document, process_id)
    }

    /// Update definition metadata (never its documents)
    pub fn update_definition(
        &mut self,
        definition_id: DefinitionId,
        update: DefinitionUpdate,
    ) -> Result<ProcessDefinition> {
        let mut definition = self.definitions.get_definition(definition_id)?;

        if let Some(name) = update.name {
            if let Some(existing) = self.definitions.find_by_name(&name)? {
                if existing.id != definition_id {
                    return Err(StagegateError::DuplicateName(name));
                }
            }
            definition.name = name;
        }
        if let Some(description) = update.description {
            definition.description = Some(description);
        }
        if let Some(status) = update.status {
            definition.status = status;
        }
        definition.updated_at = Utc::now();

        self.definitions.update_definition(definition.clone())?;
        Ok(definition)
    }

    /// Delete a definition. Forbidden while any project references it.
    pub fn delete_definition(&mut self, definition_id: DefinitionId) -> Result<()> {
        let referencing = self.projects.projects_for_definition(definition_id)?;
        if !referencing.is_empty() {
            return Err(StagegateError::DefinitionInUse {
                definition_id,
                project_count: referencing.len(),
            });
        }
        self.definitions.remove_definition(definition_id)?;
        tracing::info!(definition = %definition_id, "deleted process definition");
        Ok(())
    }

    /// Get a definition by ID
    pub fn definition(&self, definition_id: DefinitionId) -> Result<ProcessDefinition> {
        self.definitions.get_definition(definition_id)
    }

    /// List all definitions
    pub fn definitions(&self) -> Result<Vec<ProcessDefinition>> {
        self.definitions.list_definitions()
    }

    /// List a definition's versions, newest first
    pub fn versions(&self, definition_id: DefinitionId) -> Result<Vec<ProcessDefinitionVersion>> {
        self.definitions.list_versions(definition_id)
    }

    /// Get a specific version
    pub fn version(
        &self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion> {
        self.definitions.get_version(definition_id, number)
    }

    /// The active version of a definition
    pub fn active_version(&self, definition_id: DefinitionId) -> Result<ProcessDefinitionVersion> {
        self.definitions
            .active_version(definition_id)?
            .ok_or(StagegateError::NoActiveVersion(definition_id))
    }

    // ------------------------------------------------------------------
    // Projects and decisions
    // ------------------------------------------------------------------

    /// Instantiate a project from the active version of a definition and
    /// run the engine to its first checkpoint.
    pub fn instantiate_project(&mut self, request: NewProject) -> Result<ProjectInstance> {
        let definition_id = request
            .definition_id
            .or(self.default_definition)
            .ok_or_else(|| {
                StagegateError::DefinitionNotFound(
                    "no definition specified and no default configured".to_string(),
                )
            })?;
        let definition = self.definitions.get_definition(definition_id)?;
        let version = self
            .definitions
            .active_version(definition_id)?
            .ok_or(StagegateError::NoActiveVersion(definition_id))?;

        let graph = self.compile_version(&definition, &version)?;
        let engine = ExecutionEngine::new(&graph);
        let (cursor, outcome) = engine.start()?;

        let now = Utc::now();
        let (position, checkpoint, completed) = self.read_outcome(&outcome);
        let project = ProjectInstance {
            id: ProjectId::new(),
            name: request.name,
            description: request.description,
            position: position.clone(),
            definition_id: Some(definition_id),
            definition_version: Some(version.version),
            status: if completed {
                ProjectStatus::Completed
            } else {
                ProjectStatus::Active
            },
            created_at: now,
            updated_at: now,
        };
        let state = ExecutionStateRecord {
            id: ExecutionStateId::new(),
            project_id: project.id,
            document: CursorCodec::encode(&cursor)?,
            current_checkpoint: checkpoint,
            status: if completed {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Running
            },
            revision: 1,
            created_at: now,
            updated_at: now,
        };

        self.projects.insert_project(project.clone(), state)?;
        self.projects.append_history(HistoryEntry {
            project_id: project.id,
            from_group: None,
            to_group: position.as_ref().map(|p| p.group.clone()),
            action: HistoryAction::Started,
            reason: Some("Project created".to_string()),
            decided_by: request.created_by,
            created_at: now,
        })?;

        tracing::info!(
            project = %project.id,
            position = %describe(&position),
            "instantiated project from definition version {}",
            version.version
        );
        Ok(project)
    }

    /// Validate and apply a raw decision request
    pub fn decide_request(
        &mut self,
        project_id: ProjectId,
        request: DecisionRequest,
        decided_by: &str,
    ) -> Result<DecisionOutcome> {
        let decision = Decision::try_from(request)?;
        self.decide(project_id, decision, decided_by)
    }

    /// Apply a decision to the checkpoint the project is paused at.
    ///
    /// Validation happens before any state is touched; the updated
    /// project, execution state, and history entry are committed as one
    /// write, so a failure anywhere leaves the previously persisted state
    /// untouched.
    pub fn decide(
        &mut self,
        project_id: ProjectId,
        decision: Decision,
        decided_by: &str,
    ) -> Result<DecisionOutcome> {
        let mut project = self.projects.get_project(project_id)?;
        match project.status {
            ProjectStatus::Completed => return Err(StagegateError::WorkflowAlreadyCompleted),
            ProjectStatus::Cancelled => {
                return Err(StagegateError::InvalidDecisionRequest(
                    "project is cancelled".to_string(),
                ))
            }
            ProjectStatus::Active => {}
        }
        self.validate_targets(&project, &decision)?;

        let state = self.projects.execution_state(project_id)?;
        let mut cursor = CursorCodec::decode(&state.document)?;

        let definition_id = project.definition_id.ok_or_else(|| {
            StagegateError::Storage(format!("project {project_id} has no definition reference"))
        })?;
        let number = project.definition_version.ok_or_else(|| {
            StagegateError::Storage(format!("project {project_id} has no version reference"))
        })?;
        let definition = self.definitions.get_definition(definition_id)?;
        let version = self.definitions.get_version(definition_id, number)?;
        let graph = self.compile_version(&definition, &version)?;

        let outcome = ExecutionEngine::new(&graph).resolve(&mut cursor, decision.checkpoint_data())?;

        let previous_position = project.position.clone();
        let (new_position, checkpoint, completed) = self.read_outcome(&outcome);

        project.position = new_position.clone();
        project.updated_at = Utc::now();
        if completed {
            project.status = ProjectStatus::Completed;
        }

        let new_state = ExecutionStateRecord {
            id: state.id,
            project_id,
            document: CursorCodec::encode(&cursor)?,
            current_checkpoint: checkpoint,
            status: if completed {
                ExecutionStatus::Completed
            } else {
                ExecutionStatus::Running
            },
            revision: state.revision,
            created_at: state.created_at,
            updated_at: Utc::now(),
        };
        let entry = HistoryEntry {
            project_id,
            from_group: previous_position.as_ref().map(|p| p.group.clone()),
            to_group: new_position.as_ref().map(|p| p.group.clone()),
            action: decision.action().into(),
            reason: decision.reason().map(str::to_string),
            decided_by: decided_by.to_string(),
            created_at: Utc::now(),
        };

        let message = decision_message(&decision, &previous_position, &new_position);
        self.projects
            .commit_decision(project, new_state, state.revision, entry)?;

        tracing::info!(project = %project_id, action = %decision.action(), completed, "{message}");
        Ok(DecisionOutcome {
            previous_position,
            new_position,
            completed,
            message,
        })
    }

    /// The transitions available from the given group
    pub fn available_transitions(&self, current_group: Option<&GroupId>) -> AvailableTransitions {
        self.directory.available_transitions(current_group)
    }

    /// Get a project by ID
    pub fn project(&self, project_id: ProjectId) -> Result<ProjectInstance> {
        self.projects.get_project(project_id)
    }

    /// List all projects, newest first
    pub fn projects(&self) -> Result<Vec<ProjectInstance>> {
        self.projects.list_projects()
    }

    /// Abandon a project at the business level. A status change only; the
    /// execution state is left as-is.
    pub fn cancel_project(&mut self, project_id: ProjectId) -> Result<ProjectInstance> {
        let mut project = self.projects.get_project(project_id)?;
        if project.status == ProjectStatus::Completed {
            return Err(StagegateError::WorkflowAlreadyCompleted);
        }
        project.status = ProjectStatus::Cancelled;
        project.updated_at = Utc::now();
        self.projects.update_project(project.clone())?;
        tracing::info!(project = %project_id, "cancelled project");
        Ok(project)
    }

    /// Attach a comment to a project at its current group
    pub fn add_comment(
        &mut self,
        project_id: ProjectId,
        author: &str,
        content: &str,
    ) -> Result<Comment> {
        let project = self.projects.get_project(project_id)?;
        let (group, item) = match project.position {
            Some(position) => (position.group, position.item),
            None => (GroupId::new("unknown"), None),
        };
        let comment = Comment {
            project_id,
            group,
            item,
            author: author.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.projects.add_comment(comment.clone())?;
        Ok(comment)
    }

    /// Comments of a project, newest first, optionally filtered by group
    pub fn comments(
        &self,
        project_id: ProjectId,
        group: Option<&GroupId>,
    ) -> Result<Vec<Comment>> {
        self.projects.comments(project_id, group)
    }

    /// History of a project, oldest first
    pub fn history(&self, project_id: ProjectId) -> Result<Vec<HistoryEntry>> {
        self.projects.history(project_id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn check_document(&self, document: &str, process_id: &ProcessId) -> Result<()> {
        let validation = crate::graph::validate_document(document, Some(process_id.as_str()));
        if !validation.valid {
            return Err(StagegateError::DefinitionInvalid {
                errors: validation.errors,
            });
        }
        Ok(())
    }

    fn compile_version(
        &self,
        definition: &ProcessDefinition,
        version: &ProcessDefinitionVersion,
    ) -> Result<ProcessGraph> {
        let document = ProcessDocument::parse(&version.document)
            .map_err(|message| StagegateError::DefinitionInvalid {
                errors: vec![message],
            })?;
        ProcessGraph::compile(&document, &definition.process_id)
    }

    fn read_outcome(&self, outcome: &EngineOutcome) -> (Option<Position>, Option<String>, bool) {
        match outcome {
            EngineOutcome::AtCheckpoint(node) => {
                let position = self.directory.position_of(node.as_str());
                if position.is_none() {
                    tracing::warn!(node = %node, "checkpoint id does not map to a known position");
                }
                (position, Some(node.to_string()), false)
            }
            // The terminal position is normalized regardless of which
            // group the graph nominally ended in: callers get one stable
            // terminal marker.
            EngineOutcome::Completed => (Some(Position::end()), None, true),
        }
    }

    /// Check decision targets against the step directory before any state
    /// is touched. The graph remains the runtime ground truth; this is
    /// what turns a structurally impossible request into a caller error
    /// instead of a surprising route.
    fn validate_targets(&self, project: &ProjectInstance, decision: &Decision) -> Result<()> {
        let (target_group, target_item) = match decision {
            Decision::Approve | Decision::CompleteWfg => return Ok(()),
            Decision::SendBack {
                target: SendBackTarget::Group(group),
                ..
            } => (Some(group), None),
            Decision::SendBack {
                target: SendBackTarget::Item(item),
                ..
            } => (None, Some(item)),
            Decision::SkipTo { group } => (Some(group), None),
        };

        let current = project
            .position
            .as_ref()
            .map(|position| &position.group)
            .ok_or_else(|| {
                StagegateError::InvalidDecisionRequest(
                    "project has no current position".to_string(),
                )
            })?;
        let transitions = self.directory.transitions(current).ok_or_else(|| {
            StagegateError::InvalidDecisionRequest(format!("unknown workflow group '{current}'"))
        })?;

        if let Some(item) = target_item {
            if self.directory.item(current, item).is_none() {
                return Err(StagegateError::InvalidDecisionRequest(format!(
                    "'{item}' is not an item of '{current}'"
                )));
            }
            return Ok(());
        }

        let group = target_group.expect("group target present");
        let allowed = match decision {
            Decision::SkipTo { .. } => &transitions.skip_to_targets,
            _ => &transitions.send_back_targets,
        };
        if !allowed.contains(group) {
            return Err(StagegateError::InvalidDecisionRequest(format!(
                "'{group}' is not a valid {} target from '{current}'",
                if matches!(decision, Decision::SkipTo { .. }) {
                    "skip"
                } else {
                    "send-back"
                }
            )));
        }
        Ok(())
    }
}

fn describe(position: &Option<Position>) -> String {
    position
        .as_ref()
        .map(Position::to_string)
        .unwrap_or_else(|| "?".to_string())
}

fn decision_message(
    decision: &Decision,
    previous: &Option<Position>,
    new: &Option<Position>,
) -> String {
    let (previous, new) = (describe(previous), describe(new));
    match decision {
        Decision::Approve => format!("Approved: moved from {previous} to {new}"),
        Decision::SendBack { .. } => format!("Sent back from {previous} to {new}"),
        Decision::SkipTo { .. } => format!("Skipped from {previous} to {new}"),
        Decision::CompleteWfg => format!("Completed {previous}: moved to {new}"),
    }
}
