//! Project instances and their durable execution state
//!
//! A project is the unit of work traversing a workflow. Its serialized
//! execution cursor is the single source of truth for what happens on the
//! next decision; the denormalized position fields exist only for cheap
//! queries and are updated together with the cursor in one store
//! operation so they can never disagree.

use crate::cursor::ExecutionStatus;
use crate::decision::DecisionAction;
use crate::definition::DefinitionId;
use crate::error::{Result, StagegateError};
use crate::position::{GroupId, ItemId, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use ulid::Ulid;

/// Unique identifier for project instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(Ulid);

impl ProjectId {
    /// Create a new random project ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a ProjectId from a string representation
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| StagegateError::Storage(format!("Invalid project ID '{s}': {e}")))
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for execution state records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionStateId(Ulid);

impl ExecutionStateId {
    /// Create a new random execution state ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ExecutionStateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionStateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Business status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Traversing its workflow
    Active,
    /// Reached the end node
    Completed,
    /// Abandoned at the business level; a status change, not an engine
    /// operation
    Cancelled,
}

/// The unit of work traversing a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInstance {
    /// Project identifier
    pub id: ProjectId,
    /// Project name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Denormalized current position; kept in lockstep with the
    /// execution state
    pub position: Option<Position>,
    /// The definition this project was instantiated from
    pub definition_id: Option<DefinitionId>,
    /// The version number it was instantiated from
    pub definition_version: Option<u32>,
    /// Business status
    pub status: ProjectStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// The durable serialized execution cursor for exactly one project.
///
/// `document` is opaque to every collaborator outside the engine and the
/// codec; only `current_checkpoint` is safe for external queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStateRecord {
    /// Record identifier
    pub id: ExecutionStateId,
    /// Owning project
    pub project_id: ProjectId,
    /// Opaque serialized cursor (codec output)
    pub document: serde_json::Value,
    /// Quick-lookup copy of the current checkpoint identifier
    pub current_checkpoint: Option<String>,
    /// Whether the execution is still running
    pub status: ExecutionStatus,
    /// Optimistic-lock revision; bumped on every committed decision
    pub revision: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// The action recorded on a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    /// Project instantiated
    Started,
    /// Checkpoint approved
    Approve,
    /// Project sent back
    SendBack,
    /// Project skipped forward
    SkipTo,
    /// Group completed early
    CompleteWfg,
}

impl From<DecisionAction> for HistoryAction {
    fn from(action: DecisionAction) -> Self {
        match action {
            DecisionAction::Approve => HistoryAction::Approve,
            DecisionAction::SendBack => HistoryAction::SendBack,
            DecisionAction::SkipTo => HistoryAction::SkipTo,
            DecisionAction::CompleteWfg => HistoryAction::CompleteWfg,
        }
    }
}

/// Append-only audit record of one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Owning project
    pub project_id: ProjectId,
    /// Group the project moved from (empty at instantiation)
    pub from_group: Option<GroupId>,
    /// Group the project moved to
    pub to_group: Option<GroupId>,
    /// Action taken
    pub action: HistoryAction,
    /// Free-text reason (always present for send-backs)
    pub reason: Option<String>,
    /// Who made the decision
    pub decided_by: String,
    /// When
    pub created_at: DateTime<Utc>,
}

/// A free-text note attached to a project at a specific group.
/// Comments never drive transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Owning project
    pub project_id: ProjectId,
    /// Group the comment was made at
    pub group: GroupId,
    /// Item the comment was made at, when known
    pub item: Option<ItemId>,
    /// Who wrote it
    pub author: String,
    /// The note itself
    pub content: String,
    /// When
    pub created_at: DateTime<Utc>,
}

/// Everything a store holds for one project, persisted as a unit so a
/// decision's writes are all-or-nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredProject {
    project: ProjectInstance,
    state: ExecutionStateRecord,
    history: Vec<HistoryEntry>,
    comments: Vec<Comment>,
}

/// Trait for project storage backends
pub trait ProjectStoreBackend: Send + Sync {
    /// Store a freshly instantiated project together with its initial
    /// execution state
    fn insert_project(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
    ) -> Result<()>;

    /// Get a project by ID
    fn get_project(&self, id: ProjectId) -> Result<ProjectInstance>;

    /// List all projects
    fn list_projects(&self) -> Result<Vec<ProjectInstance>>;

    /// IDs of projects instantiated from the given definition
    fn projects_for_definition(&self, definition_id: DefinitionId) -> Result<Vec<ProjectId>>;

    /// The execution state of a project
    fn execution_state(&self, project_id: ProjectId) -> Result<ExecutionStateRecord>;

    /// Commit one decision: the updated project, its new execution state,
    /// and the history entry are written together or not at all. Fails
    /// with `ConcurrentModification` when the stored revision no longer
    /// matches `expected_revision`.
    fn commit_decision(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
        expected_revision: u64,
        entry: HistoryEntry,
    ) -> Result<()>;

    /// Replace a stored project (business status changes)
    fn update_project(&mut self, project: ProjectInstance) -> Result<()>;

    /// Append a history entry outside a decision (instantiation)
    fn append_history(&mut self, entry: HistoryEntry) -> Result<()>;

    /// History of a project, oldest first
    fn history(&self, project_id: ProjectId) -> Result<Vec<HistoryEntry>>;

    /// Attach a comment
    fn add_comment(&mut self, comment: Comment) -> Result<()>;

    /// Comments of a project, newest first, optionally filtered by group
    fn comments(&self, project_id: ProjectId, group: Option<&GroupId>) -> Result<Vec<Comment>>;

    /// Clone the storage backend in a box
    fn clone_box(&self) -> Box<dyn ProjectStoreBackend>;
}

fn commit_into(
    stored: &mut StoredProject,
    project: ProjectInstance,
    mut state: ExecutionStateRecord,
    expected_revision: u64,
    entry: HistoryEntry,
) -> Result<()> {
    if stored.state.revision != expected_revision {
        return Err(StagegateError::ConcurrentModification {
            project_id: project.id,
            expected: expected_revision,
            found: stored.state.revision,
        });
    }
    state.revision = expected_revision + 1;
    state.updated_at = Utc::now();
    stored.project = project;
    stored.state = state;
    stored.history.push(entry);
    Ok(())
}

/// In-memory project storage implementation
#[derive(Default, Clone)]
pub struct MemoryProjectStore {
    projects: HashMap<ProjectId, StoredProject>,
}

impl MemoryProjectStore {
    /// Create a new memory project store
    pub fn new() -> Self {
        Self::default()
    }

    fn stored(&self, id: ProjectId) -> Result<&StoredProject> {
        self.projects
            .get(&id)
            .ok_or_else(|| StagegateError::ProjectNotFound(id.to_string()))
    }

    fn stored_mut(&mut self, id: ProjectId) -> Result<&mut StoredProject> {
        self.projects
            .get_mut(&id)
            .ok_or_else(|| StagegateError::ProjectNotFound(id.to_string()))
    }
}

impl ProjectStoreBackend for MemoryProjectStore {
    fn insert_project(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
    ) -> Result<()> {
        self.projects.insert(
            project.id,
            StoredProject {
                project,
                state,
                history: Vec::new(),
                comments: Vec::new(),
            },
        );
        Ok(())
    }

    fn get_project(&self, id: ProjectId) -> Result<ProjectInstance> {
        Ok(self.stored(id)?.project.clone())
    }

    fn list_projects(&self) -> Result<Vec<ProjectInstance>> {
        let mut projects: Vec<_> = self
            .projects
            .values()
            .map(|stored| stored.project.clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    fn projects_for_definition(&self, definition_id: DefinitionId) -> Result<Vec<ProjectId>> {
        Ok(self
            .projects
            .values()
            .filter(|stored| stored.project.definition_id == Some(definition_id))
            .map(|stored| stored.project.id)
            .collect())
    }

    fn execution_state(&self, project_id: ProjectId) -> Result<ExecutionStateRecord> {
        Ok(self.stored(project_id)?.state.clone())
    }

    fn commit_decision(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
        expected_revision: u64,
        entry: HistoryEntry,
    ) -> Result<()> {
        let stored = self.stored_mut(project.id)?;
        commit_into(stored, project, state, expected_revision, entry)
    }

    fn update_project(&mut self, project: ProjectInstance) -> Result<()> {
        let id = project.id;
        self.stored_mut(id)?.project = project;
        Ok(())
    }

    fn append_history(&mut self, entry: HistoryEntry) -> Result<()> {
        self.stored_mut(entry.project_id)?.history.push(entry);
        Ok(())
    }

    fn history(&self, project_id: ProjectId) -> Result<Vec<HistoryEntry>> {
        Ok(self.stored(project_id)?.history.clone())
    }

    fn add_comment(&mut self, comment: Comment) -> Result<()> {
        self.stored_mut(comment.project_id)?.comments.push(comment);
        Ok(())
    }

    fn comments(&self, project_id: ProjectId, group: Option<&GroupId>) -> Result<Vec<Comment>> {
        let mut comments: Vec<_> = self
            .stored(project_id)?
            .comments
            .iter()
            .filter(|comment| group.is_none() || group == Some(&comment.group))
            .cloned()
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    fn clone_box(&self) -> Box<dyn ProjectStoreBackend> {
        Box::new(self.clone())
    }
}

/// File system project storage implementation.
///
/// Each project lives under `<base_path>/projects/<id>/project.json`,
/// with a read cache in front of the files.
pub struct FileSystemProjectStore {
    base_path: PathBuf,
    cache: dashmap::DashMap<ProjectId, StoredProject>,
}

impl FileSystemProjectStore {
    /// Create a new file system project store rooted at `base_path`
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        let store = Self {
            base_path,
            cache: dashmap::DashMap::new(),
        };
        store.reload_cache()?;
        Ok(store)
    }

    /// Reload the cache from disk
    pub fn reload_cache(&self) -> Result<()> {
        self.cache.clear();

        let projects_dir = self.base_path.join("projects");
        if !projects_dir.exists() {
            std::fs::create_dir_all(&projects_dir)?;
        }

        for entry in walkdir::WalkDir::new(&projects_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.file_name().and_then(|s| s.to_str()) == Some("project.json") {
                if let Ok(content) = std::fs::read_to_string(path) {
                    if let Ok(stored) = serde_json::from_str::<StoredProject>(&content) {
                        self.cache.insert(stored.project.id, stored);
                    }
                }
            }
        }

        Ok(())
    }

    fn project_path(&self, id: ProjectId) -> PathBuf {
        self.base_path
            .join("projects")
            .join(id.to_string())
            .join("project.json")
    }

    fn load(&self, id: ProjectId) -> Result<StoredProject> {
        if let Some(stored) = self.cache.get(&id) {
            return Ok(stored.clone());
        }

        let path = self.project_path(id);
        if !path.exists() {
            return Err(StagegateError::ProjectNotFound(id.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let stored: StoredProject = serde_json::from_str(&content)?;
        self.cache.insert(id, stored.clone());
        Ok(stored)
    }

    fn write(&self, stored: StoredProject) -> Result<()> {
        let path = self.project_path(stored.project.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&path, content)?;
        self.cache.insert(stored.project.id, stored);
        Ok(())
    }
}

impl ProjectStoreBackend for FileSystemProjectStore {
    fn insert_project(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
    ) -> Result<()> {
        self.write(StoredProject {
            project,
            state,
            history: Vec::new(),
            comments: Vec::new(),
        })
    }

    fn get_project(&self, id: ProjectId) -> Result<ProjectInstance> {
        Ok(self.load(id)?.project)
    }

    fn list_projects(&self) -> Result<Vec<ProjectInstance>> {
        let mut projects: Vec<_> = self
            .cache
            .iter()
            .map(|entry| entry.value().project.clone())
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    fn projects_for_definition(&self, definition_id: DefinitionId) -> Result<Vec<ProjectId>> {
        Ok(self
            .cache
            .iter()
            .filter(|entry| entry.value().project.definition_id == Some(definition_id))
            .map(|entry| entry.value().project.id)
            .collect())
    }

    fn execution_state(&self, project_id: ProjectId) -> Result<ExecutionStateRecord> {
        Ok(self.load(project_id)?.state)
    }

    fn commit_decision(
        &mut self,
        project: ProjectInstance,
        state: ExecutionStateRecord,
        expected_revision: u64,
        entry: HistoryEntry,
    ) -> Result<()> {
        let mut stored = self.load(project.id)?;
        commit_into(&mut stored, project, state, expected_revision, entry)?;
        self.write(stored)
    }

    fn update_project(&mut self, project: ProjectInstance) -> Result<()> {
        let mut stored = self.load(project.id)?;
        stored.project = project;
        self.write(stored)
    }

    fn append_history(&mut self, entry: HistoryEntry) -> Result<()> {
        let mut stored = self.load(entry.project_id)?;
        stored.history.push(entry);
        self.write(stored)
    }

    fn history(&self, project_id: ProjectId) -> Result<Vec<HistoryEntry>> {
        Ok(self.load(project_id)?.history)
    }

    fn add_comment(&mut self, comment: Comment) -> Result<()> {
        let mut stored = self.load(comment.project_id)?;
        stored.comments.push(comment);
        self.write(stored)
    }

    fn comments(&self, project_id: ProjectId, group: Option<&GroupId>) -> Result<Vec<Comment>> {
        let mut comments: Vec<_> = self
            .load(project_id)?
            .comments
            .into_iter()
            .filter(|comment| group.is_none() || group == Some(&comment.group))
            .collect();
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(comments)
    }

    fn clone_box(&self) -> Box<dyn ProjectStoreBackend> {
        let store = FileSystemProjectStore {
            base_path: self.base_path.clone(),
            cache: self.cache.clone(),
        };
        Box::new(store)
    }
}
