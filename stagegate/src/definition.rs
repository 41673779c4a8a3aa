//! Versioned process definitions and their store
//!
//! A definition is the named, user-facing container for one process; each
//! saved document is an immutable version snapshot. At most one version
//! per definition is active at any time, and activation is a single store
//! operation so the invariant holds under concurrent publishes.

use crate::error::{Result, StagegateError};
use crate::graph::ProcessId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Unique identifier for process definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefinitionId(Ulid);

impl DefinitionId {
    /// Create a new random definition ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a DefinitionId from a string representation
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| StagegateError::Storage(format!("Invalid definition ID '{s}': {e}")))
    }
}

impl Default for DefinitionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for definition versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(Ulid);

impl VersionId {
    /// Create a new random version ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a VersionId from a string representation
    pub fn parse(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| StagegateError::Storage(format!("Invalid version ID '{s}': {e}")))
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionStatus {
    /// Being edited; never used for instantiation
    Draft,
    /// Has an active version available for instantiation
    Published,
    /// Retired; kept for its history
    Archived,
}

/// A named, user-facing container for one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Definition identifier
    pub id: DefinitionId,
    /// Globally unique name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// The root process inside this definition's documents
    pub process_id: ProcessId,
    /// Lifecycle status
    pub status: DefinitionStatus,
    /// Who created the definition
    pub created_by: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

/// An immutable snapshot of a definition's document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDefinitionVersion {
    /// Version identifier
    pub id: VersionId,
    /// Owning definition
    pub definition_id: DefinitionId,
    /// Monotonically increasing version number, starting at 1
    pub version: u32,
    /// The full process document text
    pub document: String,
    /// Free-text change notes
    pub change_notes: Option<String>,
    /// Whether this is the active (published) version
    pub is_active: bool,
    /// Who created the version
    pub created_by: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Trait for definition storage backends
pub trait DefinitionStoreBackend: Send + Sync {
    /// Store a new definition
    fn insert_definition(&mut self, definition: ProcessDefinition) -> Result<()>;

    /// Get a definition by ID
    fn get_definition(&self, id: DefinitionId) -> Result<ProcessDefinition>;

    /// Find a definition by its unique name
    fn find_by_name(&self, name: &str) -> Result<Option<ProcessDefinition>>;

    /// List all definitions
    fn list_definitions(&self) -> Result<Vec<ProcessDefinition>>;

    /// Replace a stored definition
    fn update_definition(&mut self, definition: ProcessDefinition) -> Result<()>;

    /// Remove a definition and all its versions
    fn remove_definition(&mut self, id: DefinitionId) -> Result<()>;

    /// Store a new version
    fn insert_version(&mut self, version: ProcessDefinitionVersion) -> Result<()>;

    /// List versions of a definition, newest first
    fn list_versions(&self, definition_id: DefinitionId) -> Result<Vec<ProcessDefinitionVersion>>;

    /// Get a specific version by number
    fn get_version(
        &self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion>;

    /// Get the active version of a definition, if any
    fn active_version(
        &self,
        definition_id: DefinitionId,
    ) -> Result<Option<ProcessDefinitionVersion>>;

    /// Activate one version, deactivating all siblings, as a single
    /// operation. Returns the activated version.
    fn set_active_version(
        &mut self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion>;

    /// The version number the next snapshot should carry
    fn next_version_number(&self, definition_id: DefinitionId) -> Result<u32>;

    /// Clone the storage backend in a box
    fn clone_box(&self) -> Box<dyn DefinitionStoreBackend>;
}

/// In-memory definition storage implementation
#[derive(Default, Clone)]
pub struct MemoryDefinitionStore {
    definitions: HashMap<DefinitionId, ProcessDefinition>,
    versions: HashMap<DefinitionId, Vec<ProcessDefinitionVersion>>,
}

impl MemoryDefinitionStore {
    /// Create a new memory definition store
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefinitionStoreBackend for MemoryDefinitionStore {
    fn insert_definition(&mut self, definition: ProcessDefinition) -> Result<()> {
        self.versions.entry(definition.id).or_default();
        self.definitions.insert(definition.id, definition);
        Ok(())
    }

    fn get_definition(&self, id: DefinitionId) -> Result<ProcessDefinition> {
        self.definitions
            .get(&id)
            .cloned()
            .ok_or_else(|| StagegateError::DefinitionNotFound(id.to_string()))
    }

    fn find_by_name(&self, name: &str) -> Result<Option<ProcessDefinition>> {
        Ok(self
            .definitions
            .values()
            .find(|definition| definition.name == name)
            .cloned())
    }

    fn list_definitions(&self) -> Result<Vec<ProcessDefinition>> {
        let mut definitions: Vec<_> = self.definitions.values().cloned().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    fn update_definition(&mut self, definition: ProcessDefinition) -> Result<()> {
        if !self.definitions.contains_key(&definition.id) {
            return Err(StagegateError::DefinitionNotFound(definition.id.to_string()));
        }
        self.definitions.insert(definition.id, definition);
        Ok(())
    }

    fn remove_definition(&mut self, id: DefinitionId) -> Result<()> {
        self.definitions
            .remove(&id)
            .ok_or_else(|| StagegateError::DefinitionNotFound(id.to_string()))?;
        self.versions.remove(&id);
        Ok(())
    }

    fn insert_version(&mut self, version: ProcessDefinitionVersion) -> Result<()> {
        if !self.definitions.contains_key(&version.definition_id) {
            return Err(StagegateError::DefinitionNotFound(
                version.definition_id.to_string(),
            ));
        }
        self.versions
            .entry(version.definition_id)
            .or_default()
            .push(version);
        Ok(())
    }

    fn list_versions(&self, definition_id: DefinitionId) -> Result<Vec<ProcessDefinitionVersion>> {
        let mut versions = self
            .versions
            .get(&definition_id)
            .cloned()
            .unwrap_or_default();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(versions)
    }

    fn get_version(
        &self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion> {
        self.versions
            .get(&definition_id)
            .and_then(|versions| versions.iter().find(|v| v.version == number))
            .cloned()
            .ok_or(StagegateError::VersionNotFound {
                definition_id,
                version: number,
            })
    }

    fn active_version(
        &self,
        definition_id: DefinitionId,
    ) -> Result<Option<ProcessDefinitionVersion>> {
        Ok(self
            .versions
            .get(&definition_id)
            .and_then(|versions| versions.iter().find(|v| v.is_active))
            .cloned())
    }

    fn set_active_version(
        &mut self,
        definition_id: DefinitionId,
        number: u32,
    ) -> Result<ProcessDefinitionVersion> {
        let versions = self
            .versions
            .get_mut(&definition_id)
            .filter(|versions| versions.iter().any(|v| v.version == number))
            .ok_or(StagegateError::VersionNotFound {
                definition_id,
                version: number,
            })?;

        let mut activated = None;
        for version in versions.iter_mut() {
            version.is_active = version.version == number;
            if version.is_active {
                activated = Some(version.clone());
            }
        }
        activated.ok_or(StagegateError::VersionNotFound {
            definition_id,
            version: number,
        })
    }

    fn next_version_number(&self, definition_id: DefinitionId) -> Result<u32> {
        Ok(self
            .versions
            .get(&definition_id)
            .and_then(|versions| versions.iter().map(|v| v.version).max())
            .unwrap_or(0)
            + 1)
    }

    fn clone_box(&self) -> Box<dyn DefinitionStoreBackend> {
        Box::new(self.clone())
    }
}
