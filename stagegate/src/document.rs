//! Process-definition document model
//!
//! A definition document is a YAML text declaring one or more named
//! processes. Each process is a flat list of nodes plus the flows between
//! them; nested workflow groups are expressed as call-activity nodes
//! referencing another process in the same document.

use crate::cursor::CheckpointData;
use crate::decision::DecisionAction;
use crate::position::{GroupId, ItemId};
use serde::{Deserialize, Serialize};

/// A parsed process-definition document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDocument {
    /// All processes declared by the document
    pub processes: Vec<ProcessSpec>,
}

impl ProcessDocument {
    /// Parse a YAML document.
    ///
    /// Returns a human-readable problem description on malformed input;
    /// structural validation happens separately at compile time.
    pub fn parse(text: &str) -> Result<Self, String> {
        serde_yaml::from_str(text).map_err(|e| format!("Malformed process document: {e}"))
    }
}

/// One named process within a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Process identifier, unique within the document
    pub id: String,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nodes, in declaration order
    pub nodes: Vec<NodeSpec>,
    /// Flows between nodes, in declaration order
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
}

/// The kinds of node a process may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Where the token enters the process
    Start,
    /// Where the token leaves the process
    End,
    /// A human checkpoint; execution pauses here
    UserTask,
    /// A decision point routed automatically from checkpoint data
    Gateway,
    /// A nested subgraph (one per workflow group)
    CallActivity,
}

/// One node declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Node identifier, unique within the process
    pub id: String,
    /// Node kind
    pub kind: NodeKind,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// For call activities: the id of the process to execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<String>,
}

/// One flow declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    /// Guard condition; a flow without one is the default/fallthrough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<FlowCondition>,
}

/// A guard on a gateway flow, matched against the resolution data of the
/// most recently completed checkpoint. Every field that is present must
/// match for the flow to be taken.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowCondition {
    /// Required decision action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DecisionAction>,
    /// Required group-level routing target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<GroupId>,
    /// Required item-level routing target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_item: Option<ItemId>,
}

impl FlowCondition {
    /// Whether this condition matches the given checkpoint data
    pub fn matches(&self, data: &CheckpointData) -> bool {
        if let Some(action) = self.action {
            if data.action != Some(action) {
                return false;
            }
        }
        if let Some(group) = &self.target_group {
            if data.target_group.as_ref() != Some(group) {
                return false;
            }
        }
        if let Some(item) = &self.target_item {
            if data.target_item.as_ref() != Some(item) {
                return false;
            }
        }
        true
    }
}
