//! Two-level step addressing and the static step directory
//!
//! Checkpoints produced by the graph compiler carry raw node identifiers.
//! This module maps those identifiers onto the domain's `(group, item)`
//! addressing and owns the static directory of workflow groups, their
//! items, and the transitions each group legally permits.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Group identifier reserved for the terminal position of a workflow.
pub const END_GROUP: &str = "End";

/// Errors that can occur when creating position-related types
#[derive(Debug, Error)]
pub enum PositionError {
    /// Group ID cannot be empty or whitespace only
    #[error("Workflow group ID cannot be empty or whitespace only")]
    EmptyGroupId,
    /// Item ID cannot be empty or whitespace only
    #[error("Workflow item ID cannot be empty or whitespace only")]
    EmptyItemId,
}

/// Result type for position operations
pub type PositionResult<T> = Result<T, PositionError>;

/// Unique identifier for a workflow group (a named phase of the process)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(String);

impl GroupId {
    /// Create a new group ID
    ///
    /// # Panics
    /// Panics if the ID is empty or whitespace only. For non-panicking
    /// creation, use `try_new` instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("Workflow group ID cannot be empty or whitespace only")
    }

    /// Create a new group ID, returning an error for invalid input
    pub fn try_new(id: impl Into<String>) -> PositionResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PositionError::EmptyGroupId);
        }
        Ok(Self(id))
    }

    /// The reserved terminal group used once a workflow has completed
    pub fn end() -> Self {
        Self(END_GROUP.to_string())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GroupId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow item (a checkpoint within a group)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new item ID
    ///
    /// # Panics
    /// Panics if the ID is empty or whitespace only. For non-panicking
    /// creation, use `try_new` instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("Workflow item ID cannot be empty or whitespace only")
    }

    /// Create a new item ID, returning an error for invalid input
    pub fn try_new(id: impl Into<String>) -> PositionResult<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(PositionError::EmptyItemId);
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A project's position in its workflow: the group it is paused in and,
/// when the paused node addresses a single checkpoint, the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// The workflow group
    pub group: GroupId,
    /// The workflow item within the group, when known
    pub item: Option<ItemId>,
}

impl Position {
    /// Create a position addressing an item within a group
    pub fn new(group: GroupId, item: ItemId) -> Self {
        Self {
            group,
            item: Some(item),
        }
    }

    /// Create a position addressing a group without a specific item
    pub fn group_only(group: GroupId) -> Self {
        Self { group, item: None }
    }

    /// The terminal position every completed workflow is normalized to
    pub fn end() -> Self {
        Self {
            group: GroupId::end(),
            item: None,
        }
    }

    /// Whether this is the terminal position
    pub fn is_end(&self) -> bool {
        self.group.as_str() == END_GROUP && self.item.is_none()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.item {
            Some(item) => write!(f, "{}/{}", self.group, item),
            None => write!(f, "{}", self.group),
        }
    }
}

fn composite_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9]*)_(WFI[0-9]+)$").expect("composite id regex is valid")
    })
}

fn call_activity_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9]*)_CallActivity$").expect("call activity id regex is valid")
    })
}

/// Parse a composite checkpoint id of the form `WFG1_WFI2` into `(WFG1, WFI2)`.
fn parse_composite_id(raw: &str, _directory: &StepDirectory) -> Option<Position> {
    let captures = composite_id_regex().captures(raw)?;
    Some(Position::new(
        GroupId::new(&captures[1]),
        ItemId::new(&captures[2]),
    ))
}

/// Parse a call-activity id of the form `WFG1_CallActivity` into `(WFG1, —)`.
fn parse_call_activity_id(raw: &str, _directory: &StepDirectory) -> Option<Position> {
    let captures = call_activity_id_regex().captures(raw)?;
    Some(Position::group_only(GroupId::new(&captures[1])))
}

/// Resolve a legacy full-name id such as `WFG1_ProjectKickoff` via the
/// directory's alias table.
fn parse_legacy_id(raw: &str, directory: &StepDirectory) -> Option<Position> {
    directory
        .legacy_aliases
        .get(raw)
        .cloned()
        .map(Position::group_only)
}

/// Human-readable information about a workflow item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Item ID (e.g. `WFI1`)
    pub id: ItemId,
    /// Display name (e.g. "Initial Project Review")
    pub name: String,
}

/// Human-readable information about a workflow group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group ID (e.g. `WFG1`)
    pub id: GroupId,
    /// Display name (e.g. "Project Kickoff")
    pub name: String,
    /// Longer description of the phase
    pub description: Option<String>,
    /// Items within this group, in order
    pub items: Vec<ItemInfo>,
}

/// The transitions a group legally permits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupTransitions {
    /// Group reached by approving out of this group
    pub approve_target: Option<GroupId>,
    /// Groups this group may be sent back to
    pub send_back_targets: Vec<GroupId>,
    /// Groups this group may skip forward to
    pub skip_to_targets: Vec<GroupId>,
}

/// Transitions available from a group, rendered with full group info
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AvailableTransitions {
    /// Whether approving is possible
    pub can_approve: bool,
    /// Target group when approving
    pub approve_target: Option<GroupInfo>,
    /// Whether sending back is possible
    pub can_send_back: bool,
    /// Valid send-back targets
    pub send_back_targets: Vec<GroupInfo>,
    /// Whether skipping forward is possible
    pub can_skip_to: bool,
    /// Valid skip targets
    pub skip_to_targets: Vec<GroupInfo>,
}

/// Static, definition-independent directory of workflow groups and items.
///
/// The directory is used to render available transitions and to validate
/// `send_back`/`skip_to` targets; the compiled graph remains the ground
/// truth for what actually happens at runtime.
#[derive(Debug, Clone, Default)]
pub struct StepDirectory {
    groups: Vec<GroupInfo>,
    transitions: HashMap<GroupId, GroupTransitions>,
    legacy_aliases: HashMap<String, GroupId>,
}

impl StepDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group and the transitions it permits
    pub fn with_group(mut self, group: GroupInfo, transitions: GroupTransitions) -> Self {
        self.transitions.insert(group.id.clone(), transitions);
        self.groups.push(group);
        self
    }

    /// Register a legacy full-name alias for a group.
    ///
    /// Older documents addressed groups through ids like
    /// `WFG1_ProjectKickoff`; it is unclear whether such ids are still
    /// reachable, so the alias table is kept and resolved last.
    pub fn with_legacy_alias(mut self, alias: impl Into<String>, group: GroupId) -> Self {
        self.legacy_aliases.insert(alias.into(), group);
        self
    }

    /// The standard three-phase design directory
    pub fn standard() -> Self {
        Self::new()
            .with_group(
                GroupInfo {
                    id: GroupId::new("WFG1"),
                    name: "Project Kickoff".to_string(),
                    description: Some(
                        "Initial project setup and planning. Review project requirements and establish baseline."
                            .to_string(),
                    ),
                    items: vec![
                        ItemInfo {
                            id: ItemId::new("WFI1"),
                            name: "Initial Project Review".to_string(),
                        },
                        ItemInfo {
                            id: ItemId::new("WFI2"),
                            name: "Kickoff Meeting".to_string(),
                        },
                    ],
                },
                GroupTransitions {
                    approve_target: Some(GroupId::new("WFG2")),
                    send_back_targets: vec![],
                    skip_to_targets: vec![GroupId::new("WFG3")],
                },
            )
            .with_group(
                GroupInfo {
                    id: GroupId::new("WFG2"),
                    name: "Schematic Design".to_string(),
                    description: Some(
                        "Create initial design concepts. Develop architectural plans and 3D visualizations."
                            .to_string(),
                    ),
                    items: vec![
                        ItemInfo {
                            id: ItemId::new("WFI1"),
                            name: "Design Development".to_string(),
                        },
                        ItemInfo {
                            id: ItemId::new("WFI2"),
                            name: "Design Review".to_string(),
                        },
                    ],
                },
                GroupTransitions {
                    approve_target: Some(GroupId::new("WFG3")),
                    send_back_targets: vec![GroupId::new("WFG1")],
                    skip_to_targets: vec![],
                },
            )
            .with_group(
                GroupInfo {
                    id: GroupId::new("WFG3"),
                    name: "Construction Docs".to_string(),
                    description: Some(
                        "Finalize construction documentation. Complete blueprints and engineering specs."
                            .to_string(),
                    ),
                    items: vec![ItemInfo {
                        id: ItemId::new("WFI1"),
                        name: "Final Documentation".to_string(),
                    }],
                },
                GroupTransitions {
                    approve_target: Some(GroupId::end()),
                    send_back_targets: vec![GroupId::new("WFG2")],
                    skip_to_targets: vec![],
                },
            )
            .with_group(
                GroupInfo {
                    id: GroupId::end(),
                    name: "Complete".to_string(),
                    description: Some("Design & Entitlement complete.".to_string()),
                    items: vec![],
                },
                GroupTransitions::default(),
            )
            .with_legacy_alias("WFG1_ProjectKickoff", GroupId::new("WFG1"))
            .with_legacy_alias("WFG2_SchematicDesign", GroupId::new("WFG2"))
            .with_legacy_alias("WFG3_ConstructionDocs", GroupId::new("WFG3"))
    }

    /// Get group info by ID
    pub fn group(&self, id: &GroupId) -> Option<&GroupInfo> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Get item info within a group
    pub fn item(&self, group: &GroupId, item: &ItemId) -> Option<&ItemInfo> {
        self.group(group)?.items.iter().find(|i| &i.id == item)
    }

    /// All groups in directory order
    pub fn groups(&self) -> &[GroupInfo] {
        &self.groups
    }

    /// The transitions a group permits, if it is known to the directory
    pub fn transitions(&self, group: &GroupId) -> Option<&GroupTransitions> {
        self.transitions.get(group)
    }

    /// Map a raw checkpoint identifier to a position.
    ///
    /// Three naming conventions are recognized, tried in order: composite
    /// ids (`WFG1_WFI2`), call-activity ids (`WFG1_CallActivity`), and
    /// legacy full-name ids resolved through the alias table. Each parser
    /// is total; an identifier matching none of them yields `None`.
    pub fn position_of(&self, checkpoint_id: &str) -> Option<Position> {
        const PARSERS: [fn(&str, &StepDirectory) -> Option<Position>; 3] =
            [parse_composite_id, parse_call_activity_id, parse_legacy_id];

        PARSERS.iter().find_map(|parse| parse(checkpoint_id, self))
    }

    /// Render the transitions available from the given group.
    ///
    /// Unknown groups, the terminal group, and `None` all yield the empty
    /// default (nothing is possible from a finished or unknown position).
    pub fn available_transitions(&self, current: Option<&GroupId>) -> AvailableTransitions {
        let Some(current) = current else {
            return AvailableTransitions::default();
        };
        let Some(transitions) = self.transitions.get(current) else {
            return AvailableTransitions::default();
        };

        let resolve = |ids: &[GroupId]| -> Vec<GroupInfo> {
            ids.iter().filter_map(|id| self.group(id).cloned()).collect()
        };

        let approve_target = transitions
            .approve_target
            .as_ref()
            .and_then(|id| self.group(id).cloned());
        let send_back_targets = resolve(&transitions.send_back_targets);
        let skip_to_targets = resolve(&transitions.skip_to_targets);

        AvailableTransitions {
            can_approve: approve_target.is_some(),
            approve_target,
            can_send_back: !send_back_targets.is_empty(),
            send_back_targets,
            can_skip_to: !skip_to_targets.is_empty(),
            skip_to_targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_id_creation() {
        let id1 = GroupId::new("WFG1");
        let id2 = GroupId::from("WFG1");
        let id3: GroupId = "WFG1".into();

        assert_eq!(id1, id2);
        assert_eq!(id2, id3);
        assert_eq!(id1.as_str(), "WFG1");
    }

    #[test]
    fn test_group_id_try_new_empty_error() {
        assert!(GroupId::try_new("").is_err());
        assert!(GroupId::try_new("   ").is_err());
        assert!(ItemId::try_new("\t\n").is_err());
    }

    #[test]
    #[should_panic(expected = "Workflow group ID cannot be empty or whitespace only")]
    fn test_group_id_new_panics_on_empty() {
        GroupId::new("");
    }

    #[test]
    fn test_position_display() {
        let with_item = Position::new(GroupId::new("WFG1"), ItemId::new("WFI2"));
        assert_eq!(with_item.to_string(), "WFG1/WFI2");

        let group_only = Position::group_only(GroupId::new("WFG2"));
        assert_eq!(group_only.to_string(), "WFG2");
    }

    #[test]
    fn test_terminal_position() {
        let end = Position::end();
        assert!(end.is_end());
        assert_eq!(end.group.as_str(), "End");
        assert!(end.item.is_none());

        let not_end = Position::new(GroupId::new("WFG1"), ItemId::new("WFI1"));
        assert!(!not_end.is_end());
    }

    #[test]
    fn test_parse_composite_id() {
        let directory = StepDirectory::standard();
        let position = directory.position_of("WFG1_WFI2").unwrap();
        assert_eq!(position.group.as_str(), "WFG1");
        assert_eq!(position.item.unwrap().as_str(), "WFI2");
    }

    #[test]
    fn test_parse_call_activity_id() {
        let directory = StepDirectory::standard();
        let position = directory.position_of("WFG2_CallActivity").unwrap();
        assert_eq!(position.group.as_str(), "WFG2");
        assert!(position.item.is_none());
    }

    #[test]
    fn test_parse_legacy_id() {
        let directory = StepDirectory::standard();
        let position = directory.position_of("WFG1_ProjectKickoff").unwrap();
        assert_eq!(position.group.as_str(), "WFG1");
        assert!(position.item.is_none());
    }

    #[test]
    fn test_parse_unknown_id() {
        let directory = StepDirectory::standard();
        assert!(directory.position_of("gw_wfi1").is_none());
        assert!(directory.position_of("").is_none());
        assert!(directory.position_of("Totally_Unrelated").is_none());
    }

    #[test]
    fn test_all_conventions_map_to_same_shape() {
        let directory = StepDirectory::standard();
        let composite = directory.position_of("WFG1_WFI1").unwrap();
        let call_activity = directory.position_of("WFG1_CallActivity").unwrap();
        let legacy = directory.position_of("WFG1_ProjectKickoff").unwrap();

        assert_eq!(composite.group, call_activity.group);
        assert_eq!(call_activity, legacy);
    }

    #[test]
    fn test_available_transitions_first_group() {
        let directory = StepDirectory::standard();
        let transitions = directory.available_transitions(Some(&GroupId::new("WFG1")));

        assert!(transitions.can_approve);
        assert_eq!(transitions.approve_target.unwrap().id.as_str(), "WFG2");
        assert!(!transitions.can_send_back);
        assert!(transitions.can_skip_to);
        assert_eq!(transitions.skip_to_targets[0].id.as_str(), "WFG3");
    }

    #[test]
    fn test_available_transitions_middle_group() {
        let directory = StepDirectory::standard();
        let transitions = directory.available_transitions(Some(&GroupId::new("WFG2")));

        assert!(transitions.can_approve);
        assert!(transitions.can_send_back);
        assert_eq!(transitions.send_back_targets[0].id.as_str(), "WFG1");
        assert!(!transitions.can_skip_to);
    }

    #[test]
    fn test_available_transitions_terminal_and_unknown() {
        let directory = StepDirectory::standard();

        let at_end = directory.available_transitions(Some(&GroupId::end()));
        assert!(!at_end.can_approve);
        assert!(!at_end.can_send_back);
        assert!(!at_end.can_skip_to);

        let nowhere = directory.available_transitions(None);
        assert_eq!(nowhere, AvailableTransitions::default());
    }

    #[test]
    fn test_item_lookup() {
        let directory = StepDirectory::standard();
        let item = directory
            .item(&GroupId::new("WFG2"), &ItemId::new("WFI1"))
            .unwrap();
        assert_eq!(item.name, "Design Development");

        assert!(directory
            .item(&GroupId::new("WFG3"), &ItemId::new("WFI2"))
            .is_none());
    }
}
