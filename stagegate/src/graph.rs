//! Compiled process graphs and document validation
//!
//! Compilation turns a parsed [`ProcessDocument`] into an immutable
//! directed graph the engine can walk. It is pure and side-effect-free:
//! either every structural problem in the document is reported at once,
//! or a graph is produced that the engine can traverse without hitting a
//! structural error at runtime.

use crate::document::{FlowSpec, NodeKind, ProcessDocument, ProcessSpec};
use crate::error::{Result, StagegateError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Errors that can occur when creating graph-related types
#[derive(Debug, Error)]
pub enum GraphIdError {
    /// Process ID cannot be empty or whitespace only
    #[error("Process ID cannot be empty or whitespace only")]
    EmptyProcessId,
    /// Node ID cannot be empty or whitespace only
    #[error("Node ID cannot be empty or whitespace only")]
    EmptyNodeId,
}

/// Unique identifier for a process within a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessId(String);

impl ProcessId {
    /// Create a new process ID
    ///
    /// # Panics
    /// Panics if the ID is empty or whitespace only. For non-panicking
    /// creation, use `try_new` instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("Process ID cannot be empty or whitespace only")
    }

    /// Create a new process ID, returning an error for invalid input
    pub fn try_new(id: impl Into<String>) -> std::result::Result<Self, GraphIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GraphIdError::EmptyProcessId);
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a node within a process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node ID
    ///
    /// # Panics
    /// Panics if the ID is empty or whitespace only. For non-panicking
    /// creation, use `try_new` instead.
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("Node ID cannot be empty or whitespace only")
    }

    /// Create a new node ID, returning an error for invalid input
    pub fn try_new(id: impl Into<String>) -> std::result::Result<Self, GraphIdError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GraphIdError::EmptyNodeId);
        }
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compiled node
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    /// Node identifier
    pub id: NodeId,
    /// Optional display name
    pub name: Option<String>,
    /// Node behavior
    pub kind: CompiledNodeKind,
}

/// Behavior of a compiled node
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledNodeKind {
    /// Token entry point
    Start,
    /// Token exit point
    End,
    /// Human checkpoint
    UserTask,
    /// Automatic routing point
    Gateway,
    /// Nested subgraph reference
    CallActivity(ProcessId),
}

/// A compiled outgoing flow
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFlow {
    /// Target node
    pub to: NodeId,
    /// Guard condition; `None` marks the default/fallthrough flow
    pub condition: Option<crate::document::FlowCondition>,
}

/// One compiled process: its nodes and outgoing flows in document order
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProcess {
    /// Process identifier
    pub id: ProcessId,
    /// The single start node
    pub start: NodeId,
    nodes: HashMap<NodeId, CompiledNode>,
    outgoing: HashMap<NodeId, Vec<CompiledFlow>>,
}

impl CompiledProcess {
    /// Look up a node by id
    pub fn node(&self, id: &NodeId) -> Option<&CompiledNode> {
        self.nodes.get(id)
    }

    /// Outgoing flows of a node, in document order
    pub fn flows_from(&self, id: &NodeId) -> &[CompiledFlow] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A fully compiled definition: the root process plus every process it
/// can reach through call activities.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessGraph {
    root: ProcessId,
    processes: HashMap<ProcessId, CompiledProcess>,
}

impl ProcessGraph {
    /// Compile a document, rooting execution at `root`.
    ///
    /// Fails with `DefinitionInvalid` carrying every structural problem
    /// found; a successful compile guarantees the engine's traversal
    /// invariants (single start, one default flow per gateway, single
    /// outgoing flow elsewhere, no call-activity recursion).
    pub fn compile(document: &ProcessDocument, root: &ProcessId) -> Result<Self> {
        let (errors, _warnings) = validate_structure(document, Some(root.as_str()));
        if !errors.is_empty() {
            return Err(StagegateError::DefinitionInvalid { errors });
        }

        let mut processes = HashMap::new();
        for spec in &document.processes {
            processes.insert(ProcessId::new(&spec.id), compile_process(spec));
        }

        Ok(Self {
            root: root.clone(),
            processes,
        })
    }

    /// The root process
    pub fn root(&self) -> &ProcessId {
        &self.root
    }

    /// Look up a compiled process by id
    pub fn process(&self, id: &ProcessId) -> Option<&CompiledProcess> {
        self.processes.get(id)
    }
}

fn compile_process(spec: &ProcessSpec) -> CompiledProcess {
    let mut nodes = HashMap::new();
    let mut start = None;
    for node in &spec.nodes {
        let id = NodeId::new(&node.id);
        let kind = match node.kind {
            NodeKind::Start => {
                start = Some(id.clone());
                CompiledNodeKind::Start
            }
            NodeKind::End => CompiledNodeKind::End,
            NodeKind::UserTask => CompiledNodeKind::UserTask,
            NodeKind::Gateway => CompiledNodeKind::Gateway,
            NodeKind::CallActivity => CompiledNodeKind::CallActivity(ProcessId::new(
                node.calls.as_deref().unwrap_or_default(),
            )),
        };
        nodes.insert(
            id.clone(),
            CompiledNode {
                id,
                name: node.name.clone(),
                kind,
            },
        );
    }

    let mut outgoing: HashMap<NodeId, Vec<CompiledFlow>> = HashMap::new();
    for flow in &spec.flows {
        outgoing
            .entry(NodeId::new(&flow.from))
            .or_default()
            .push(CompiledFlow {
                to: NodeId::new(&flow.to),
                condition: flow.when.clone(),
            });
    }

    CompiledProcess {
        id: ProcessId::new(&spec.id),
        // Validated: exactly one start node exists.
        start: start.unwrap_or_else(|| NodeId::new("start")),
        nodes,
        outgoing,
    }
}

/// Outcome of validating a document without creating an execution cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValidation {
    /// Whether the document can be compiled
    pub valid: bool,
    /// Structural and syntax problems; non-empty whenever `valid` is false
    pub errors: Vec<String>,
    /// Every process id declared by the document
    pub discovered_process_ids: Vec<String>,
    /// Non-fatal observations (e.g. unreachable nodes)
    pub warnings: Vec<String>,
}

/// Validate a document text without compiling it into a runnable graph.
///
/// Never raises: malformed input yields `valid = false` with at least one
/// error. When `expected_process` is given, the document must declare it
/// and the call-activity closure rooted there must be acyclic.
pub fn validate_document(text: &str, expected_process: Option<&str>) -> DocumentValidation {
    let document = match ProcessDocument::parse(text) {
        Ok(document) => document,
        Err(message) => {
            return DocumentValidation {
                valid: false,
                errors: vec![message],
                discovered_process_ids: Vec::new(),
                warnings: Vec::new(),
            }
        }
    };

    let discovered_process_ids: Vec<String> =
        document.processes.iter().map(|p| p.id.clone()).collect();
    let (errors, warnings) = validate_structure(&document, expected_process);

    DocumentValidation {
        valid: errors.is_empty(),
        errors,
        discovered_process_ids,
        warnings,
    }
}

/// Structural validation shared by compilation and the validation-only
/// entry point. Returns every error and warning found.
fn validate_structure(
    document: &ProcessDocument,
    root: Option<&str>,
) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if document.processes.is_empty() {
        errors.push("Document declares no processes".to_string());
        return (errors, warnings);
    }

    let mut process_ids = HashSet::new();
    for spec in &document.processes {
        if spec.id.trim().is_empty() {
            errors.push("Process declared with an empty id".to_string());
        }
        if !process_ids.insert(spec.id.as_str()) {
            errors.push(format!("Duplicate process id: '{}'", spec.id));
        }
    }

    for spec in &document.processes {
        validate_process(spec, &process_ids, &mut errors, &mut warnings);
    }

    if let Some(root) = root {
        if !process_ids.contains(root) {
            let mut available: Vec<&str> = process_ids.iter().copied().collect();
            available.sort_unstable();
            errors.push(format!(
                "Process '{}' not found in document. Available processes: {:?}",
                root, available
            ));
        } else {
            check_call_recursion(document, root, &mut errors);
        }
    }

    (errors, warnings)
}

fn validate_process(
    spec: &ProcessSpec,
    known_processes: &HashSet<&str>,
    errors: &mut Vec<String>,
    warnings: &mut Vec<String>,
) {
    let mut node_ids = HashSet::new();
    let mut start_count = 0usize;
    let mut end_count = 0usize;

    for node in &spec.nodes {
        if node.id.trim().is_empty() {
            errors.push(format!(
                "Process '{}' declares a node with an empty id",
                spec.id
            ));
        }
        if !node_ids.insert(node.id.as_str()) {
            errors.push(format!(
                "Process '{}' declares duplicate node id: '{}'",
                spec.id, node.id
            ));
        }
        match node.kind {
            NodeKind::Start => start_count += 1,
            NodeKind::End => end_count += 1,
            NodeKind::CallActivity => match node.calls.as_deref() {
                None | Some("") => errors.push(format!(
                    "Call activity '{}' in process '{}' does not declare which process it calls",
                    node.id, spec.id
                )),
                Some(target) if !known_processes.contains(target) => errors.push(format!(
                    "Call activity '{}' in process '{}' references missing process: '{}'",
                    node.id, spec.id, target
                )),
                Some(_) => {}
            },
            _ => {}
        }
        if node.kind != NodeKind::CallActivity && node.calls.is_some() {
            errors.push(format!(
                "Node '{}' in process '{}' is not a call activity but declares 'calls'",
                node.id, spec.id
            ));
        }
    }

    if start_count != 1 {
        errors.push(format!(
            "Process '{}' must declare exactly one start node, found {}",
            spec.id, start_count
        ));
    }
    if end_count == 0 {
        errors.push(format!(
            "Process '{}' must declare at least one end node",
            spec.id
        ));
    }

    let mut outgoing: HashMap<&str, Vec<&FlowSpec>> = HashMap::new();
    for flow in &spec.flows {
        if !node_ids.contains(flow.from.as_str()) {
            errors.push(format!(
                "Flow in process '{}' references non-existent source node: '{}'",
                spec.id, flow.from
            ));
        }
        if !node_ids.contains(flow.to.as_str()) {
            errors.push(format!(
                "Flow in process '{}' references non-existent target node: '{}'",
                spec.id, flow.to
            ));
        }
        outgoing.entry(flow.from.as_str()).or_default().push(flow);
    }

    for node in &spec.nodes {
        let flows = outgoing.get(node.id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        match node.kind {
            NodeKind::End => {
                if !flows.is_empty() {
                    errors.push(format!(
                        "End node '{}' in process '{}' must not have outgoing flows",
                        node.id, spec.id
                    ));
                }
            }
            NodeKind::Gateway => {
                if flows.is_empty() {
                    errors.push(format!(
                        "Gateway '{}' in process '{}' has no outgoing flows",
                        node.id, spec.id
                    ));
                }
                let defaults = flows.iter().filter(|f| f.when.is_none()).count();
                if defaults != 1 {
                    errors.push(format!(
                        "Gateway '{}' in process '{}' must have exactly one default flow, found {}",
                        node.id, spec.id, defaults
                    ));
                }
            }
            // Start, user tasks, and call activities each hand the token
            // to exactly one successor; this is what guarantees a single
            // ready checkpoint at any time.
            NodeKind::Start | NodeKind::UserTask | NodeKind::CallActivity => {
                if flows.len() != 1 {
                    errors.push(format!(
                        "Node '{}' in process '{}' must have exactly one outgoing flow, found {}",
                        node.id, spec.id, flows.len()
                    ));
                }
                if flows.iter().any(|f| f.when.is_some()) {
                    errors.push(format!(
                        "Only gateway flows may carry a condition; node '{}' in process '{}' has a conditioned flow",
                        node.id, spec.id
                    ));
                }
            }
        }
    }

    // Reachability from the start node; unreachable nodes are suspicious
    // but not fatal.
    if start_count == 1 {
        let start = spec
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::Start)
            .map(|n| n.id.as_str())
            .unwrap_or_default();
        let mut reachable = HashSet::new();
        let mut to_visit = VecDeque::new();
        to_visit.push_back(start);
        while let Some(node) = to_visit.pop_front() {
            if !reachable.insert(node) {
                continue;
            }
            for flow in outgoing.get(node).map(Vec::as_slice).unwrap_or(&[]) {
                to_visit.push_back(flow.to.as_str());
            }
        }
        for node in &spec.nodes {
            if !reachable.contains(node.id.as_str()) {
                warnings.push(format!(
                    "Node '{}' in process '{}' is unreachable from the start node",
                    node.id, spec.id
                ));
            }
        }
    }
}

/// Reject documents whose call activities form a cycle reachable from the
/// root: such a definition could never terminate.
fn check_call_recursion(document: &ProcessDocument, root: &str, errors: &mut Vec<String>) {
    fn visit<'a>(
        document: &'a ProcessDocument,
        process: &'a str,
        on_path: &mut Vec<&'a str>,
        errors: &mut Vec<String>,
    ) {
        if on_path.contains(&process) {
            let mut cycle = on_path.clone();
            cycle.push(process);
            errors.push(format!(
                "Call activities form a cycle: {}",
                cycle.join(" -> ")
            ));
            return;
        }
        on_path.push(process);
        let calls: Vec<&str> = document
            .processes
            .iter()
            .find(|p| p.id == process)
            .map(|p| {
                p.nodes
                    .iter()
                    .filter(|n| n.kind == NodeKind::CallActivity)
                    .filter_map(|n| n.calls.as_deref())
                    .collect()
            })
            .unwrap_or_default();
        for called in calls {
            visit(document, called, on_path, errors);
        }
        on_path.pop();
    }

    let mut on_path = Vec::new();
    visit(document, root, &mut on_path, errors);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SAMPLE_DOCUMENT;

    #[test]
    fn test_compile_sample_document() {
        let document = ProcessDocument::parse(SAMPLE_DOCUMENT).unwrap();
        let graph = ProcessGraph::compile(&document, &ProcessId::new("DesignEntitlement")).unwrap();

        assert_eq!(graph.root().as_str(), "DesignEntitlement");
        let root = graph.process(graph.root()).unwrap();
        assert_eq!(root.start.as_str(), "start");
        assert!(matches!(
            root.node(&NodeId::new("WFG1_CallActivity")).unwrap().kind,
            CompiledNodeKind::CallActivity(_)
        ));

        let kickoff = graph.process(&ProcessId::new("WFG1_ProjectKickoff")).unwrap();
        assert!(matches!(
            kickoff.node(&NodeId::new("WFG1_WFI1")).unwrap().kind,
            CompiledNodeKind::UserTask
        ));
    }

    #[test]
    fn test_compile_missing_root_lists_available() {
        let document = ProcessDocument::parse(SAMPLE_DOCUMENT).unwrap();
        let result = ProcessGraph::compile(&document, &ProcessId::new("Nonexistent"));

        match result {
            Err(StagegateError::DefinitionInvalid { errors }) => {
                assert!(errors[0].contains("'Nonexistent' not found"));
                assert!(errors[0].contains("DesignEntitlement"));
            }
            other => panic!("expected DefinitionInvalid, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_document_valid() {
        let validation = validate_document(SAMPLE_DOCUMENT, Some("DesignEntitlement"));

        assert!(validation.valid, "unexpected errors: {:?}", validation.errors);
        assert_eq!(validation.discovered_process_ids.len(), 4);
        assert!(validation
            .discovered_process_ids
            .contains(&"WFG2_SchematicDesign".to_string()));
    }

    #[test]
    fn test_validate_document_malformed_never_raises() {
        let validation = validate_document("definitely: [not a document", None);
        assert!(!validation.valid);
        assert!(!validation.errors.is_empty());
        assert!(validation.discovered_process_ids.is_empty());
    }

    #[test]
    fn test_validate_document_without_expected_process() {
        let validation = validate_document(SAMPLE_DOCUMENT, None);
        assert!(validation.valid);
        assert_eq!(validation.discovered_process_ids.len(), 4);
    }

    #[test]
    fn test_missing_call_target_is_an_error() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: start, kind: start }
      - { id: group, kind: call-activity, calls: Missing }
      - { id: end, kind: end }
    flows:
      - { from: start, to: group }
      - { from: group, to: end }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(!validation.valid);
        assert!(validation
            .errors
            .iter()
            .any(|e| e.contains("references missing process: 'Missing'")));
    }

    #[test]
    fn test_gateway_without_default_is_an_error() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: start, kind: start }
      - { id: task, kind: user-task }
      - { id: gw, kind: gateway }
      - { id: end, kind: end }
    flows:
      - { from: start, to: task }
      - { from: task, to: gw }
      - { from: gw, to: end, when: { action: approve } }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(!validation.valid);
        assert!(validation
            .errors
            .iter()
            .any(|e| e.contains("exactly one default flow")));
    }

    #[test]
    fn test_user_task_with_two_outgoing_flows_is_an_error() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: start, kind: start }
      - { id: task, kind: user-task }
      - { id: end, kind: end }
    flows:
      - { from: start, to: task }
      - { from: task, to: end }
      - { from: task, to: start }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(!validation.valid);
        assert!(validation
            .errors
            .iter()
            .any(|e| e.contains("exactly one outgoing flow, found 2")));
    }

    #[test]
    fn test_call_activity_cycle_is_an_error() {
        let text = r#"
processes:
  - id: A
    nodes:
      - { id: start, kind: start }
      - { id: call_b, kind: call-activity, calls: B }
      - { id: end, kind: end }
    flows:
      - { from: start, to: call_b }
      - { from: call_b, to: end }
  - id: B
    nodes:
      - { id: start, kind: start }
      - { id: call_a, kind: call-activity, calls: A }
      - { id: end, kind: end }
    flows:
      - { from: start, to: call_a }
      - { from: call_a, to: end }
"#;
        let validation = validate_document(text, Some("A"));
        assert!(!validation.valid);
        assert!(validation
            .errors
            .iter()
            .any(|e| e.contains("Call activities form a cycle")));
    }

    #[test]
    fn test_unreachable_node_is_a_warning() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: start, kind: start }
      - { id: task, kind: user-task }
      - { id: orphan, kind: user-task }
      - { id: end, kind: end }
    flows:
      - { from: start, to: task }
      - { from: task, to: end }
      - { from: orphan, to: end }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(validation.valid);
        assert!(validation
            .warnings
            .iter()
            .any(|w| w.contains("'orphan'") && w.contains("unreachable")));
    }

    #[test]
    fn test_duplicate_node_id_is_an_error() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: start, kind: start }
      - { id: task, kind: user-task }
      - { id: task, kind: user-task }
      - { id: end, kind: end }
    flows:
      - { from: start, to: task }
      - { from: task, to: end }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(!validation.valid);
        assert!(validation
            .errors
            .iter()
            .any(|e| e.contains("duplicate node id: 'task'")));
    }

    #[test]
    fn test_errors_are_collected_not_short_circuited() {
        let text = r#"
processes:
  - id: Root
    nodes:
      - { id: task, kind: user-task }
    flows:
      - { from: task, to: ghost }
"#;
        let validation = validate_document(text, Some("Root"));
        assert!(!validation.valid);
        // Missing start, missing end, and a dangling flow target all at once.
        assert!(validation.errors.len() >= 3);
    }
}
