//! Deterministic token-passing over a compiled process graph
//!
//! The engine is stateless: it borrows a compiled graph and operates on a
//! caller-supplied cursor, running every node that requires no human input
//! until exactly one ready checkpoint remains or the end node is reached.
//! It is designed to be invoked once per external decision, never as a
//! background scheduler.

use crate::cursor::{CheckpointData, ExecutionCursor, Frame, TrailRecord};
use crate::graph::{CompiledNodeKind, CompiledProcess, NodeId, ProcessGraph, ProcessId};
use thiserror::Error;

/// Maximum number of automatic steps allowed in a single engine call
pub const MAX_ENGINE_STEPS: usize = 1000;

/// Errors that can occur during engine execution.
///
/// With a graph produced by [`ProcessGraph::compile`] these are
/// unreachable; they exist so a hand-built or corrupted graph fails the
/// request instead of looping or panicking.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Cursor references a process missing from the graph
    #[error("Process not found in graph: {0}")]
    ProcessNotFound(ProcessId),
    /// Cursor references a node missing from its process
    #[error("Node not found in process '{process}': {node}")]
    NodeNotFound {
        /// The process searched
        process: ProcessId,
        /// The missing node
        node: NodeId,
    },
    /// A node that must hand the token onward has no outgoing flow
    #[error("Node '{0}' has no outgoing flow")]
    MissingFlow(NodeId),
    /// `resolve` was called while no checkpoint is ready
    #[error("No checkpoint is ready")]
    NoReadyCheckpoint,
    /// Automatic execution did not settle within the step limit
    #[error("Maximum engine step limit of {limit} exceeded")]
    StepLimitExceeded {
        /// The limit that was exceeded
        limit: usize,
    },
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Where an engine call left the execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// Paused at a ready human checkpoint
    AtCheckpoint(NodeId),
    /// The root process reached its end node
    Completed,
}

/// Token-passing engine over one compiled graph.
///
/// Holds no state of its own across calls; every call is cursor-in /
/// cursor-out.
pub struct ExecutionEngine<'g> {
    graph: &'g ProcessGraph,
}

impl<'g> ExecutionEngine<'g> {
    /// Create an engine for the given graph
    pub fn new(graph: &'g ProcessGraph) -> Self {
        Self { graph }
    }

    /// Create a cursor for a fresh execution and advance it to the first
    /// ready checkpoint.
    pub fn start(&self) -> EngineResult<(ExecutionCursor, EngineOutcome)> {
        let root = self.graph.root().clone();
        let process = self.process(&root)?;
        let mut cursor = ExecutionCursor::at_start(root, process.start.clone());
        let outcome = self.advance(&mut cursor)?;
        Ok((cursor, outcome))
    }

    /// Run automatic nodes until a ready checkpoint or completion.
    pub fn advance(&self, cursor: &mut ExecutionCursor) -> EngineResult<EngineOutcome> {
        for _ in 0..MAX_ENGINE_STEPS {
            let Some(frame) = cursor.frames.last() else {
                return Ok(EngineOutcome::Completed);
            };
            let process = self.process(&frame.process)?;
            let node = process
                .node(&frame.node)
                .ok_or_else(|| EngineError::NodeNotFound {
                    process: frame.process.clone(),
                    node: frame.node.clone(),
                })?;
            tracing::debug!(process = %frame.process, node = %frame.node, "engine step");

            match &node.kind {
                CompiledNodeKind::UserTask => {
                    return Ok(EngineOutcome::AtCheckpoint(node.id.clone()));
                }
                CompiledNodeKind::Start => {
                    let next = single_flow_target(process, &node.id)?;
                    cursor.frames.last_mut().expect("frame exists").node = next;
                }
                CompiledNodeKind::Gateway => {
                    let next = self.route_gateway(process, &node.id, &cursor.resolution)?;
                    cursor.frames.last_mut().expect("frame exists").node = next;
                }
                CompiledNodeKind::CallActivity(called) => {
                    // Position the parent past the call activity before
                    // pushing, so popping the subprocess frame resumes at
                    // the node after it.
                    let resume_at = single_flow_target(process, &node.id)?;
                    let called = called.clone();
                    let sub_start = self.process(&called)?.start.clone();
                    cursor.frames.last_mut().expect("frame exists").node = resume_at;
                    cursor.frames.push(Frame {
                        process: called,
                        node: sub_start,
                    });
                }
                CompiledNodeKind::End => {
                    cursor.frames.pop();
                    if cursor.frames.is_empty() {
                        tracing::debug!("end node of root process reached");
                        return Ok(EngineOutcome::Completed);
                    }
                }
            }
        }

        Err(EngineError::StepLimitExceeded {
            limit: MAX_ENGINE_STEPS,
        })
    }

    /// Write resolution data onto the currently ready checkpoint and
    /// advance to the next one (or completion).
    pub fn resolve(
        &self,
        cursor: &mut ExecutionCursor,
        data: CheckpointData,
    ) -> EngineResult<EngineOutcome> {
        let frame = cursor.frames.last().ok_or(EngineError::NoReadyCheckpoint)?;
        let process = self.process(&frame.process)?;
        let node = process
            .node(&frame.node)
            .ok_or_else(|| EngineError::NodeNotFound {
                process: frame.process.clone(),
                node: frame.node.clone(),
            })?;
        if !matches!(node.kind, CompiledNodeKind::UserTask) {
            return Err(EngineError::NoReadyCheckpoint);
        }

        cursor.trail.push(TrailRecord {
            checkpoint: node.id.clone(),
            data: data.clone(),
            at: chrono::Utc::now(),
        });
        cursor.resolution = data;

        let next = single_flow_target(process, &node.id)?;
        cursor.frames.last_mut().expect("frame exists").node = next;

        self.advance(cursor)
    }

    fn process(&self, id: &ProcessId) -> EngineResult<&'g CompiledProcess> {
        self.graph
            .process(id)
            .ok_or_else(|| EngineError::ProcessNotFound(id.clone()))
    }

    /// Evaluate a gateway: the first conditioned flow (in document order)
    /// whose condition matches the resolution data wins, otherwise the
    /// default flow is taken.
    fn route_gateway(
        &self,
        process: &CompiledProcess,
        gateway: &NodeId,
        resolution: &CheckpointData,
    ) -> EngineResult<NodeId> {
        let flows = process.flows_from(gateway);
        let chosen = flows
            .iter()
            .filter(|flow| flow.condition.is_some())
            .find(|flow| {
                flow.condition
                    .as_ref()
                    .is_some_and(|condition| condition.matches(resolution))
            })
            .or_else(|| flows.iter().find(|flow| flow.condition.is_none()))
            .ok_or_else(|| EngineError::MissingFlow(gateway.clone()))?;

        tracing::debug!(gateway = %gateway, to = %chosen.to, "gateway routed");
        Ok(chosen.to.clone())
    }
}

fn single_flow_target(process: &CompiledProcess, node: &NodeId) -> EngineResult<NodeId> {
    process
        .flows_from(node)
        .first()
        .map(|flow| flow.to.clone())
        .ok_or_else(|| EngineError::MissingFlow(node.clone()))
}
