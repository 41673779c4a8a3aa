//! Execution cursors and their durable encoding
//!
//! A cursor is the serializable snapshot of one in-progress execution:
//! the frame stack locating the token in the (possibly nested) graph, the
//! resolution data of the most recently completed checkpoint, and the
//! trail of resolved checkpoints. All engine calls are cursor-in /
//! cursor-out; nothing engine-side outlives a request.
//!
//! The codec wraps the cursor in a schema-tagged envelope so the encoding
//! can evolve without breaking previously persisted instances. The encoded
//! document is opaque to every collaborator outside this module and the
//! engine.

use crate::decision::DecisionAction;
use crate::error::{Result, StagegateError};
use crate::graph::{NodeId, ProcessId};
use crate::position::{GroupId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current encoding format written by [`CursorCodec::encode`]
pub const CURSOR_FORMAT_VERSION: u32 = 1;

/// Status of a stored execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Paused at a checkpoint, waiting for a decision
    Running,
    /// The end node was reached; no further decisions are accepted
    Completed,
}

/// Resolution data written onto a checkpoint by a decision.
///
/// Gateway edge conditions are evaluated against these keys.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckpointData {
    /// The action that resolved the checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<DecisionAction>,
    /// Group-level routing target, when the action carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<GroupId>,
    /// Item-level routing target, when the action carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_item: Option<ItemId>,
}

impl CheckpointData {
    /// Whether no checkpoint has been resolved yet
    pub fn is_empty(&self) -> bool {
        self.action.is_none() && self.target_group.is_none() && self.target_item.is_none()
    }
}

/// One level of the cursor's frame stack: a process and the node the
/// token currently sits on within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// The process this frame executes
    pub process: ProcessId,
    /// The node the token currently sits on
    pub node: NodeId,
}

/// A resolved checkpoint recorded on the cursor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailRecord {
    /// The checkpoint that was resolved
    pub checkpoint: NodeId,
    /// The data it was resolved with
    pub data: CheckpointData,
    /// When it was resolved
    pub at: DateTime<Utc>,
}

/// The serializable snapshot of an in-progress execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionCursor {
    /// Frame stack; the last entry is the innermost process
    pub(crate) frames: Vec<Frame>,
    /// Resolution data of the most recently completed checkpoint
    pub(crate) resolution: CheckpointData,
    /// Resolved checkpoints in order
    pub(crate) trail: Vec<TrailRecord>,
}

impl ExecutionCursor {
    /// Create a cursor positioned at the start node of the given process
    pub(crate) fn at_start(process: ProcessId, start: NodeId) -> Self {
        Self {
            frames: vec![Frame {
                process,
                node: start,
            }],
            resolution: CheckpointData::default(),
            trail: Vec::new(),
        }
    }

    /// Whether the execution has reached its end node
    pub fn is_completed(&self) -> bool {
        self.frames.is_empty()
    }

    /// The node the token currently sits on, if the execution is not complete
    pub fn current_node(&self) -> Option<&NodeId> {
        self.frames.last().map(|frame| &frame.node)
    }

    /// Resolved checkpoints in order
    pub fn trail(&self) -> &[TrailRecord] {
        &self.trail
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorEnvelope {
    format: u32,
    cursor: ExecutionCursor,
}

/// Encodes cursors to storable documents and back
pub struct CursorCodec;

impl CursorCodec {
    /// Serialize a cursor into an opaque, schema-tagged document
    pub fn encode(cursor: &ExecutionCursor) -> Result<serde_json::Value> {
        let envelope = CursorEnvelope {
            format: CURSOR_FORMAT_VERSION,
            cursor: cursor.clone(),
        };
        Ok(serde_json::to_value(envelope)?)
    }

    /// Deserialize a document previously produced by [`Self::encode`]
    pub fn decode(document: &serde_json::Value) -> Result<ExecutionCursor> {
        let envelope: CursorEnvelope = serde_json::from_value(document.clone())?;
        if envelope.format != CURSOR_FORMAT_VERSION {
            return Err(StagegateError::UnsupportedCursorFormat {
                found: envelope.format,
            });
        }
        Ok(envelope.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_cursor() -> ExecutionCursor {
        let mut cursor = ExecutionCursor::at_start(
            ProcessId::new("DesignEntitlement"),
            NodeId::new("start"),
        );
        cursor.frames.push(Frame {
            process: ProcessId::new("WFG1_ProjectKickoff"),
            node: NodeId::new("WFG1_WFI2"),
        });
        cursor.resolution = CheckpointData {
            action: Some(DecisionAction::Approve),
            target_group: None,
            target_item: None,
        };
        cursor.trail.push(TrailRecord {
            checkpoint: NodeId::new("WFG1_WFI1"),
            data: cursor.resolution.clone(),
            at: Utc::now(),
        });
        cursor
    }

    #[test]
    fn test_round_trip_preserves_cursor() {
        let cursor = sample_cursor();
        let document = CursorCodec::encode(&cursor).unwrap();
        let decoded = CursorCodec::decode(&document).unwrap();
        assert_eq!(cursor, decoded);
    }

    #[test]
    fn test_encoded_document_is_schema_tagged() {
        let document = CursorCodec::encode(&sample_cursor()).unwrap();
        assert_eq!(
            document.get("format").and_then(|v| v.as_u64()),
            Some(CURSOR_FORMAT_VERSION as u64)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_format() {
        let mut document = CursorCodec::encode(&sample_cursor()).unwrap();
        document["format"] = serde_json::json!(99);

        let result = CursorCodec::decode(&document);
        assert!(matches!(
            result,
            Err(StagegateError::UnsupportedCursorFormat { found: 99 })
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let garbage = serde_json::json!({ "not": "a cursor" });
        assert!(CursorCodec::decode(&garbage).is_err());
    }

    #[test]
    fn test_completion_is_empty_frame_stack() {
        let mut cursor = sample_cursor();
        assert!(!cursor.is_completed());
        assert_eq!(cursor.current_node().unwrap().as_str(), "WFG1_WFI2");

        cursor.frames.clear();
        assert!(cursor.is_completed());
        assert!(cursor.current_node().is_none());
    }

    fn arb_action() -> impl Strategy<Value = Option<DecisionAction>> {
        prop_oneof![
            Just(None),
            Just(Some(DecisionAction::Approve)),
            Just(Some(DecisionAction::SendBack)),
            Just(Some(DecisionAction::SkipTo)),
            Just(Some(DecisionAction::CompleteWfg)),
        ]
    }

    proptest! {
        // Round-trip law: decoding an encoded cursor reproduces it exactly,
        // including in-flight checkpoint data.
        #[test]
        fn prop_round_trip(
            action in arb_action(),
            group in proptest::option::of("[A-Z]{3}[0-9]{1,2}"),
            item in proptest::option::of("WFI[0-9]{1,2}"),
            frames in proptest::collection::vec(("[A-Za-z]{1,12}", "[A-Za-z0-9_]{1,16}"), 1..4),
        ) {
            let cursor = ExecutionCursor {
                frames: frames
                    .into_iter()
                    .map(|(process, node)| Frame {
                        process: ProcessId::new(process),
                        node: NodeId::new(node),
                    })
                    .collect(),
                resolution: CheckpointData {
                    action,
                    target_group: group.map(GroupId::new),
                    target_item: item.map(ItemId::new),
                },
                trail: Vec::new(),
            };

            let decoded = CursorCodec::decode(&CursorCodec::encode(&cursor).unwrap()).unwrap();
            prop_assert_eq!(cursor, decoded);
        }
    }
}
