//! The decision protocol resolving a paused checkpoint
//!
//! Decisions are modeled as a closed tagged-variant type with one variant
//! per action, each carrying exactly the fields it requires, so invalid
//! combinations (a send-back without a reason, a skip without a target)
//! are unrepresentable. The serde-facing [`DecisionRequest`] is the seam
//! where a raw request is validated into a [`Decision`].

use crate::cursor::CheckpointData;
use crate::error::StagegateError;
use crate::position::{GroupId, ItemId};
use serde::{Deserialize, Serialize};

/// The four actions that can resolve a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    /// Advance along the default outgoing edge
    Approve,
    /// Route backward to an earlier group or item
    SendBack,
    /// Route forward past intervening checkpoints
    SkipTo,
    /// Mark the remaining items in the current group satisfied
    CompleteWfg,
}

impl DecisionAction {
    /// Get the wire representation of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "approve",
            DecisionAction::SendBack => "send_back",
            DecisionAction::SkipTo => "skip_to",
            DecisionAction::CompleteWfg => "complete_wfg",
        }
    }
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a send-back decision routes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBackTarget {
    /// Back to an earlier workflow group
    Group(GroupId),
    /// Back to an earlier item within the current group
    Item(ItemId),
}

/// A validated decision against the currently paused checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Approve the checkpoint and move forward
    Approve,
    /// Send the project back, with a mandatory reason
    SendBack {
        /// Target group or item
        target: SendBackTarget,
        /// Why the project was sent back
        reason: String,
    },
    /// Skip forward to a future group
    SkipTo {
        /// Target group
        group: GroupId,
    },
    /// Complete the current group, skipping its remaining items
    CompleteWfg,
}

impl Decision {
    /// The action this decision performs
    pub fn action(&self) -> DecisionAction {
        match self {
            Decision::Approve => DecisionAction::Approve,
            Decision::SendBack { .. } => DecisionAction::SendBack,
            Decision::SkipTo { .. } => DecisionAction::SkipTo,
            Decision::CompleteWfg => DecisionAction::CompleteWfg,
        }
    }

    /// The reason attached to this decision, if the action carries one
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::SendBack { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// The resolution data this decision writes onto the checkpoint.
    ///
    /// Gateway conditions downstream are evaluated against exactly these
    /// keys.
    pub(crate) fn checkpoint_data(&self) -> CheckpointData {
        let mut data = CheckpointData {
            action: Some(self.action()),
            ..CheckpointData::default()
        };
        match self {
            Decision::Approve | Decision::CompleteWfg => {}
            Decision::SendBack { target, .. } => match target {
                SendBackTarget::Group(group) => data.target_group = Some(group.clone()),
                SendBackTarget::Item(item) => data.target_item = Some(item.clone()),
            },
            Decision::SkipTo { group } => data.target_group = Some(group.clone()),
        }
        data
    }
}

/// A raw, unvalidated decision request as submitted by a caller.
///
/// Convert into a [`Decision`] with `try_into()`; conversion fails with
/// `InvalidDecisionRequest` before any state is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Requested action
    pub action: DecisionAction,
    /// Target group for send_back/skip_to at group level
    #[serde(default)]
    pub target_group: Option<GroupId>,
    /// Target item for send_back within the current group
    #[serde(default)]
    pub target_item: Option<ItemId>,
    /// Reason for the decision (required for send_back)
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<DecisionRequest> for Decision {
    type Error = StagegateError;

    fn try_from(request: DecisionRequest) -> Result<Self, Self::Error> {
        match request.action {
            DecisionAction::Approve => Ok(Decision::Approve),
            DecisionAction::CompleteWfg => Ok(Decision::CompleteWfg),
            DecisionAction::SkipTo => {
                let group = request.target_group.ok_or_else(|| {
                    StagegateError::InvalidDecisionRequest(
                        "target_group is required for skip_to".to_string(),
                    )
                })?;
                Ok(Decision::SkipTo { group })
            }
            DecisionAction::SendBack => {
                let reason = request
                    .reason
                    .filter(|reason| !reason.trim().is_empty())
                    .ok_or_else(|| {
                        StagegateError::InvalidDecisionRequest(
                            "reason is required for send_back".to_string(),
                        )
                    })?;
                // A group-level target takes precedence when both are given.
                let target = match (request.target_group, request.target_item) {
                    (Some(group), _) => SendBackTarget::Group(group),
                    (None, Some(item)) => SendBackTarget::Item(item),
                    (None, None) => {
                        return Err(StagegateError::InvalidDecisionRequest(
                            "either target_group or target_item is required for send_back"
                                .to_string(),
                        ))
                    }
                };
                Ok(Decision::SendBack { target, reason })
            }
        }
    }
}
