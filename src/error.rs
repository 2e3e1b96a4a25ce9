use crate::action::ActionKind;
use crate::model::NodeId;
use crate::mutation::MutationKind;
use std::fmt::Display;
use thiserror::Error;

/// Outcome errors of asynchronous work against the backend.
///
/// `Cancelled` never reaches the user; the controller swallows it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("failed to load {node}: {reason}")]
    FetchFailed { node: NodeId, reason: String },

    #[error("{kind} on {node} failed: {reason}")]
    MutationFailed {
        kind: MutationKind,
        node: NodeId,
        reason: String,
    },

    #[error("request cancelled")]
    Cancelled,
}

impl TreeError {
    pub fn fetch_failed(node: &NodeId, reason: impl Display) -> Self {
        Self::FetchFailed {
            node: node.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn mutation_failed(kind: MutationKind, node: &NodeId, reason: impl Display) -> Self {
        Self::MutationFailed {
            kind,
            node: node.clone(),
            reason: reason.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Synchronous refusal of a request made through the controller. Nothing
/// was sent to the backend and no state changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no thread is mounted")]
    NotMounted,

    #[error("node {0} is not in the tree")]
    UnknownNode(NodeId),

    #[error("{active} already open on {node}")]
    ActionActive { node: NodeId, active: ActionKind },

    #[error("no action open on {0}")]
    NothingOpen(NodeId),

    #[error("no {expected} open on {node}")]
    NoActiveAction { node: NodeId, expected: ActionKind },

    #[error("submission pending on {0}")]
    Submitting(NodeId),

    #[error("{kind} already in flight on {node}")]
    InFlight { node: NodeId, kind: MutationKind },

    #[error("node {node} is {state}")]
    WrongLoadState { node: NodeId, state: &'static str },

    #[error("nothing to submit for {0}")]
    EmptyContent(NodeId),
}
