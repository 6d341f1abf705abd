use html_stream::MirrorId;
use thiserror::Error;

/// Faults raised by a [`crate::ReplayTarget`] while applying one unit.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("parent cannot have children")]
    InvalidParent,
    #[error("reference sibling is not a child of the parent")]
    InvalidSibling,
    #[error("insertion would create a cycle")]
    CycleDetected,
    #[error("node has no template content")]
    WrongNodeKind,
    #[error("stale or foreign handle")]
    UnknownHandle,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("packet out of order: expected seq {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("item received after end of stream")]
    AfterEnd,
    #[error("unit refers to unknown mirror {0:?}")]
    UnknownNode(MirrorId),
    #[error("unit carries the reserved mirror id")]
    InvalidMirrorId,
    #[error("applying mirror {node:?} failed: {source}")]
    Target {
        node: MirrorId,
        #[source]
        source: TargetError,
    },
    #[error("stream failed upstream: {0}")]
    StreamFailed(String),
}
