use crate::live_dom::LiveId;
use thiserror::Error;

/// Broken pipeline invariants. These are bugs in the translator or the
/// engine sink, never a consequence of malformed markup.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("attempted to mirror the synthetic parse root {0:?}")]
    MirrorOfRoot(LiveId),
    #[error("live node {0:?} is a document or fragment and has no mirror")]
    Unmirrorable(LiveId),
    #[error("parent {0:?} has not been mirrored")]
    UnmirroredParent(LiveId),
    #[error("template {0:?} has no content fragment")]
    MissingTemplateContents(LiveId),
    #[error("engine did not produce a parse root")]
    MissingParseRoot,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    #[error("pipeline invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("fragment source failed: {0}")]
    Source(String),
    #[error("stream is closed")]
    Closed,
}

impl StreamError {
    /// Whether the error came from outside the pipeline.
    pub fn is_source(&self) -> bool {
        matches!(self, StreamError::Source(_))
    }
}
