//! Replay of `html_stream` packet streams into a target tree.
//!
//! [`ReplaySink`] is the consumer end of a parser stream. It resolves the
//! mirror ids carried by emission units to target handles and performs each
//! unit as an `insertBefore`. [`ReplayTree`] is an arena target used for
//! parity checks and headless consumers.

mod error;
mod sink;
mod target;
mod tree;

pub use error::{ReplayError, TargetError};
pub use sink::{ReplayProgress, ReplaySink, ReplayStats};
pub use target::ReplayTarget;
pub use tree::{ReplayTree, ScriptState, TreeHandle};

/// Replay a complete item list into a fresh [`ReplayTree`].
pub fn replay_items(items: impl IntoIterator<Item = html_stream::StreamItem>) -> Result<ReplayTree, ReplayError> {
    let mut sink = ReplaySink::new(ReplayTree::new());
    sink.replay_all(items)?;
    Ok(sink.into_target())
}
