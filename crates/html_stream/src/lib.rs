//! Streaming HTML parsing into replayable tree-construction units.
//!
//! Markup arrives in fragments. An html5ever tree builder parses them into a
//! hidden live tree; after each fragment the child-list mutations it caused
//! are translated into [`EmissionUnit`]s over inert [`MirrorNode`]s and handed
//! to a [`PacketSink`] in sequenced [`OutputPacket`]s. Replaying the units in
//! order (insert `node` into `parent` before `next_sibling`) rebuilds the tree
//! a one-shot parse of the concatenated input would produce.

pub mod coalescer;
pub mod config;
pub mod emitter;
pub mod error;
pub mod hidden;
pub mod live_dom;
pub mod mirror;
pub mod node;
pub mod reconciler;
pub mod sink;
pub mod stream;
pub mod template;
pub mod translator;
pub mod unit;

#[cfg(any(test, feature = "dom-snapshot"))]
pub mod snapshot;

#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use config::StreamConfig;
pub use error::{InvariantViolation, StreamError};
pub use live_dom::{LiveDom, LiveId, MutationRecord, NodeKind};
pub use node::Node;
pub use stream::{ParserStream, run_stream};
pub use translator::StreamStats;
pub use unit::{
    ElementData, ElementNamespace, EmissionUnit, MirrorId, MirrorKind, MirrorNode, OtherNode,
    OutputPacket, PacketSink, StreamItem, flatten_units,
};

/// Parse `input` in one shot, the same way a stream would, and return the
/// parse root's children.
pub fn parse_to_node(input: &str) -> Result<Node, StreamError> {
    let mut document = hidden::HiddenDocument::new(&StreamConfig::default())?;
    document.write(input)?;
    document.close();
    let root = document.dom().root_fragment();
    root.ok_or(StreamError::Invariant(InvariantViolation::MissingParseRoot))
}
