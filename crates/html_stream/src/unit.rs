//! Replayable tree-construction protocol.
//!
//! This module defines what a parser stream hands to its consumer: inert
//! mirror nodes and the positional units that place them.
//!
//! Invariants:
//! - Packets are delivered in `seq` order, starting at 0, with no gaps.
//! - A unit's `parent` and `next_sibling` refer only to mirror ids that were
//!   carried by an earlier unit (or to a template content id announced by an
//!   earlier template unit).
//! - `parent: None` means the consumer's own target root.
//! - A mirror id seen again is a move of the same node, never a second node.
//! - Attribute order and duplicates are preserved.
//! - `StreamItem::End` or `StreamItem::Failed` is the last item of a stream.

use std::sync::Arc;
use std::sync::mpsc;

/// Stable identity of a mirror node within one stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MirrorId(pub u32);

impl MirrorId {
    /// Never assigned to a node.
    pub const INVALID: MirrorId = MirrorId(0);
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ElementNamespace {
    Html,
    Svg,
    MathMl,
    Other(Arc<str>),
}

/// Name, namespace and attributes of an element, detached from any tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementData {
    pub name: Arc<str>,
    pub namespace: ElementNamespace,
    /// Prefixed attributes are named `prefix:local`.
    pub attributes: Vec<(Arc<str>, String)>,
}

impl ElementData {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.as_ref() == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OtherNode {
    Comment(String),
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorKind {
    Text(String),
    Element(ElementData),
    /// `content` names the template's content fragment; units parented to it
    /// populate the content rather than the element's children.
    Template {
        element: ElementData,
        content: MirrorId,
    },
    /// Rebuilt from scratch, so replay targets see a script that has not run.
    Script(ElementData),
    Other(OtherNode),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorNode {
    pub id: MirrorId,
    pub kind: MirrorKind,
}

impl MirrorNode {
    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            MirrorKind::Element(element)
            | MirrorKind::Script(element)
            | MirrorKind::Template { element, .. } => Some(element),
            MirrorKind::Text(_) | MirrorKind::Other(_) => None,
        }
    }
}

/// Insert `node` into `parent` before `next_sibling` (append when `None`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmissionUnit {
    pub node: Arc<MirrorNode>,
    pub parent: Option<MirrorId>,
    pub next_sibling: Option<MirrorId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPacket {
    pub seq: u64,
    pub units: Vec<EmissionUnit>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamItem {
    Packet(OutputPacket),
    End,
    Failed(String),
}

/// Consumer side of a parser stream.
pub trait PacketSink {
    fn push(&mut self, item: StreamItem);
}

impl PacketSink for Vec<StreamItem> {
    fn push(&mut self, item: StreamItem) {
        Vec::push(self, item);
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &mut S {
    fn push(&mut self, item: StreamItem) {
        (**self).push(item);
    }
}

impl PacketSink for mpsc::Sender<StreamItem> {
    fn push(&mut self, item: StreamItem) {
        if self.send(item).is_err() {
            log::warn!(target: "html_stream.stream", "packet receiver dropped; item discarded");
        }
    }
}

/// Units of every packet in `items`, in delivery order.
pub fn flatten_units(items: &[StreamItem]) -> Vec<EmissionUnit> {
    items
        .iter()
        .filter_map(|item| match item {
            StreamItem::Packet(packet) => Some(packet.units.iter().cloned()),
            StreamItem::End | StreamItem::Failed(_) => None,
        })
        .flatten()
        .collect()
}
