use crate::error::ReplayError;
use crate::target::ReplayTarget;
use html_stream::{EmissionUnit, MirrorId, MirrorKind, OutputPacket, PacketSink, StreamItem};
use std::collections::HashMap;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

const TARGET: &str = "dom_replay";

#[derive(Clone, Copy, Debug, Default)]
pub struct ReplayStats {
    pub packets: u64,
    pub units: u64,
    pub created: u64,
    pub moved: u64,
    pub first_unit: Option<Instant>,
    pub last_unit: Option<Instant>,
}

impl ReplayStats {
    /// Time from the first applied unit to the last one.
    pub fn latency(&self) -> Option<Duration> {
        Some(self.last_unit?.duration_since(self.first_unit?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayProgress {
    Continue,
    Ended,
}

/// Applies a packet stream to a [`ReplayTarget`], in `seq` order.
///
/// Each unit becomes `parent.insertBefore(node, next_sibling)`: the node is
/// created on first sight of its mirror id and moved on every later sight.
/// When a stream fails, everything applied so far stays in the target.
pub struct ReplaySink<T: ReplayTarget> {
    target: T,
    handles: HashMap<MirrorId, T::Handle>,
    next_seq: u64,
    ended: bool,
    fault: Option<ReplayError>,
    stats: ReplayStats,
}

impl<T: ReplayTarget> ReplaySink<T> {
    pub fn new(target: T) -> Self {
        Self {
            target,
            handles: HashMap::new(),
            next_seq: 0,
            ended: false,
            fault: None,
            stats: ReplayStats::default(),
        }
    }

    pub fn consume(&mut self, item: StreamItem) -> Result<ReplayProgress, ReplayError> {
        if self.ended {
            return Err(ReplayError::AfterEnd);
        }
        match item {
            StreamItem::Packet(packet) => {
                self.apply_packet(packet)?;
                Ok(ReplayProgress::Continue)
            }
            StreamItem::End => {
                self.ended = true;
                self.finish();
                Ok(ReplayProgress::Ended)
            }
            StreamItem::Failed(reason) => {
                self.ended = true;
                self.finish();
                Err(ReplayError::StreamFailed(reason))
            }
        }
    }

    /// Consume items until the end of the stream.
    pub fn replay_all(&mut self, items: impl IntoIterator<Item = StreamItem>) -> Result<(), ReplayError> {
        for item in items {
            if self.consume(item)? == ReplayProgress::Ended {
                break;
            }
        }
        Ok(())
    }

    /// Consume from a channel until the end marker or until every sender is
    /// gone.
    pub fn drain(&mut self, rx: &Receiver<StreamItem>) -> Result<(), ReplayError> {
        for item in rx.iter() {
            if self.consume(item)? == ReplayProgress::Ended {
                return Ok(());
            }
        }
        log::warn!(target: TARGET, "packet channel closed before end of stream");
        Ok(())
    }

    pub fn apply_packet(&mut self, packet: OutputPacket) -> Result<(), ReplayError> {
        if packet.seq != self.next_seq {
            return Err(ReplayError::OutOfOrder {
                expected: self.next_seq,
                got: packet.seq,
            });
        }
        self.next_seq += 1;
        self.stats.packets += 1;
        log::trace!(target: TARGET, "packet seq={} units={}", packet.seq, packet.units.len());
        for unit in packet.units {
            self.apply_unit(unit)?;
        }
        Ok(())
    }

    fn apply_unit(&mut self, unit: EmissionUnit) -> Result<(), ReplayError> {
        let now = Instant::now();
        self.stats.first_unit.get_or_insert(now);
        self.stats.last_unit = Some(now);
        self.stats.units += 1;

        let id = unit.node.id;
        if id == MirrorId::INVALID {
            return Err(ReplayError::InvalidMirrorId);
        }
        let target_err = |source| ReplayError::Target { node: id, source };
        let handle = match self.handles.get(&id) {
            Some(handle) => {
                self.stats.moved += 1;
                handle.clone()
            }
            None => {
                let handle = self.target.create(&unit.node).map_err(target_err)?;
                if let MirrorKind::Template { content, .. } = unit.node.kind {
                    let content_handle = self.target.template_content(&handle).map_err(target_err)?;
                    self.handles.insert(content, content_handle);
                }
                self.handles.insert(id, handle.clone());
                self.stats.created += 1;
                handle
            }
        };
        let parent = match unit.parent {
            Some(parent) => self.lookup(parent)?,
            None => self.target.root(),
        };
        let before = unit.next_sibling.map(|sibling| self.lookup(sibling)).transpose()?;
        self.target
            .insert_before(&parent, &handle, before.as_ref())
            .map_err(target_err)
    }

    fn lookup(&self, id: MirrorId) -> Result<T::Handle, ReplayError> {
        self.handles
            .get(&id)
            .cloned()
            .ok_or(ReplayError::UnknownNode(id))
    }

    /// Log the streaming time and return the counters.
    pub fn finish(&mut self) -> ReplayStats {
        if let Some(latency) = self.stats.latency() {
            log::debug!(
                target: TARGET,
                "replayed {} units in {} packets over {:?}",
                self.stats.units,
                self.stats.packets,
                latency
            );
        }
        self.stats
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// First error hit while used as a [`PacketSink`].
    pub fn fault(&self) -> Option<&ReplayError> {
        self.fault.as_ref()
    }

    pub fn handle(&self, id: MirrorId) -> Option<&T::Handle> {
        self.handles.get(&id)
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }
}

impl<T: ReplayTarget> PacketSink for ReplaySink<T> {
    fn push(&mut self, item: StreamItem) {
        if self.fault.is_some() {
            return;
        }
        if let Err(err) = self.consume(item) {
            log::error!(target: TARGET, "replay stopped: {err}");
            self.fault = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ReplayTree;
    use html_stream::{ElementData, ElementNamespace, MirrorNode, Node};
    use std::sync::Arc;

    fn node(id: u32, kind: MirrorKind) -> Arc<MirrorNode> {
        Arc::new(MirrorNode { id: MirrorId(id), kind })
    }

    fn element(name: &str) -> ElementData {
        ElementData {
            name: Arc::from(name),
            namespace: ElementNamespace::Html,
            attributes: Vec::new(),
        }
    }

    fn packet(seq: u64, units: Vec<EmissionUnit>) -> StreamItem {
        StreamItem::Packet(OutputPacket { seq, units })
    }

    fn unit(node: &Arc<MirrorNode>, parent: Option<u32>, next: Option<u32>) -> EmissionUnit {
        EmissionUnit {
            node: Arc::clone(node),
            parent: parent.map(MirrorId),
            next_sibling: next.map(MirrorId),
        }
    }

    #[test]
    fn replays_inserts_and_moves() {
        let div = node(1, MirrorKind::Element(element("div")));
        let text = node(2, MirrorKind::Text("t".to_string()));
        let mut sink = ReplaySink::new(ReplayTree::new());
        sink.replay_all(vec![
            packet(0, vec![unit(&div, None, None), unit(&text, None, Some(1))]),
            packet(1, vec![unit(&text, Some(1), None)]),
            StreamItem::End,
        ])
        .unwrap();

        let stats = sink.stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.moved, 1);
        assert!(stats.latency().is_some());
        assert!(sink.is_ended());
        let tree = sink.into_target().materialize();
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.text_content(), "t");
    }

    #[test]
    fn out_of_order_packets_are_rejected() {
        let mut sink = ReplaySink::new(ReplayTree::new());
        sink.consume(packet(0, Vec::new())).unwrap();
        assert_eq!(
            sink.consume(packet(0, Vec::new())),
            Err(ReplayError::OutOfOrder { expected: 1, got: 0 })
        );
        assert_eq!(
            sink.consume(packet(5, Vec::new())),
            Err(ReplayError::OutOfOrder { expected: 1, got: 5 })
        );
    }

    #[test]
    fn unknown_parent_is_an_error() {
        let text = node(2, MirrorKind::Text("t".to_string()));
        let mut sink = ReplaySink::new(ReplayTree::new());
        assert_eq!(
            sink.consume(packet(0, vec![unit(&text, Some(9), None)])),
            Err(ReplayError::UnknownNode(MirrorId(9)))
        );
    }

    #[test]
    fn template_content_id_resolves_to_content_container() {
        let template = node(
            1,
            MirrorKind::Template {
                element: element("template"),
                content: MirrorId(2),
            },
        );
        let span = node(3, MirrorKind::Element(element("span")));
        let mut sink = ReplaySink::new(ReplayTree::new());
        sink.replay_all(vec![
            packet(0, vec![unit(&template, None, None)]),
            packet(1, vec![unit(&span, Some(2), None)]),
            StreamItem::End,
        ])
        .unwrap();

        let fragment = sink.target().materialize();
        let Node::Fragment { children } = &fragment else {
            panic!("expected fragment");
        };
        match &children[0] {
            Node::Element {
                content: Some(content),
                children,
                ..
            } => {
                assert!(children.is_empty());
                assert_eq!(content[0].element_name(), Some("span"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failure_keeps_partial_tree() {
        let div = node(1, MirrorKind::Element(element("div")));
        let mut sink = ReplaySink::new(ReplayTree::new());
        let err = sink
            .replay_all(vec![
                packet(0, vec![unit(&div, None, None)]),
                StreamItem::Failed("network".to_string()),
            ])
            .unwrap_err();
        assert_eq!(err, ReplayError::StreamFailed("network".to_string()));
        assert_eq!(sink.target().materialize().children().len(), 1);
        assert_eq!(sink.consume(StreamItem::End), Err(ReplayError::AfterEnd));
    }

    #[test]
    fn packet_sink_records_first_fault() {
        let text = node(1, MirrorKind::Text("t".to_string()));
        let mut sink = ReplaySink::new(ReplayTree::new());
        PacketSink::push(&mut sink, packet(1, vec![unit(&text, None, None)]));
        PacketSink::push(&mut sink, packet(0, vec![unit(&text, None, None)]));
        assert_eq!(
            sink.fault(),
            Some(&ReplayError::OutOfOrder { expected: 0, got: 1 })
        );
        assert!(sink.target().is_empty());
    }
}
