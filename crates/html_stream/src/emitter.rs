use crate::unit::{EmissionUnit, OutputPacket, PacketSink, StreamItem};
use std::num::NonZeroUsize;

/// Groups emission units into sequenced packets.
#[derive(Debug)]
pub struct ChunkEmitter {
    batch_size: NonZeroUsize,
    buffer: Vec<EmissionUnit>,
    next_seq: u64,
}

impl ChunkEmitter {
    pub fn new(batch_size: NonZeroUsize) -> Self {
        Self {
            batch_size,
            buffer: Vec::with_capacity(batch_size.get()),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, unit: EmissionUnit, sink: &mut impl PacketSink) {
        self.buffer.push(unit);
        if self.buffer.len() >= self.batch_size.get() {
            self.emit(sink);
        }
    }

    /// Emit a final, possibly short, packet.
    pub fn flush(&mut self, sink: &mut impl PacketSink) {
        if !self.buffer.is_empty() {
            self.emit(sink);
        }
    }

    /// Drop buffered units. Returns how many were dropped.
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn packets_emitted(&self) -> u64 {
        self.next_seq
    }

    fn emit(&mut self, sink: &mut impl PacketSink) {
        let units = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size.get()));
        let seq = self.next_seq;
        self.next_seq += 1;
        log::trace!(target: "html_stream.stream", "packet seq={seq} units={}", units.len());
        sink.push(StreamItem::Packet(OutputPacket { seq, units }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{MirrorId, MirrorKind, MirrorNode};
    use std::sync::Arc;

    fn unit(id: u32) -> EmissionUnit {
        EmissionUnit {
            node: Arc::new(MirrorNode {
                id: MirrorId(id),
                kind: MirrorKind::Text(id.to_string()),
            }),
            parent: None,
            next_sibling: None,
        }
    }

    fn packet_sizes(items: &[StreamItem]) -> Vec<usize> {
        items
            .iter()
            .map(|item| match item {
                StreamItem::Packet(packet) => packet.units.len(),
                other => panic!("unexpected item {other:?}"),
            })
            .collect()
    }

    #[test]
    fn batch_of_one_emits_every_unit() {
        let mut emitter = ChunkEmitter::new(NonZeroUsize::MIN);
        let mut items = Vec::new();
        for id in 1..=3 {
            emitter.push(unit(id), &mut items);
        }
        emitter.flush(&mut items);
        assert_eq!(packet_sizes(&items), vec![1, 1, 1]);
    }

    #[test]
    fn larger_batches_flush_remainder() {
        let mut emitter = ChunkEmitter::new(NonZeroUsize::new(2).unwrap());
        let mut items = Vec::new();
        for id in 1..=5 {
            emitter.push(unit(id), &mut items);
        }
        assert_eq!(emitter.buffered(), 1);
        emitter.flush(&mut items);
        assert_eq!(packet_sizes(&items), vec![2, 2, 1]);
        let seqs: Vec<u64> = items
            .iter()
            .filter_map(|item| match item {
                StreamItem::Packet(packet) => Some(packet.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn discard_drops_buffer_without_emitting() {
        let mut emitter = ChunkEmitter::new(NonZeroUsize::new(4).unwrap());
        let mut items = Vec::new();
        emitter.push(unit(1), &mut items);
        emitter.push(unit(2), &mut items);
        assert_eq!(emitter.discard(), 2);
        emitter.flush(&mut items);
        assert!(items.is_empty());
        assert_eq!(emitter.packets_emitted(), 0);
    }
}
