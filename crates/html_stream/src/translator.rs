//! Mutation records in, emission units out.
//!
//! Records only say which nodes changed. Positions are always read from the
//! live tree as it stands at the checkpoint, which already reflects every
//! mutation of the batch. Each handled node therefore lands under its current
//! parent, before the first following sibling the consumer already holds
//! there. Handling a node also handles, depth first in tree order, every
//! descendant the consumer does not hold yet.
//!
//! The engine can merge characters into a text node after its unit went
//! out (foster-parented table text is the usual case). The missing suffix is
//! then emitted as an extra text node right after it, and moves with it.

use crate::coalescer::TextCoalescer;
use crate::config::StreamConfig;
use crate::emitter::ChunkEmitter;
use crate::error::StreamError;
use crate::live_dom::{LiveDom, LiveId, MutationRecord, NodeKind};
use crate::mirror::CloneMirror;
use crate::reconciler::RemovalReconciler;
use crate::template::TemplateExpander;
use crate::unit::{EmissionUnit, MirrorKind, MirrorNode, PacketSink};
use std::collections::HashMap;
use std::sync::Arc;

const TARGET: &str = "html_stream.translate";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub fragments: u64,
    pub checkpoints: u64,
    pub records: u64,
    pub units: u64,
    pub packets: u64,
    pub mirrors_created: u64,
    /// Units that re-placed an already emitted mirror.
    pub moves: u64,
    pub templates: u64,
    /// Removed nodes found unreachable and dropped without a unit.
    pub dropped_removed: u64,
    /// Pending text released because its parent could not be emitted yet.
    pub released_text: u64,
    /// Text units carrying characters merged into an already emitted text.
    pub text_extensions: u64,
}

/// All per-stream translation state.
#[derive(Debug)]
pub struct MutationTranslator {
    mirror: CloneMirror,
    coalescer: TextCoalescer,
    reconciler: RemovalReconciler,
    templates: TemplateExpander,
    emitter: ChunkEmitter,
    /// Extra text mirrors emitted after a live text node, in order.
    extensions: HashMap<LiveId, Vec<Arc<MirrorNode>>>,
    sweep_removed: bool,
    stats: StreamStats,
}

impl MutationTranslator {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            mirror: CloneMirror::new(),
            coalescer: TextCoalescer::new(),
            reconciler: RemovalReconciler::new(),
            templates: TemplateExpander::new(),
            emitter: ChunkEmitter::new(config.batch_size),
            extensions: HashMap::new(),
            sweep_removed: config.sweep_removed,
            stats: StreamStats::default(),
        }
    }

    pub fn stats(&self) -> StreamStats {
        let mut stats = self.stats;
        stats.packets = self.emitter.packets_emitted();
        stats.templates = self.templates.expanded() as u64;
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StreamStats {
        &mut self.stats
    }

    pub fn mirror(&self) -> &CloneMirror {
        &self.mirror
    }

    pub fn pending_removed(&self) -> usize {
        self.reconciler.removed_len()
    }

    pub fn pending_text(&self) -> Option<LiveId> {
        self.coalescer.pending()
    }

    /// Translate one checkpoint's worth of records.
    pub fn process_batch(
        &mut self,
        dom: &mut LiveDom,
        records: Vec<MutationRecord>,
        sink: &mut impl PacketSink,
    ) -> Result<(), StreamError> {
        for record in records {
            self.stats.records += 1;
            for &removed in &record.removed {
                self.reconciler.note_removed(removed);
            }
            for &added in &record.added {
                self.admit(dom, added, sink)?;
            }
        }
        if self.sweep_removed {
            self.sweep(dom, sink)?;
        }
        for text in dom.take_grown_text() {
            self.catch_up_text(dom, text, sink)?;
        }
        Ok(())
    }

    /// Flush pending text and buffered units. Used at end of input and on
    /// cancellation.
    pub fn finish(&mut self, dom: &mut LiveDom, sink: &mut impl PacketSink) -> Result<(), StreamError> {
        self.flush_text(dom, sink)?;
        if self.reconciler.removed_len() > 0 {
            log::debug!(
                target: TARGET,
                "{} removed nodes still unresolved at end of stream",
                self.reconciler.removed_len()
            );
        }
        self.emitter.flush(sink);
        Ok(())
    }

    /// Drop pending text and buffered units without emitting them.
    pub fn discard(&mut self) {
        let text = self.coalescer.take();
        let units = self.emitter.discard();
        log::debug!(
            target: TARGET,
            "discarding pending text {text:?} and {units} buffered units"
        );
    }

    fn admit(&mut self, dom: &mut LiveDom, node: LiveId, sink: &mut impl PacketSink) -> Result<(), StreamError> {
        let mut work = vec![node];
        while let Some(current) = work.pop() {
            self.step(dom, current, &mut work, sink)?;
        }
        Ok(())
    }

    fn step(
        &mut self,
        dom: &mut LiveDom,
        node: LiveId,
        work: &mut Vec<LiveId>,
        sink: &mut impl PacketSink,
    ) -> Result<(), StreamError> {
        if self.coalescer.is_pending(node) {
            return Ok(());
        }
        let Some(parent) = self.emittable_parent(dom, node) else {
            return Ok(());
        };
        if !self.reconciler.is_placed_under(node, parent) {
            self.flush_text(dom, sink)?;
            if dom.kind(node) == NodeKind::Text {
                if let Some(displaced) = self.coalescer.hold(node) {
                    log::warn!(target: TARGET, "pending text {displaced:?} displaced");
                }
                return Ok(());
            }
            self.emit(dom, node, parent, work, sink)?;
        }
        let children = self.reconciler.unplaced_children(dom, node);
        work.extend(children.into_iter().rev());
        Ok(())
    }

    /// Live parent of `node` if the consumer can receive `node` under it now.
    fn emittable_parent(&self, dom: &LiveDom, node: LiveId) -> Option<LiveId> {
        let parent = dom.parent(node)?;
        (self.mirror.can_parent(dom, parent) && dom.is_observed(parent)).then_some(parent)
    }

    fn emit(
        &mut self,
        dom: &mut LiveDom,
        node: LiveId,
        parent: LiveId,
        work: &mut Vec<LiveId>,
        sink: &mut impl PacketSink,
    ) -> Result<(), StreamError> {
        let mirrored = self.mirror.mirror(dom, node)?;
        let parent_ref = self.mirror.parent_ref(dom, parent)?;
        let next_sibling = self
            .reconciler
            .anchor(dom, node, parent)
            .and_then(|anchor| self.mirror.get(anchor))
            .map(|anchor| anchor.id);
        if let Some(content) = mirrored.template_content {
            self.templates.expand(dom, content, work);
        }
        if mirrored.fresh {
            self.stats.mirrors_created += 1;
        } else {
            self.stats.moves += 1;
        }
        self.stats.units += 1;
        self.reconciler.place(node, parent);
        log::trace!(
            target: TARGET,
            "unit {:?} -> parent={parent_ref:?} next={next_sibling:?} fresh={}",
            mirrored.node.id,
            mirrored.fresh
        );
        self.emitter.push(
            EmissionUnit {
                node: mirrored.node,
                parent: parent_ref,
                next_sibling,
            },
            sink,
        );
        if dom.kind(node) != NodeKind::Text {
            return Ok(());
        }
        // Extensions follow their text wherever it goes.
        if !mirrored.fresh
            && let Some(extensions) = self.extensions.get(&node)
        {
            for extension in extensions {
                self.stats.moves += 1;
                self.stats.units += 1;
                self.emitter.push(
                    EmissionUnit {
                        node: Arc::clone(extension),
                        parent: parent_ref,
                        next_sibling,
                    },
                    sink,
                );
            }
        }
        self.emit_text_suffix(dom, node, parent, sink)
    }

    /// A text node grew after it was emitted. Emit the new characters if the
    /// consumer holds the node where it currently lives; otherwise its next
    /// emission picks them up.
    fn catch_up_text(&mut self, dom: &mut LiveDom, node: LiveId, sink: &mut impl PacketSink) -> Result<(), StreamError> {
        if self.coalescer.is_pending(node) || !self.mirror.contains(node) {
            return Ok(());
        }
        let Some(parent) = self.emittable_parent(dom, node) else {
            return Ok(());
        };
        if !self.reconciler.is_placed_under(node, parent) {
            return Ok(());
        }
        self.flush_text(dom, sink)?;
        self.emit_text_suffix(dom, node, parent, sink)
    }

    /// Emit whatever the live text of `node` holds beyond its mirror and
    /// earlier extensions, right after them.
    fn emit_text_suffix(
        &mut self,
        dom: &LiveDom,
        node: LiveId,
        parent: LiveId,
        sink: &mut impl PacketSink,
    ) -> Result<(), StreamError> {
        let Some(live) = dom.text(node) else {
            return Ok(());
        };
        let covered = self.mirror.get(node).map_or(0, |mirror| text_len(mirror))
            + self
                .extensions
                .get(&node)
                .map_or(0, |extensions| extensions.iter().map(|e| text_len(e)).sum());
        if live.len() <= covered || !live.is_char_boundary(covered) {
            return Ok(());
        }
        let extension = self.mirror.text_extension(live[covered..].to_string());
        let parent_ref = self.mirror.parent_ref(dom, parent)?;
        let next_sibling = self
            .reconciler
            .anchor(dom, node, parent)
            .and_then(|anchor| self.mirror.get(anchor))
            .map(|anchor| anchor.id);
        self.stats.mirrors_created += 1;
        self.stats.units += 1;
        self.stats.text_extensions += 1;
        log::debug!(
            target: TARGET,
            "text {node:?} grew by {} bytes after emission; extension {:?}",
            live.len() - covered,
            extension.id
        );
        self.extensions
            .entry(node)
            .or_default()
            .push(Arc::clone(&extension));
        self.emitter.push(
            EmissionUnit {
                node: extension,
                parent: parent_ref,
                next_sibling,
            },
            sink,
        );
        Ok(())
    }

    fn flush_text(&mut self, dom: &mut LiveDom, sink: &mut impl PacketSink) -> Result<(), StreamError> {
        let Some(pending) = self.coalescer.take() else {
            return Ok(());
        };
        let Some(parent) = self.emittable_parent(dom, pending) else {
            // Rediscovered when its current parent is emitted.
            self.stats.released_text += 1;
            log::trace!(target: TARGET, "releasing pending text {pending:?}");
            return Ok(());
        };
        if self.reconciler.is_placed_under(pending, parent) {
            return Ok(());
        }
        let mut work = Vec::new();
        self.emit(dom, pending, parent, &mut work, sink)
    }

    fn sweep(&mut self, dom: &mut LiveDom, sink: &mut impl PacketSink) -> Result<(), StreamError> {
        for node in self.reconciler.removed_nodes() {
            if !self.reconciler.is_removed(node) || self.coalescer.is_pending(node) {
                continue;
            }
            if !dom.is_observed(node) {
                self.reconciler.forget(node);
                self.stats.dropped_removed += 1;
                log::debug!(target: TARGET, "dropping removed node {node:?}: no longer reachable");
                continue;
            }
            self.admit(dom, node, sink)?;
        }
        Ok(())
    }
}

fn text_len(node: &MirrorNode) -> usize {
    match &node.kind {
        MirrorKind::Text(text) => text.len(),
        _ => 0,
    }
}
