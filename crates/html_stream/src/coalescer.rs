use crate::live_dom::LiveId;

/// Single-slot buffer for the most recent text node.
///
/// The engine keeps appending characters to the trailing text node of the
/// current insertion point, so a text unit is only emitted once something
/// else is placed after it (or the stream ends). Mirroring happens at flush
/// time and therefore captures every merged character. The parent is read
/// from the live tree at flush time, never stored here.
#[derive(Debug, Default)]
pub struct TextCoalescer {
    pending: Option<LiveId>,
}

impl TextCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, node: LiveId) -> bool {
        self.pending == Some(node)
    }

    pub fn pending(&self) -> Option<LiveId> {
        self.pending
    }

    /// Hold `node`. The caller flushes any previous entry first; a displaced
    /// entry is returned so it is never silently lost.
    pub fn hold(&mut self, node: LiveId) -> Option<LiveId> {
        self.pending.replace(node)
    }

    pub fn take(&mut self) -> Option<LiveId> {
        self.pending.take()
    }
}
