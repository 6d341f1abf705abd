use crate::live_dom::{LiveDom, LiveId};

/// Brings a template's content fragment under observation the first time the
/// template is mirrored.
#[derive(Debug, Default)]
pub struct TemplateExpander {
    expanded: usize,
}

impl TemplateExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `content` as an observation root and queue its existing
    /// children on `work` so they are handled in tree order.
    pub fn expand(&mut self, dom: &mut LiveDom, content: LiveId, work: &mut Vec<LiveId>) {
        if !dom.observe(content) {
            return;
        }
        let children = dom.children(content);
        log::trace!(
            target: "html_stream.translate",
            "expanding template content {content:?} with {} children",
            children.len()
        );
        work.extend(children.iter().rev().copied());
        self.expanded += 1;
    }

    pub fn expanded(&self) -> usize {
        self.expanded
    }
}
