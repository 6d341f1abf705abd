//! Live tree written by the tree-construction engine.
//!
//! Node identity is a [`LiveId`] index into an arena. Nodes are never freed
//! while the stream lives, so an id stays valid after its node is detached.
//! Child-list mutations whose target lies inside a registered observation root
//! are queued as [`MutationRecord`]s and drained at each checkpoint. Text
//! merged into an existing observed text node is queued separately, like a
//! character-data record.

use crate::node::{Node, NodeShell, assemble};
use crate::unit::{ElementData, ElementNamespace, OtherNode};
use html5ever::tendril::StrTendril;
use html5ever::{Attribute, LocalName, Namespace, QualName};
use std::collections::HashSet;
use std::sync::Arc;

pub const HTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NS: &str = "http://www.w3.org/1998/Math/MathML";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LiveId(pub u32);

impl LiveId {
    pub const DOCUMENT: LiveId = LiveId(0);
}

/// Closed classification driving how a live node is mirrored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Text,
    Element,
    Template,
    Script,
    Other,
}

#[derive(Debug)]
pub enum LiveData {
    Document,
    Fragment,
    Element {
        name: QualName,
        attrs: Vec<Attribute>,
        template_contents: Option<LiveId>,
        script_started: bool,
    },
    Text(StrTendril),
    Comment(StrTendril),
    Doctype {
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    },
    ProcessingInstruction {
        target: StrTendril,
        data: StrTendril,
    },
}

#[derive(Debug)]
struct LiveNode {
    data: LiveData,
    parent: Option<LiveId>,
    children: Vec<LiveId>,
    /// Inside an observation root (inclusive). Kept current on every attach
    /// and detach.
    observed: bool,
}

impl LiveNode {
    fn new(data: LiveData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            observed: false,
        }
    }
}

/// One child-list change, in the shape a DOM mutation observer reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord {
    pub target: LiveId,
    pub added: Vec<LiveId>,
    pub removed: Vec<LiveId>,
    pub next_sibling: Option<LiveId>,
}

#[derive(Debug)]
pub struct LiveDom {
    nodes: Vec<LiveNode>,
    root: Option<LiveId>,
    observed: HashSet<LiveId>,
    records: Vec<MutationRecord>,
    grown_text: Vec<LiveId>,
}

impl Default for LiveDom {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveDom {
    pub fn new() -> Self {
        Self {
            nodes: vec![LiveNode::new(LiveData::Document)],
            root: None,
            observed: HashSet::new(),
            records: Vec::new(),
            grown_text: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, id: LiveId) -> Option<&LiveNode> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: LiveId) -> Option<&mut LiveNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn create(&mut self, data: LiveData) -> LiveId {
        let id = LiveId(self.nodes.len() as u32);
        self.nodes.push(LiveNode::new(data));
        id
    }

    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>, template: bool) -> LiveId {
        let template_contents = template.then(|| self.create(LiveData::Fragment));
        self.create(LiveData::Element {
            name,
            attrs,
            template_contents,
            script_started: false,
        })
    }

    pub fn create_text(&mut self, text: &str) -> LiveId {
        self.create(LiveData::Text(StrTendril::from_slice(text)))
    }

    /// The synthetic element the engine parses into.
    pub fn root(&self) -> Option<LiveId> {
        self.root
    }

    /// Mark `root` as the parse root; it also becomes the first observation root.
    pub fn set_root(&mut self, root: LiveId) {
        self.root = Some(root);
        self.observe(root);
    }

    /// Register an observation root. Returns `false` if it already was one.
    pub fn observe(&mut self, id: LiveId) -> bool {
        if !self.observed.insert(id) {
            return false;
        }
        self.refresh_observed(id);
        true
    }

    pub fn is_observation_root(&self, id: LiveId) -> bool {
        self.observed.contains(&id)
    }

    /// Whether `id` is an observation root or lies beneath one.
    pub fn is_observed(&self, id: LiveId) -> bool {
        self.node(id).is_some_and(|node| node.observed)
    }

    /// Recompute the observed flag of `id` and of the descendants whose flag
    /// changes with it.
    fn refresh_observed(&mut self, id: LiveId) {
        let inherited = self.parent(id).is_some_and(|parent| self.is_observed(parent));
        let mut stack = vec![(id, inherited)];
        while let Some((current, inherited)) = stack.pop() {
            let observed = inherited || self.observed.contains(&current);
            let Some(node) = self.node_mut(current) else {
                continue;
            };
            if node.observed == observed {
                continue;
            }
            node.observed = observed;
            stack.extend(self.children(current).iter().map(|&child| (child, observed)));
        }
    }

    /// Index of `child` under `parent`. Searches from the end, where the
    /// engine does nearly all of its work.
    fn index_in(&self, parent: LiveId, child: LiveId) -> Option<usize> {
        self.children(parent).iter().rposition(|&c| c == child)
    }

    pub fn data(&self, id: LiveId) -> Option<&LiveData> {
        self.node(id).map(|node| &node.data)
    }

    pub fn parent(&self, id: LiveId) -> Option<LiveId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: LiveId) -> &[LiveId] {
        self.node(id).map_or(&[], |node| node.children.as_slice())
    }

    /// Siblings after `id`, in order.
    pub fn following_siblings(&self, id: LiveId) -> &[LiveId] {
        let Some(parent) = self.parent(id) else {
            return &[];
        };
        match self.index_in(parent, id) {
            Some(index) => &self.children(parent)[index + 1..],
            None => &[],
        }
    }

    pub fn next_sibling(&self, id: LiveId) -> Option<LiveId> {
        self.following_siblings(id).first().copied()
    }

    pub fn kind(&self, id: LiveId) -> NodeKind {
        match self.data(id) {
            Some(LiveData::Text(_)) => NodeKind::Text,
            Some(LiveData::Element {
                template_contents: Some(_),
                ..
            }) => NodeKind::Template,
            Some(LiveData::Element { name, .. }) if is_script(name) => NodeKind::Script,
            Some(LiveData::Element { .. }) => NodeKind::Element,
            _ => NodeKind::Other,
        }
    }

    pub fn text(&self, id: LiveId) -> Option<&str> {
        match self.data(id) {
            Some(LiveData::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn template_contents(&self, id: LiveId) -> Option<LiveId> {
        match self.data(id) {
            Some(LiveData::Element {
                template_contents, ..
            }) => *template_contents,
            _ => None,
        }
    }

    /// Content fragment of `id`, created on demand.
    pub fn ensure_template_contents(&mut self, id: LiveId) -> LiveId {
        if let Some(contents) = self.template_contents(id) {
            return contents;
        }
        let contents = self.create(LiveData::Fragment);
        if let Some(LiveNode {
            data: LiveData::Element {
                template_contents, ..
            },
            ..
        }) = self.node_mut(id)
        {
            *template_contents = Some(contents);
        }
        contents
    }

    pub fn is_script_started(&self, id: LiveId) -> bool {
        matches!(
            self.data(id),
            Some(LiveData::Element {
                script_started: true,
                ..
            })
        )
    }

    pub fn mark_script_started(&mut self, id: LiveId) {
        if let Some(LiveNode {
            data: LiveData::Element { script_started, .. },
            ..
        }) = self.node_mut(id)
        {
            *script_started = true;
        }
    }

    pub fn add_attrs_if_missing(&mut self, id: LiveId, extra: Vec<Attribute>) {
        let Some(LiveNode {
            data: LiveData::Element { attrs, .. },
            ..
        }) = self.node_mut(id)
        else {
            return;
        };
        for attr in extra {
            if !attrs.iter().any(|existing| existing.name == attr.name) {
                attrs.push(attr);
            }
        }
    }

    pub fn append(&mut self, parent: LiveId, child: LiveId) {
        if parent == child || self.node(parent).is_none() {
            return;
        }
        self.detach(child);
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.refresh_observed(child);
        self.record_added(parent, vec![child], None);
    }

    /// Insert `child` immediately before `sibling`, under `sibling`'s parent.
    pub fn insert_before_sibling(&mut self, sibling: LiveId, child: LiveId) {
        if sibling == child {
            return;
        }
        self.detach(child);
        let Some(parent) = self.parent(sibling) else {
            return;
        };
        let Some(index) = self.index_in(parent, sibling) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.insert(index, child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.refresh_observed(child);
        self.record_added(parent, vec![child], Some(sibling));
    }

    /// Append text, merging into a trailing text child.
    pub fn append_text(&mut self, parent: LiveId, text: StrTendril) {
        let last = self.children(parent).last().copied();
        if let Some(last) = last
            && self.extend_text(last, &text)
        {
            return;
        }
        let id = self.create(LiveData::Text(text));
        self.append(parent, id);
    }

    /// Insert text before `sibling`, merging into a preceding text sibling.
    pub fn insert_text_before(&mut self, sibling: LiveId, text: StrTendril) {
        let Some(parent) = self.parent(sibling) else {
            return;
        };
        let previous = self
            .index_in(parent, sibling)
            .and_then(|index| index.checked_sub(1))
            .map(|index| self.children(parent)[index]);
        if let Some(previous) = previous
            && self.extend_text(previous, &text)
        {
            return;
        }
        let id = self.create(LiveData::Text(text));
        self.insert_before_sibling(sibling, id);
    }

    /// Push `text` onto the text node `id`. Returns `false` if `id` is not
    /// a text node.
    fn extend_text(&mut self, id: LiveId, text: &StrTendril) -> bool {
        let observed = self.is_observed(id);
        let Some(LiveNode {
            data: LiveData::Text(existing),
            ..
        }) = self.node_mut(id)
        else {
            return false;
        };
        existing.push_tendril(text);
        if observed && self.grown_text.last() != Some(&id) {
            self.grown_text.push(id);
        }
        true
    }

    pub fn detach(&mut self, child: LiveId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        let Some(index) = self.index_in(parent, child) else {
            return;
        };
        let next_sibling = self.children(parent).get(index + 1).copied();
        if let Some(node) = self.node_mut(parent) {
            node.children.remove(index);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
        self.refresh_observed(child);
        self.record_removed(parent, vec![child], next_sibling);
    }

    /// Move every child of `from` to the end of `to`, preserving order.
    pub fn reparent_children(&mut self, from: LiveId, to: LiveId) {
        if from == to || self.node(to).is_none() {
            return;
        }
        let moved = match self.node_mut(from) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        if moved.is_empty() {
            return;
        }
        self.record_removed(from, moved.clone(), None);
        for &child in &moved {
            if let Some(node) = self.node_mut(child) {
                node.parent = Some(to);
            }
        }
        if let Some(node) = self.node_mut(to) {
            node.children.extend(moved.iter().copied());
        }
        for &child in &moved {
            self.refresh_observed(child);
        }
        self.record_added(to, moved, None);
    }

    fn record_added(&mut self, target: LiveId, added: Vec<LiveId>, next_sibling: Option<LiveId>) {
        if self.is_observed(target) {
            self.records.push(MutationRecord {
                target,
                added,
                removed: Vec::new(),
                next_sibling,
            });
        }
    }

    fn record_removed(&mut self, target: LiveId, removed: Vec<LiveId>, next_sibling: Option<LiveId>) {
        if self.is_observed(target) {
            self.records.push(MutationRecord {
                target,
                added: Vec::new(),
                removed,
                next_sibling,
            });
        }
    }

    pub fn has_pending_records(&self) -> bool {
        !self.records.is_empty() || !self.grown_text.is_empty()
    }

    /// Drain queued records in mutation order.
    pub fn take_records(&mut self) -> Vec<MutationRecord> {
        std::mem::take(&mut self.records)
    }

    /// Drain the observed text nodes that had characters merged into them,
    /// each once, in first-growth order.
    pub fn take_grown_text(&mut self) -> Vec<LiveId> {
        let mut seen = HashSet::new();
        let mut grown = std::mem::take(&mut self.grown_text);
        grown.retain(|id| seen.insert(*id));
        grown
    }

    /// Owned copy of the parse root's children, as a fragment.
    pub fn root_fragment(&self) -> Option<Node> {
        let root = self.root?;
        let mut fragment = self.to_node(root);
        let children = fragment.children_mut().map(std::mem::take).unwrap_or_default();
        Some(Node::Fragment { children })
    }

    pub fn to_node(&self, id: LiveId) -> Node {
        assemble(id, |id| self.shell(id))
    }

    fn shell(&self, id: LiveId) -> NodeShell<LiveId> {
        let leaf = |node| NodeShell {
            node,
            content: Vec::new(),
            children: Vec::new(),
        };
        match self.data(id) {
            Some(LiveData::Element {
                name,
                attrs,
                template_contents,
                ..
            }) => NodeShell {
                node: Node::Element {
                    element: element_data(name, attrs),
                    content: template_contents.map(|_| Vec::new()),
                    children: Vec::new(),
                },
                content: template_contents.map_or_else(Vec::new, |contents| self.children(contents).to_vec()),
                children: self.children(id).to_vec(),
            },
            Some(LiveData::Text(text)) => leaf(Node::Text {
                text: text.to_string(),
            }),
            Some(data) => match other_node(data) {
                Some(other) => leaf(Node::Other(other)),
                None => NodeShell {
                    node: Node::Fragment {
                        children: Vec::new(),
                    },
                    content: Vec::new(),
                    children: self.children(id).to_vec(),
                },
            },
            None => leaf(Node::Fragment {
                children: Vec::new(),
            }),
        }
    }
}

pub fn html_name(local: &str) -> QualName {
    QualName::new(None, Namespace::from(HTML_NS), LocalName::from(local))
}

fn is_script(name: &QualName) -> bool {
    &*name.local == "script" && matches!(&*name.ns, HTML_NS | SVG_NS)
}

pub(crate) fn element_data(name: &QualName, attrs: &[Attribute]) -> ElementData {
    ElementData {
        name: Arc::from(&*name.local),
        namespace: namespace_of(&name.ns),
        attributes: attrs
            .iter()
            .map(|attr| (attribute_name(&attr.name), attr.value.to_string()))
            .collect(),
    }
}

pub(crate) fn namespace_of(ns: &Namespace) -> ElementNamespace {
    match &**ns {
        HTML_NS => ElementNamespace::Html,
        SVG_NS => ElementNamespace::Svg,
        MATHML_NS => ElementNamespace::MathMl,
        other => ElementNamespace::Other(Arc::from(other)),
    }
}

pub(crate) fn attribute_name(name: &QualName) -> Arc<str> {
    match &name.prefix {
        Some(prefix) => Arc::from(format!("{}:{}", &**prefix, &*name.local)),
        None => Arc::from(&*name.local),
    }
}

pub(crate) fn other_node(data: &LiveData) -> Option<OtherNode> {
    match data {
        LiveData::Comment(text) => Some(OtherNode::Comment(text.to_string())),
        LiveData::Doctype {
            name,
            public_id,
            system_id,
        } => Some(OtherNode::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        }),
        LiveData::ProcessingInstruction { target, data } => Some(OtherNode::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        }),
        _ => None,
    }
}
