use crate::error::InvariantViolation;
use crate::live_dom::{LiveData, LiveDom, LiveId, NodeKind, attribute_name, element_data, namespace_of, other_node};
use crate::unit::{ElementData, MirrorId, MirrorKind, MirrorNode};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of [`CloneMirror::mirror`].
#[derive(Debug)]
pub struct Mirrored {
    pub node: Arc<MirrorNode>,
    /// `false` when the live node already had a mirror.
    pub fresh: bool,
    /// Live content fragment of a template mirrored for the first time.
    pub template_content: Option<LiveId>,
}

/// One-to-one relation from live nodes to their inert mirrors.
///
/// Mirror ids start at 1 and are never reused within a stream. The synthetic
/// parse root is never mirrored; units parented to it carry `parent: None`.
#[derive(Debug)]
pub struct CloneMirror {
    mirrors: HashMap<LiveId, Arc<MirrorNode>>,
    contents: HashMap<LiveId, MirrorId>,
    next_id: u32,
}

impl Default for CloneMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl CloneMirror {
    pub fn new() -> Self {
        Self {
            mirrors: HashMap::new(),
            contents: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    pub fn get(&self, live: LiveId) -> Option<&Arc<MirrorNode>> {
        self.mirrors.get(&live)
    }

    pub fn contains(&self, live: LiveId) -> bool {
        self.mirrors.contains_key(&live)
    }

    /// Mirror id standing for a template's live content fragment.
    pub fn content_id(&self, fragment: LiveId) -> Option<MirrorId> {
        self.contents.get(&fragment).copied()
    }

    /// Whether units may name `live` as their parent.
    pub fn can_parent(&self, dom: &LiveDom, live: LiveId) -> bool {
        dom.root() == Some(live) || self.contents.contains_key(&live) || self.mirrors.contains_key(&live)
    }

    /// The unit-level reference for a live parent.
    pub fn parent_ref(&self, dom: &LiveDom, live: LiveId) -> Result<Option<MirrorId>, InvariantViolation> {
        if dom.root() == Some(live) {
            return Ok(None);
        }
        if let Some(content) = self.content_id(live) {
            return Ok(Some(content));
        }
        self.mirrors
            .get(&live)
            .map(|node| Some(node.id))
            .ok_or(InvariantViolation::UnmirroredParent(live))
    }

    /// Inert text standing for characters merged into an already emitted
    /// text node. It has no live counterpart.
    pub fn text_extension(&mut self, text: String) -> Arc<MirrorNode> {
        Arc::new(MirrorNode {
            id: self.allocate(),
            kind: MirrorKind::Text(text),
        })
    }

    /// Existing mirror of `live`, or a new one built from its current state.
    pub fn mirror(&mut self, dom: &LiveDom, live: LiveId) -> Result<Mirrored, InvariantViolation> {
        if let Some(node) = self.mirrors.get(&live) {
            return Ok(Mirrored {
                node: Arc::clone(node),
                fresh: false,
                template_content: None,
            });
        }
        if live == LiveId::DOCUMENT || dom.root() == Some(live) {
            return Err(InvariantViolation::MirrorOfRoot(live));
        }

        let mut template_content = None;
        let kind = match (dom.kind(live), dom.data(live)) {
            (NodeKind::Text, _) => MirrorKind::Text(dom.text(live).unwrap_or_default().to_string()),
            (NodeKind::Element, Some(LiveData::Element { name, attrs, .. })) => {
                MirrorKind::Element(element_data(name, attrs))
            }
            (NodeKind::Script, Some(LiveData::Element { name, attrs, .. })) => {
                // Built field by field: the engine's already-started flag must
                // not reach the mirror.
                let mut element = ElementData {
                    name: Arc::from(&*name.local),
                    namespace: namespace_of(&name.ns),
                    attributes: Vec::with_capacity(attrs.len()),
                };
                for attr in attrs {
                    element
                        .attributes
                        .push((attribute_name(&attr.name), attr.value.to_string()));
                }
                MirrorKind::Script(element)
            }
            (NodeKind::Template, Some(LiveData::Element { name, attrs, .. })) => {
                let fragment = dom
                    .template_contents(live)
                    .ok_or(InvariantViolation::MissingTemplateContents(live))?;
                let content = self.allocate();
                self.contents.insert(fragment, content);
                template_content = Some(fragment);
                MirrorKind::Template {
                    element: element_data(name, attrs),
                    content,
                }
            }
            (NodeKind::Other, Some(data)) => {
                MirrorKind::Other(other_node(data).ok_or(InvariantViolation::Unmirrorable(live))?)
            }
            _ => return Err(InvariantViolation::Unmirrorable(live)),
        };

        let node = Arc::new(MirrorNode {
            id: self.allocate(),
            kind,
        });
        self.mirrors.insert(live, Arc::clone(&node));
        Ok(Mirrored {
            node,
            fresh: true,
            template_content,
        })
    }

    fn allocate(&mut self) -> MirrorId {
        let id = MirrorId(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_dom::html_name;
    use html5ever::tendril::StrTendril;
    use html5ever::{Attribute, LocalName, Namespace, QualName};

    fn dom_with_root() -> (LiveDom, LiveId) {
        let mut dom = LiveDom::new();
        let root = dom.create_element(html_name("html"), Vec::new(), false);
        dom.append(LiveId::DOCUMENT, root);
        dom.set_root(root);
        (dom, root)
    }

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute {
            name: QualName::new(None, Namespace::from(""), LocalName::from(name)),
            value: StrTendril::from_slice(value),
        }
    }

    #[test]
    fn mirroring_twice_returns_the_same_node() {
        let (mut dom, root) = dom_with_root();
        let div = dom.create_element(html_name("div"), vec![attr("id", "a")], false);
        dom.append(root, div);
        let mut mirror = CloneMirror::new();

        let first = mirror.mirror(&dom, div).unwrap();
        let second = mirror.mirror(&dom, div).unwrap();
        assert!(first.fresh);
        assert!(!second.fresh);
        assert!(Arc::ptr_eq(&first.node, &second.node));
        assert_eq!(mirror.len(), 1);
        assert_eq!(first.node.element().unwrap().attribute("id"), Some("a"));
    }

    #[test]
    fn root_is_never_mirrored() {
        let (dom, root) = dom_with_root();
        let mut mirror = CloneMirror::new();
        assert_eq!(
            mirror.mirror(&dom, root).unwrap_err(),
            InvariantViolation::MirrorOfRoot(root)
        );
        assert_eq!(mirror.parent_ref(&dom, root), Ok(None));
        assert!(mirror.is_empty());
    }

    #[test]
    fn template_content_gets_its_own_id() {
        let (mut dom, root) = dom_with_root();
        let template = dom.create_element(html_name("template"), Vec::new(), true);
        dom.append(root, template);
        let fragment = dom.template_contents(template).unwrap();
        let mut mirror = CloneMirror::new();

        let mirrored = mirror.mirror(&dom, template).unwrap();
        assert_eq!(mirrored.template_content, Some(fragment));
        let MirrorKind::Template { content, .. } = mirrored.node.kind else {
            panic!("expected template mirror");
        };
        assert_ne!(content, mirrored.node.id);
        assert_eq!(mirror.parent_ref(&dom, fragment), Ok(Some(content)));
        assert!(mirror.can_parent(&dom, fragment));
    }

    #[test]
    fn script_mirror_keeps_attributes_without_run_state() {
        let (mut dom, root) = dom_with_root();
        let script = dom.create_element(html_name("script"), vec![attr("src", "a.js"), attr("async", "")], false);
        dom.append(root, script);
        dom.mark_script_started(script);
        let mut mirror = CloneMirror::new();

        let node = mirror.mirror(&dom, script).unwrap().node;
        match &node.kind {
            MirrorKind::Script(element) => {
                assert_eq!(&*element.name, "script");
                assert_eq!(element.attributes.len(), 2);
                assert_eq!(element.attribute("src"), Some("a.js"));
            }
            other => panic!("expected script mirror, got {other:?}"),
        }
    }

    #[test]
    fn unmirrored_parent_is_an_invariant_violation() {
        let (mut dom, root) = dom_with_root();
        let div = dom.create_element(html_name("div"), Vec::new(), false);
        dom.append(root, div);
        let mirror = CloneMirror::new();
        assert_eq!(
            mirror.parent_ref(&dom, div),
            Err(InvariantViolation::UnmirroredParent(div))
        );
        assert!(!mirror.can_parent(&dom, div));
    }

    #[test]
    fn fragments_cannot_be_mirrored() {
        let (mut dom, _) = dom_with_root();
        let template = dom.create_element(html_name("template"), Vec::new(), true);
        let fragment = dom.template_contents(template).unwrap();
        let mut mirror = CloneMirror::new();
        assert_eq!(
            mirror.mirror(&dom, fragment).unwrap_err(),
            InvariantViolation::Unmirrorable(fragment)
        );
    }

    #[test]
    fn text_extensions_take_fresh_ids_without_a_live_node() {
        let (mut dom, root) = dom_with_root();
        let text = dom.create_text("a");
        dom.append(root, text);
        let mut mirror = CloneMirror::new();

        let base = mirror.mirror(&dom, text).unwrap().node;
        let extension = mirror.text_extension("b".to_string());
        assert_ne!(base.id, extension.id);
        assert_eq!(extension.kind, MirrorKind::Text("b".to_string()));
        assert_eq!(mirror.len(), 1);
        assert!(Arc::ptr_eq(mirror.get(text).unwrap(), &base));
    }
}
