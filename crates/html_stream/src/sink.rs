//! html5ever `TreeSink` over the shared live tree.

use crate::live_dom::{LiveData, LiveDom, LiveId, html_name};
use html5ever::tendril::StrTendril;
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, ExpandedName, QualName};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub struct EngineSink {
    dom: Rc<RefCell<LiveDom>>,
    names: HashMap<LiveId, QualName>,
    integration_points: HashSet<LiveId>,
    // Returned by `elem_name` for non-element handles.
    placeholder: QualName,
    parse_errors: usize,
}

impl EngineSink {
    pub fn new(dom: Rc<RefCell<LiveDom>>) -> Self {
        Self {
            dom,
            names: HashMap::new(),
            integration_points: HashSet::new(),
            placeholder: html_name(""),
            parse_errors: 0,
        }
    }
}

impl TreeSink for EngineSink {
    type Handle = LiveId;
    type Output = ();

    fn finish(self) -> Self::Output {
        log::trace!(
            target: "html_stream.engine",
            "engine finished: parse_errors={}",
            self.parse_errors
        );
    }

    fn parse_error(&mut self, msg: Cow<'static, str>) {
        self.parse_errors += 1;
        log::trace!(target: "html_stream.engine", "parse error: {msg}");
    }

    fn get_document(&mut self) -> LiveId {
        LiveId::DOCUMENT
    }

    fn elem_name<'a>(&'a self, target: &'a LiveId) -> ExpandedName<'a> {
        self.names.get(target).unwrap_or(&self.placeholder).expanded()
    }

    fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>, flags: ElementFlags) -> LiveId {
        let id = self
            .dom
            .borrow_mut()
            .create_element(name.clone(), attrs, flags.template);
        if flags.mathml_annotation_xml_integration_point {
            self.integration_points.insert(id);
        }
        self.names.insert(id, name);
        id
    }

    fn create_comment(&mut self, text: StrTendril) -> LiveId {
        self.dom.borrow_mut().create(LiveData::Comment(text))
    }

    fn create_pi(&mut self, target: StrTendril, data: StrTendril) -> LiveId {
        self.dom
            .borrow_mut()
            .create(LiveData::ProcessingInstruction { target, data })
    }

    fn append(&mut self, parent: &LiveId, child: NodeOrText<LiveId>) {
        let mut dom = self.dom.borrow_mut();
        match child {
            NodeOrText::AppendNode(node) => {
                dom.append(*parent, node);
                // The first element placed in the document is the parse root.
                if *parent == LiveId::DOCUMENT && dom.root().is_none() && self.names.contains_key(&node) {
                    dom.set_root(node);
                }
            }
            NodeOrText::AppendText(text) => dom.append_text(*parent, text),
        }
    }

    fn append_based_on_parent_node(
        &mut self,
        element: &LiveId,
        prev_element: &LiveId,
        child: NodeOrText<LiveId>,
    ) {
        let has_parent = self.dom.borrow().parent(*element).is_some();
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &mut self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        let mut dom = self.dom.borrow_mut();
        let doctype = dom.create(LiveData::Doctype {
            name,
            public_id,
            system_id,
        });
        dom.append(LiveId::DOCUMENT, doctype);
    }

    fn mark_script_already_started(&mut self, node: &LiveId) {
        self.dom.borrow_mut().mark_script_started(*node);
    }

    fn get_template_contents(&mut self, target: &LiveId) -> LiveId {
        self.dom.borrow_mut().ensure_template_contents(*target)
    }

    fn same_node(&self, x: &LiveId, y: &LiveId) -> bool {
        x == y
    }

    fn set_quirks_mode(&mut self, mode: QuirksMode) {
        log::trace!(target: "html_stream.engine", "quirks mode: {mode:?}");
    }

    fn append_before_sibling(&mut self, sibling: &LiveId, new_node: NodeOrText<LiveId>) {
        let mut dom = self.dom.borrow_mut();
        match new_node {
            NodeOrText::AppendNode(node) => dom.insert_before_sibling(*sibling, node),
            NodeOrText::AppendText(text) => dom.insert_text_before(*sibling, text),
        }
    }

    fn add_attrs_if_missing(&mut self, target: &LiveId, attrs: Vec<Attribute>) {
        self.dom.borrow_mut().add_attrs_if_missing(*target, attrs);
    }

    fn remove_from_parent(&mut self, target: &LiveId) {
        self.dom.borrow_mut().detach(*target);
    }

    fn reparent_children(&mut self, node: &LiveId, new_parent: &LiveId) {
        self.dom.borrow_mut().reparent_children(*node, *new_parent);
    }

    fn is_mathml_annotation_xml_integration_point(&self, handle: &LiveId) -> bool {
        self.integration_points.contains(handle)
    }
}
