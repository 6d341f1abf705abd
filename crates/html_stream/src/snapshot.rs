use crate::node::Node;
use crate::unit::{ElementData, ElementNamespace, OtherNode};
use std::borrow::Cow;
use std::fmt::{self, Write};

/// Deterministic line rendering and structural comparison of [`Node`] trees,
/// for parity tests. Not a stable format.
///
/// Equivalence rules:
/// - Node kinds must match.
/// - Element names and namespaces must match.
/// - Attribute order is significant; names and values must match.
/// - Adjacent text siblings are compared as one run unless
///   `merge_adjacent_text` is off. The run text must match exactly.
/// - Template content is compared as a separate child list.
///
/// Walking and comparison use explicit stacks, so tree depth is bounded by
/// memory only.
#[derive(Clone, Copy, Debug)]
pub struct DomSnapshotOptions {
    pub ignore_comments: bool,
    pub include_template_content: bool,
    pub merge_adjacent_text: bool,
}

impl Default for DomSnapshotOptions {
    fn default() -> Self {
        Self {
            ignore_comments: false,
            include_template_content: true,
            merge_adjacent_text: true,
        }
    }
}

#[derive(Debug)]
pub struct DomSnapshot {
    lines: Vec<String>,
}

impl DomSnapshot {
    pub fn new(root: &Node, options: DomSnapshotOptions) -> Self {
        Self {
            lines: walk_snapshot(root, &options),
        }
    }

    pub fn as_lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for DomSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug)]
pub struct DomMismatch {
    path: String,
    detail: String,
    expected: String,
    actual: String,
    diff: String,
}

impl DomMismatch {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for DomMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DOM mismatch at {}: {}", self.path, self.detail)?;
        writeln!(f, "expected: {}", self.expected)?;
        writeln!(f, "actual:   {}", self.actual)?;
        write!(f, "{}", self.diff)
    }
}

impl std::error::Error for DomMismatch {}

pub fn assert_dom_eq(expected: &Node, actual: &Node, options: DomSnapshotOptions) {
    if let Err(mismatch) = compare_dom(expected, actual, options) {
        panic!("{mismatch}");
    }
}

/// A child as seen by comparison: a node, or a run of adjacent text.
#[derive(Clone, Debug)]
enum Entry<'a> {
    Node(&'a Node),
    Text(Cow<'a, str>),
}

impl Entry<'_> {
    fn label(&self) -> String {
        match self {
            Entry::Node(node) => node_label(node),
            Entry::Text(_) => "#text".to_string(),
        }
    }

    fn write_line(&self, out: &mut String) {
        match self {
            Entry::Node(node) => write_node_line(out, node),
            Entry::Text(text) => write_text(out, text),
        }
    }

    fn snapshot_lines(&self, options: &DomSnapshotOptions) -> Vec<String> {
        match self {
            Entry::Node(node) => walk_snapshot(node, options),
            Entry::Text(_) => {
                let mut line = String::new();
                self.write_line(&mut line);
                vec![line]
            }
        }
    }
}

fn entries<'a>(nodes: &'a [Node], options: &DomSnapshotOptions) -> Vec<Entry<'a>> {
    let mut out: Vec<Entry<'a>> = Vec::with_capacity(nodes.len());
    for node in nodes.iter().filter(|n| keep(n, options)) {
        let Node::Text { text } = node else {
            out.push(Entry::Node(node));
            continue;
        };
        if options.merge_adjacent_text
            && let Some(Entry::Text(run)) = out.last_mut()
        {
            run.to_mut().push_str(text);
            continue;
        }
        out.push(Entry::Text(Cow::Borrowed(text)));
    }
    out
}

/// One path segment of the comparison; segments form a tree through `parent`.
struct Step {
    parent: Option<usize>,
    label: String,
}

fn render_path(steps: &[Step], mut step: usize) -> String {
    let mut labels = Vec::new();
    loop {
        labels.push(steps[step].label.as_str());
        match steps[step].parent {
            Some(parent) => step = parent,
            None => break,
        }
    }
    labels.reverse();
    format!("/{}", labels.join("/"))
}

struct Comparison<'a> {
    options: DomSnapshotOptions,
    steps: Vec<Step>,
    pending: Vec<(Entry<'a>, Entry<'a>, usize)>,
}

impl<'a> Comparison<'a> {
    fn mismatch(&self, step: usize, detail: &str, expected: &Entry<'_>, actual: &Entry<'_>) -> Box<DomMismatch> {
        let mut expected_line = String::new();
        expected.write_line(&mut expected_line);
        let mut actual_line = String::new();
        actual.write_line(&mut actual_line);
        Box::new(DomMismatch {
            path: render_path(&self.steps, step),
            detail: detail.to_string(),
            expected: truncate_line(expected_line, 160),
            actual: truncate_line(actual_line, 160),
            diff: diff_lines(
                &expected.snapshot_lines(&self.options),
                &actual.snapshot_lines(&self.options),
            ),
        })
    }

    /// Queue the pairwise comparison of two child lists under `step`.
    fn queue_children(
        &mut self,
        step: usize,
        parents: (&Entry<'_>, &Entry<'_>),
        expected: &'a [Node],
        actual: &'a [Node],
    ) -> Result<(), Box<DomMismatch>> {
        let expected = entries(expected, &self.options);
        let actual = entries(actual, &self.options);
        if expected.len() != actual.len() {
            let detail = format!(
                "child count (expected {}, actual {})",
                expected.len(),
                actual.len()
            );
            return Err(self.mismatch(step, &detail, parents.0, parents.1));
        }
        let first = self.steps.len();
        for (idx, entry) in expected.iter().enumerate() {
            self.steps.push(Step {
                parent: Some(step),
                label: format!("{}[{}]", entry.label(), idx),
            });
        }
        let pairs = expected.into_iter().zip(actual).enumerate();
        self.pending
            .extend(pairs.rev().map(|(idx, (exp, act))| (exp, act, first + idx)));
        Ok(())
    }

    fn compare(&mut self, expected: Entry<'a>, actual: Entry<'a>, step: usize) -> Result<(), Box<DomMismatch>> {
        let (e, a) = match (&expected, &actual) {
            (Entry::Text(e), Entry::Text(a)) if e == a => return Ok(()),
            (Entry::Node(e), Entry::Node(a)) => (*e, *a),
            (Entry::Text(_), Entry::Text(_)) => return Err(self.mismatch(step, "text", &expected, &actual)),
            _ => return Err(self.mismatch(step, "node kind or content", &expected, &actual)),
        };
        match (e, a) {
            (Node::Fragment { children: e_children }, Node::Fragment { children: a_children }) => {
                self.queue_children(step, (&expected, &actual), e_children, a_children)
            }
            (
                Node::Element {
                    element: e_element,
                    content: e_content,
                    children: e_children,
                },
                Node::Element {
                    element: a_element,
                    content: a_content,
                    children: a_children,
                },
            ) => {
                if e_element != a_element {
                    return Err(self.mismatch(step, "element", &expected, &actual));
                }
                self.queue_children(step, (&expected, &actual), e_children, a_children)?;
                if !self.options.include_template_content {
                    return Ok(());
                }
                match (e_content, a_content) {
                    (Some(e_content), Some(a_content)) => {
                        let content = self.steps.len();
                        self.steps.push(Step {
                            parent: Some(step),
                            label: "#content".to_string(),
                        });
                        self.queue_children(content, (&expected, &actual), e_content, a_content)
                    }
                    (None, None) => Ok(()),
                    _ => Err(self.mismatch(step, "template content presence", &expected, &actual)),
                }
            }
            (Node::Text { text: e_text }, Node::Text { text: a_text }) if e_text == a_text => Ok(()),
            (Node::Other(e_other), Node::Other(a_other)) if e_other == a_other => Ok(()),
            (Node::Text { .. }, Node::Text { .. }) => Err(self.mismatch(step, "text", &expected, &actual)),
            _ => Err(self.mismatch(step, "node kind or content", &expected, &actual)),
        }
    }
}

pub fn compare_dom(expected: &Node, actual: &Node, options: DomSnapshotOptions) -> Result<(), Box<DomMismatch>> {
    let mut comparison = Comparison {
        options,
        steps: vec![Step {
            parent: None,
            label: node_label(expected),
        }],
        pending: vec![(Entry::Node(expected), Entry::Node(actual), 0)],
    };
    while let Some((expected, actual, step)) = comparison.pending.pop() {
        comparison.compare(expected, actual, step)?;
    }
    Ok(())
}

/// Unified-style diff of two line lists; empty when they are equal.
pub fn diff_lines(expected: &[String], actual: &[String]) -> String {
    if expected == actual {
        return String::new();
    }
    let mut out = String::new();
    let max = expected.len().max(actual.len());
    for idx in 0..max {
        match (expected.get(idx), actual.get(idx)) {
            (Some(e), Some(a)) if e == a => {
                let _ = writeln!(out, "  {e}");
            }
            (e, a) => {
                if let Some(e) = e {
                    let _ = writeln!(out, "- {e}");
                }
                if let Some(a) = a {
                    let _ = writeln!(out, "+ {a}");
                }
            }
        }
    }
    out
}

fn keep(node: &Node, options: &DomSnapshotOptions) -> bool {
    !(options.ignore_comments && matches!(node, Node::Other(OtherNode::Comment(_))))
}

fn node_label(node: &Node) -> String {
    match node {
        Node::Fragment { .. } => "#fragment".to_string(),
        Node::Element { element, .. } => {
            let mut label = String::from(element.name.as_ref());
            if let Some(id) = element.attribute("id").filter(|v| !v.is_empty()) {
                label.push('#');
                write_escaped(&mut label, id);
            }
            label
        }
        Node::Text { .. } => "#text".to_string(),
        Node::Other(OtherNode::Comment(_)) => "#comment".to_string(),
        Node::Other(OtherNode::Doctype { .. }) => "#doctype".to_string(),
        Node::Other(OtherNode::ProcessingInstruction { .. }) => "#pi".to_string(),
    }
}

fn truncate_line(mut line: String, max_len: usize) -> String {
    if line.len() > max_len {
        let mut cut = max_len.saturating_sub(3);
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
        line.push_str("...");
    }
    line
}

enum SnapshotItem<'a> {
    Entry(Entry<'a>, usize),
    Content(usize),
}

fn walk_snapshot(root: &Node, options: &DomSnapshotOptions) -> Vec<String> {
    let mut out = Vec::new();
    if !keep(root, options) {
        return out;
    }
    let mut stack = vec![SnapshotItem::Entry(Entry::Node(root), 0)];
    while let Some(item) = stack.pop() {
        let (entry, depth) = match item {
            SnapshotItem::Content(depth) => {
                out.push(format!("{}#content", " ".repeat(depth * 2)));
                continue;
            }
            SnapshotItem::Entry(entry, depth) => (entry, depth),
        };
        let mut line = " ".repeat(depth * 2);
        entry.write_line(&mut line);
        out.push(line);
        let Entry::Node(node) = entry else {
            continue;
        };
        let children = entries(node.children(), options);
        stack.extend(children.into_iter().rev().map(|child| SnapshotItem::Entry(child, depth + 1)));
        if let Node::Element {
            content: Some(content),
            ..
        } = node
            && options.include_template_content
        {
            let content = entries(content, options);
            stack.extend(content.into_iter().rev().map(|child| SnapshotItem::Entry(child, depth + 2)));
            stack.push(SnapshotItem::Content(depth + 1));
        }
    }
    out
}

fn write_node_line(out: &mut String, node: &Node) {
    match node {
        Node::Fragment { .. } => out.push_str("#fragment"),
        Node::Element { element, .. } => write_element(out, element),
        Node::Text { text } => write_text(out, text),
        Node::Other(OtherNode::Comment(text)) => {
            out.push_str("<!-- ");
            write_escaped(out, text);
            out.push_str(" -->");
        }
        Node::Other(OtherNode::Doctype { name, .. }) => {
            out.push_str("<!DOCTYPE ");
            write_escaped(out, name);
            out.push('>');
        }
        Node::Other(OtherNode::ProcessingInstruction { target, data }) => {
            out.push_str("<?");
            write_escaped(out, target);
            out.push(' ');
            write_escaped(out, data);
            out.push('>');
        }
    }
}

fn write_text(out: &mut String, text: &str) {
    out.push('"');
    write_escaped(out, text);
    out.push('"');
}

fn write_element(out: &mut String, element: &ElementData) {
    out.push('<');
    match &element.namespace {
        ElementNamespace::Html => {}
        ElementNamespace::Svg => out.push_str("svg "),
        ElementNamespace::MathMl => out.push_str("math "),
        ElementNamespace::Other(ns) => {
            let _ = write!(out, "{{{ns}}} ");
        }
    }
    out.push_str(&element.name);
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        write_escaped(out, value);
        out.push('"');
    }
    out.push('>');
}

fn write_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ if ch.is_ascii() => out.push(ch),
            _ => {
                let _ = write!(out, "\\u{{{:X}}}", ch as u32);
            }
        }
    }
}
