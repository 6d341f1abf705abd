use crate::unit::{ElementData, OtherNode};

/// Owned tree used to compare a replayed stream against a direct parse.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Fragment {
        children: Vec<Node>,
    },
    Element {
        element: ElementData,
        /// Template content; `None` for every other element.
        content: Option<Vec<Node>>,
        children: Vec<Node>,
    },
    Text {
        text: String,
    },
    Other(OtherNode),
}

impl Node {
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Fragment { children } | Node::Element { children, .. } => children,
            Node::Text { .. } | Node::Other(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Fragment { children } | Node::Element { children, .. } => Some(children),
            Node::Text { .. } | Node::Other(_) => None,
        }
    }

    pub fn content_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Element {
                content: Some(content),
                ..
            } => Some(content),
            _ => None,
        }
    }

    pub fn element_name(&self) -> Option<&str> {
        match self {
            Node::Element { element, .. } => Some(&element.name),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants, template content
    /// excluded.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                Node::Text { text } => out.push_str(text),
                Node::Fragment { children } | Node::Element { children, .. } => {
                    stack.extend(children.iter().rev());
                }
                Node::Other(_) => {}
            }
        }
        out
    }
}

// Deep trees must not recurse on drop.
impl Drop for Node {
    fn drop(&mut self) {
        let mut stack = Vec::new();
        take_lists(self, &mut stack);
        while let Some(mut node) = stack.pop() {
            take_lists(&mut node, &mut stack);
        }
    }
}

fn take_lists(node: &mut Node, out: &mut Vec<Node>) {
    if let Some(content) = node.content_mut() {
        out.append(content);
    }
    if let Some(children) = node.children_mut() {
        out.append(children);
    }
}

/// A node with its child lists still unbuilt, as produced by [`assemble`].
pub struct NodeShell<K> {
    /// Node with empty child lists (and `Some(vec![])` content for templates).
    pub node: Node,
    pub content: Vec<K>,
    pub children: Vec<K>,
}

#[derive(Clone, Copy)]
enum Slot {
    Content,
    Children,
}

/// Build an owned tree from any node store without recursion.
///
/// `shell` describes one node and the keys of its template content and
/// children. Nodes are laid out in pre-order, then attached to their owners
/// from the last one back, so every list is complete before its owner moves.
pub fn assemble<K>(root: K, mut shell: impl FnMut(K) -> NodeShell<K>) -> Node {
    let mut laid_out: Vec<(Option<(usize, Slot)>, Node)> = Vec::new();
    let mut stack = vec![(root, None)];
    while let Some((key, owner)) = stack.pop() {
        let index = laid_out.len();
        let NodeShell {
            node,
            content,
            children,
        } = shell(key);
        laid_out.push((owner, node));
        for child in children.into_iter().rev() {
            stack.push((child, Some((index, Slot::Children))));
        }
        for child in content.into_iter().rev() {
            stack.push((child, Some((index, Slot::Content))));
        }
    }

    while let Some((owner, mut node)) = laid_out.pop() {
        // Lists were filled last sibling first.
        if let Some(content) = node.content_mut() {
            content.reverse();
        }
        if let Some(children) = node.children_mut() {
            children.reverse();
        }
        let Some((index, slot)) = owner else {
            return node;
        };
        let list = match slot {
            Slot::Content => laid_out[index].1.content_mut(),
            Slot::Children => laid_out[index].1.children_mut(),
        };
        if let Some(list) = list {
            list.push(node);
        }
    }
    Node::Fragment {
        children: Vec::new(),
    }
}
