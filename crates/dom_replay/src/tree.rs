use crate::error::TargetError;
use crate::target::ReplayTarget;
use html_stream::node::{NodeShell, assemble};
use html_stream::{ElementData, MirrorKind, MirrorNode, Node, OtherNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeHandle(usize);

/// In-memory arena target. Validates every insertion and can be materialized
/// into a [`Node`] for comparison with a direct parse.
#[derive(Debug)]
pub struct ReplayTree {
    nodes: Vec<TreeNode>,
}

#[derive(Debug)]
struct TreeNode {
    kind: TreeKind,
    parent: Option<TreeHandle>,
    children: Vec<TreeHandle>,
}

#[derive(Debug)]
enum TreeKind {
    Root,
    Fragment,
    Element {
        element: ElementData,
        content: Option<TreeHandle>,
        script: Option<ScriptState>,
    },
    Text(String),
    Other(OtherNode),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptState {
    NotStarted,
    Started,
}

impl TreeNode {
    fn new(kind: TreeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }

    fn allows_children(&self) -> bool {
        matches!(
            self.kind,
            TreeKind::Root | TreeKind::Fragment | TreeKind::Element { .. }
        )
    }
}

impl Default for ReplayTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayTree {
    const ROOT: TreeHandle = TreeHandle(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new(TreeKind::Root)],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn parent(&self, handle: TreeHandle) -> Option<TreeHandle> {
        self.nodes.get(handle.0).and_then(|node| node.parent)
    }

    pub fn children(&self, handle: TreeHandle) -> &[TreeHandle] {
        self.nodes
            .get(handle.0)
            .map_or(&[], |node| node.children.as_slice())
    }

    /// Scripts attached under the root that have not run yet, in tree order.
    pub fn pending_scripts(&self) -> Vec<TreeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(handle) = stack.pop() {
            let node = &self.nodes[handle.0];
            if let TreeKind::Element {
                script: Some(ScriptState::NotStarted),
                ..
            } = node.kind
            {
                out.push(handle);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    pub fn mark_script_started(&mut self, handle: TreeHandle) -> Result<(), TargetError> {
        match self.nodes.get_mut(handle.0).map(|node| &mut node.kind) {
            Some(TreeKind::Element {
                script: Some(state), ..
            }) => {
                *state = ScriptState::Started;
                Ok(())
            }
            Some(_) => Err(TargetError::WrongNodeKind),
            None => Err(TargetError::UnknownHandle),
        }
    }

    /// The root's children as a fragment.
    pub fn materialize(&self) -> Node {
        assemble(Self::ROOT, |handle| self.shell(handle))
    }

    fn shell(&self, handle: TreeHandle) -> NodeShell<TreeHandle> {
        let node = &self.nodes[handle.0];
        let (built, content) = match &node.kind {
            TreeKind::Root | TreeKind::Fragment => (
                Node::Fragment {
                    children: Vec::new(),
                },
                Vec::new(),
            ),
            TreeKind::Element {
                element, content, ..
            } => (
                Node::Element {
                    element: element.clone(),
                    content: content.map(|_| Vec::new()),
                    children: Vec::new(),
                },
                content.map_or_else(Vec::new, |content| self.nodes[content.0].children.clone()),
            ),
            TreeKind::Text(text) => (Node::Text { text: text.clone() }, Vec::new()),
            TreeKind::Other(other) => (Node::Other(other.clone()), Vec::new()),
        };
        NodeShell {
            node: built,
            content,
            children: node.children.clone(),
        }
    }

    fn push(&mut self, kind: TreeKind) -> TreeHandle {
        let handle = TreeHandle(self.nodes.len());
        self.nodes.push(TreeNode::new(kind));
        handle
    }

    fn check(&self, handle: TreeHandle) -> Result<(), TargetError> {
        if handle.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TargetError::UnknownHandle)
        }
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_inclusive_ancestor(&self, ancestor: TreeHandle, node: TreeHandle) -> bool {
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.nodes[handle.0].parent;
        }
        false
    }

    fn detach(&mut self, child: TreeHandle) {
        if let Some(parent) = self.nodes[child.0].parent.take() {
            let siblings = &mut self.nodes[parent.0].children;
            if let Some(index) = siblings.iter().rposition(|&c| c == child) {
                siblings.remove(index);
            }
        }
    }
}

impl ReplayTarget for ReplayTree {
    type Handle = TreeHandle;

    fn root(&self) -> TreeHandle {
        Self::ROOT
    }

    fn create(&mut self, node: &MirrorNode) -> Result<TreeHandle, TargetError> {
        let kind = match &node.kind {
            MirrorKind::Text(text) => TreeKind::Text(text.clone()),
            MirrorKind::Element(element) => TreeKind::Element {
                element: element.clone(),
                content: None,
                script: None,
            },
            MirrorKind::Template { element, .. } => {
                let content = self.push(TreeKind::Fragment);
                TreeKind::Element {
                    element: element.clone(),
                    content: Some(content),
                    script: None,
                }
            }
            MirrorKind::Script(element) => TreeKind::Element {
                element: element.clone(),
                content: None,
                script: Some(ScriptState::NotStarted),
            },
            MirrorKind::Other(other) => TreeKind::Other(other.clone()),
        };
        Ok(self.push(kind))
    }

    fn template_content(&mut self, template: &TreeHandle) -> Result<TreeHandle, TargetError> {
        self.check(*template)?;
        match self.nodes[template.0].kind {
            TreeKind::Element {
                content: Some(content),
                ..
            } => Ok(content),
            _ => Err(TargetError::WrongNodeKind),
        }
    }

    fn insert_before(
        &mut self,
        parent: &TreeHandle,
        child: &TreeHandle,
        before: Option<&TreeHandle>,
    ) -> Result<(), TargetError> {
        let (parent, child) = (*parent, *child);
        self.check(parent)?;
        self.check(child)?;
        if child == Self::ROOT {
            return Err(TargetError::InvalidParent);
        }
        if !self.nodes[parent.0].allows_children() {
            return Err(TargetError::InvalidParent);
        }
        // Only a node with children can be a proper ancestor.
        let may_contain = !self.nodes[child.0].children.is_empty();
        if child == parent || (may_contain && self.is_inclusive_ancestor(child, parent)) {
            return Err(TargetError::CycleDetected);
        }
        if let Some(&before) = before {
            self.check(before)?;
            if before == child || self.nodes[before.0].parent != Some(parent) {
                return Err(TargetError::InvalidSibling);
            }
        }
        self.detach(child);
        let siblings = &mut self.nodes[parent.0].children;
        let index = match before {
            Some(before) => siblings
                .iter()
                .rposition(|c| c == before)
                .ok_or(TargetError::InvalidSibling)?,
            None => siblings.len(),
        };
        siblings.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }
}
