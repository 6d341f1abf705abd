use crate::error::TargetError;
use html_stream::MirrorNode;

/// A tree that emission units can be replayed into.
///
/// `insert_before` must move `child` when it already has a parent, mirroring
/// DOM `insertBefore` semantics.
pub trait ReplayTarget {
    type Handle: Clone;

    /// Container that units with `parent: None` are inserted into.
    fn root(&self) -> Self::Handle;

    /// Create a detached node for a mirror seen for the first time.
    fn create(&mut self, node: &MirrorNode) -> Result<Self::Handle, TargetError>;

    /// Content container of a template created by `create`.
    fn template_content(&mut self, template: &Self::Handle) -> Result<Self::Handle, TargetError>;

    fn insert_before(
        &mut self,
        parent: &Self::Handle,
        child: &Self::Handle,
        before: Option<&Self::Handle>,
    ) -> Result<(), TargetError>;
}
