use crate::changes::{ChangeId, ChangeSet, StructuralChange};
use crate::visitor::{ChangeVisitor, VisitFlow};

/// Decides which part of the log a [`SelectiveVisitor`] forwards.
pub trait Selection {
    /// Ends the walk before `change_set` is visited.
    fn is_finished(&self, change_set: &ChangeSet) -> bool;

    /// Skips a single change; the walk continues.
    fn should_process(&self, change_id: ChangeId, change: &StructuralChange) -> bool;
}

/// Forwards to an inner visitor only what the selection lets through.
pub struct SelectiveVisitor<'s, V, S: ?Sized> {
    inner: V,
    selection: &'s S,
}

impl<'s, V, S> SelectiveVisitor<'s, V, S>
where
    V: ChangeVisitor,
    S: Selection + ?Sized,
{
    pub fn new(inner: V, selection: &'s S) -> Self {
        Self { inner, selection }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<V, S> ChangeVisitor for SelectiveVisitor<'_, V, S>
where
    V: ChangeVisitor,
    S: Selection + ?Sized,
{
    type Error = V::Error;

    fn begin(&mut self, change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
        if self.selection.is_finished(change_set) {
            return Ok(VisitFlow::Stop);
        }
        self.inner.begin(change_set)
    }

    fn visit(
        &mut self,
        change_id: ChangeId,
        change: &StructuralChange,
    ) -> Result<VisitFlow, Self::Error> {
        if !self.selection.should_process(change_id, change) {
            return Ok(VisitFlow::Continue);
        }
        self.inner.visit(change_id, change)
    }

    fn end(&mut self, change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
        self.inner.end(change_set)
    }
}
