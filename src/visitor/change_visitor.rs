use crate::changes::{ChangeId, ChangeSet, StructuralChange};

/// Whether a walk over the log goes on after the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Continue,
    Stop,
}

/// Receives the log newest change set first.
///
/// A step returning [`VisitFlow::Stop`] ends the walk without an error; a
/// step returning `Err` ends it with that error.
pub trait ChangeVisitor {
    type Error;

    fn begin(&mut self, _change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
        Ok(VisitFlow::Continue)
    }

    fn visit(
        &mut self,
        _change_id: ChangeId,
        _change: &StructuralChange,
    ) -> Result<VisitFlow, Self::Error> {
        Ok(VisitFlow::Continue)
    }

    fn end(&mut self, _change_set: &ChangeSet) -> Result<VisitFlow, Self::Error> {
        Ok(VisitFlow::Continue)
    }
}
