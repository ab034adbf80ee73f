mod change_visitor;
mod revertion_visitor;
mod selective_visitor;

pub use change_visitor::{ChangeVisitor, VisitFlow};
pub use revertion_visitor::RevertionVisitor;
pub use selective_visitor::{Selection, SelectiveVisitor};
