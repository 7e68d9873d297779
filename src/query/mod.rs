pub mod basic;
pub mod bindings;
pub mod eval;
pub mod expr;
pub mod merge;

pub use basic::basic_nodes;
pub use bindings::BindingSet;
pub use eval::evaluate;
pub use expr::{
    CompareOp, Condition, ExternalRecords, Operand, PatternContext, Slot, StatementPattern,
    TupleExpr,
};
pub use merge::{is_marked, DeltaMerger, DELTA_MARKER};
