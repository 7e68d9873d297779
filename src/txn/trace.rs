use crate::query::{BindingSet, TupleExpr};

/// One logical read, kept so it can be replayed against another
/// transaction's changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOperation {
    pub expr: TupleExpr,
    pub bindings: BindingSet,
    pub include_inferred: bool,
}

impl ReadOperation {
    pub fn new(expr: TupleExpr, bindings: BindingSet, include_inferred: bool) -> Self {
        Self {
            expr,
            bindings,
            include_inferred,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReadTrace {
    ops: Vec<ReadOperation>,
}

impl ReadTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, op: ReadOperation) {
        self.ops.push(op);
    }

    pub fn drain(&mut self) -> Vec<ReadOperation> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadOperation> {
        self.ops.iter()
    }
}
