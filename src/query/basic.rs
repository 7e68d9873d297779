use crate::query::expr::TupleExpr;

/// Maximal subtrees of `expr` whose result can only grow when records are
/// added and only shrink when records are removed.
///
/// A pending change can only flip such a subtree's answer by producing or
/// consuming a row built from a changed record, which is exactly what the
/// marker test detects. Non-monotone nodes (conditional optionals, and filters
/// over optionals where `!bound(..)` can turn a lost match into a new row) are
/// descended into instead, so their monotone parts are still checked.
pub fn basic_nodes(expr: &TupleExpr) -> Vec<TupleExpr> {
    let judge = Judge {
        filters_allowed: !expr.contains_left_join(),
    };
    let mut out = Vec::new();
    judge.collect(expr, &mut out);
    out
}

struct Judge {
    filters_allowed: bool,
}

impl Judge {
    fn collect(&self, expr: &TupleExpr, out: &mut Vec<TupleExpr>) {
        if self.is_basic(expr) {
            out.push(expr.clone());
            return;
        }
        for child in expr.children() {
            self.collect(child, out);
        }
    }

    fn is_basic(&self, expr: &TupleExpr) -> bool {
        match expr {
            TupleExpr::Pattern(_) | TupleExpr::Records(_) | TupleExpr::Without { .. } => true,
            TupleExpr::Join(l, r) | TupleExpr::Union(l, r) => self.is_basic(l) && self.is_basic(r),
            TupleExpr::LeftJoin {
                left,
                right,
                condition: None,
            } => self.is_basic(left) && self.is_basic(right),
            TupleExpr::LeftJoin { .. } => false,
            TupleExpr::Filter { input, .. } => self.filters_allowed && self.is_basic(input),
        }
    }
}
