//! Rewrites a query so that it also ranges over a set of pending changes.
//!
//! Every statement pattern `p` becomes `Records(p, plus, extra) ∪ Without(p, minus)`,
//! where `plus`/`minus` are the pending records that `p` could match under the
//! bindings the read was issued with. A `Without(p, hidden)` node left by an
//! earlier merge is rewritten the same way, never offering back a record it
//! hides. Patterns no pending record can match are left untouched, and when
//! nothing in the tree is touched the merger reports the expression as
//! unmodified so the caller can skip evaluating it.

use crate::core::record::{Record, RecordSet, Term};
use crate::query::bindings::BindingSet;
use crate::query::expr::{ExternalRecords, StatementPattern, TupleExpr};

/// Variable bound on every row produced from pending records during
/// validation.
pub const DELTA_MARKER: &str = "-delta-";

/// True when `row` was produced from at least one pending record.
pub fn is_marked(row: &BindingSet) -> bool {
    row.has_binding(DELTA_MARKER)
}

#[derive(Debug, Default)]
pub struct DeltaMerger<'a> {
    union: Vec<&'a RecordSet>,
    subtract: Vec<&'a RecordSet>,
    extra: BindingSet,
}

impl<'a> DeltaMerger<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that should appear as if they were in the store.
    pub fn union_with(mut self, records: &'a RecordSet) -> Self {
        self.union.push(records);
        self
    }

    /// Records that should be hidden from the store side.
    pub fn subtract(mut self, records: &'a RecordSet) -> Self {
        self.subtract.push(records);
        self
    }

    /// Binds [`DELTA_MARKER`] on every row produced from the union side.
    pub fn tagged(mut self) -> Self {
        self.extra.insert(DELTA_MARKER, Term::literal(DELTA_MARKER));
        self
    }

    /// Returns the rewritten expression, or `None` when no pending record can
    /// affect any pattern in `expr`.
    pub fn merge(&self, expr: &TupleExpr, bindings: &BindingSet) -> Option<TupleExpr> {
        match expr {
            TupleExpr::Pattern(sp) => self.merge_pattern(sp, &[], bindings),
            TupleExpr::Without { pattern, records } => {
                self.merge_pattern(pattern, records, bindings)
            }
            TupleExpr::Join(left, right) => {
                let (l, r) = self.merge_pair(left, right, bindings)?;
                Some(TupleExpr::join(l, r))
            }
            TupleExpr::Union(left, right) => {
                let (l, r) = self.merge_pair(left, right, bindings)?;
                Some(TupleExpr::union(l, r))
            }
            TupleExpr::LeftJoin {
                left,
                right,
                condition,
            } => {
                let (l, r) = self.merge_pair(left, right, bindings)?;
                Some(TupleExpr::LeftJoin {
                    left: Box::new(l),
                    right: Box::new(r),
                    condition: condition.clone(),
                })
            }
            TupleExpr::Filter { input, condition } => {
                let input = self.merge(input, bindings)?;
                Some(TupleExpr::filter(input, condition.clone()))
            }
            // Already constant.
            TupleExpr::Records(_) => None,
        }
    }

    fn merge_pair(
        &self,
        left: &TupleExpr,
        right: &TupleExpr,
        bindings: &BindingSet,
    ) -> Option<(TupleExpr, TupleExpr)> {
        match (self.merge(left, bindings), self.merge(right, bindings)) {
            (None, None) => None,
            (l, r) => Some((
                l.unwrap_or_else(|| left.clone()),
                r.unwrap_or_else(|| right.clone()),
            )),
        }
    }

    /// `hidden` are records the store side already excludes.
    fn merge_pattern(
        &self,
        sp: &StatementPattern,
        hidden: &[Record],
        bindings: &BindingSet,
    ) -> Option<TupleExpr> {
        let mut plus = candidates(sp, bindings, &self.union);
        plus.retain(|record| !hidden.contains(record));
        let mut minus = candidates(sp, bindings, &self.subtract);
        minus.retain(|record| !hidden.contains(record));
        if plus.is_empty() && minus.is_empty() {
            return None;
        }

        let store_side = if minus.is_empty() && hidden.is_empty() {
            TupleExpr::Pattern(sp.clone())
        } else {
            minus.extend_from_slice(hidden);
            TupleExpr::Without {
                pattern: sp.clone(),
                records: minus,
            }
        };
        if plus.is_empty() {
            return Some(store_side);
        }
        let pending = TupleExpr::Records(ExternalRecords {
            pattern: sp.clone(),
            records: plus,
            extra: self.extra.clone(),
        });
        Some(TupleExpr::union(pending, store_side))
    }
}

/// Records from `sets` that `sp` can bind under `bindings`, deduplicated.
/// Bindings pushed down at evaluation time only narrow this further.
fn candidates(sp: &StatementPattern, bindings: &BindingSet, sets: &[&RecordSet]) -> Vec<Record> {
    let pattern = sp.to_record_pattern(bindings);
    let mut out = RecordSet::new();
    for set in sets {
        out.extend(
            pattern
                .filter(set)
                .filter(|record| sp.bind(record, bindings).is_some())
                .cloned(),
        );
    }
    out.into_iter().collect()
}
