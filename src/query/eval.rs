use crate::core::errors::StoreError;
use crate::core::record::Record;
use crate::query::bindings::BindingSet;
use crate::query::expr::{ExternalRecords, StatementPattern, TupleExpr};
use crate::storage::Store;

/// Nested-loop evaluation of `expr` against `store`. Bindings produced by the
/// left side of a join are pushed into the right side, so each pattern is
/// matched with as many positions fixed as possible.
pub fn evaluate<S>(
    store: &S,
    expr: &TupleExpr,
    bindings: &BindingSet,
    include_inferred: bool,
) -> Result<Vec<BindingSet>, StoreError>
where
    S: Store + ?Sized,
{
    match expr {
        TupleExpr::Pattern(sp) => match_pattern(store, sp, bindings, include_inferred, &[]),
        TupleExpr::Without { pattern, records } => {
            match_pattern(store, pattern, bindings, include_inferred, records)
        }
        TupleExpr::Records(external) => Ok(match_external(external, bindings)),
        TupleExpr::Join(left, right) => {
            let mut out = Vec::new();
            for row in evaluate(store, left, bindings, include_inferred)? {
                out.extend(evaluate(store, right, &row, include_inferred)?);
            }
            Ok(out)
        }
        TupleExpr::LeftJoin {
            left,
            right,
            condition,
        } => {
            let mut out = Vec::new();
            for row in evaluate(store, left, bindings, include_inferred)? {
                let extended: Vec<BindingSet> = evaluate(store, right, &row, include_inferred)?
                    .into_iter()
                    .filter(|r| condition.as_ref().map_or(true, |c| c.holds(r)))
                    .collect();
                if extended.is_empty() {
                    out.push(row);
                } else {
                    out.extend(extended);
                }
            }
            Ok(out)
        }
        TupleExpr::Union(left, right) => {
            let mut out = evaluate(store, left, bindings, include_inferred)?;
            out.extend(evaluate(store, right, bindings, include_inferred)?);
            Ok(out)
        }
        TupleExpr::Filter { input, condition } => {
            Ok(evaluate(store, input, bindings, include_inferred)?
                .into_iter()
                .filter(|row| condition.holds(row))
                .collect())
        }
    }
}

fn match_pattern<S>(
    store: &S,
    sp: &StatementPattern,
    bindings: &BindingSet,
    include_inferred: bool,
    excluded: &[Record],
) -> Result<Vec<BindingSet>, StoreError>
where
    S: Store + ?Sized,
{
    let candidates = store.match_records(&sp.to_record_pattern(bindings), include_inferred)?;
    Ok(candidates
        .iter()
        .filter(|record| !excluded.contains(record))
        .filter_map(|record| sp.bind(record, bindings))
        .collect())
}

fn match_external(external: &ExternalRecords, bindings: &BindingSet) -> Vec<BindingSet> {
    external
        .records
        .iter()
        .filter_map(|record| external.pattern.bind(record, bindings))
        .filter_map(|row| row.merged(&external.extra))
        .collect()
}
