use crate::core::errors::StoreError;
use crate::query::{is_marked, DeltaMerger};
use crate::storage::Store;

use super::delta::Delta;
use super::trace::ReadOperation;

/// Whether committing `explicit` (and `inferred`, for reads that saw
/// inferred records) could change the answer of `op`.
///
/// Every pending record, added or removed, is unioned into the read tagged
/// with the marker variable, and removed records are hidden from the store
/// side. A single marked row means some answer row was produced from a
/// changed record.
pub fn affects<S>(
    explicit: &Delta,
    inferred: &Delta,
    op: &ReadOperation,
    store: &S,
) -> Result<bool, StoreError>
where
    S: Store + ?Sized,
{
    let mut merger = DeltaMerger::new()
        .union_with(explicit.added())
        .union_with(explicit.removed())
        .subtract(explicit.removed());
    if op.include_inferred {
        merger = merger
            .union_with(inferred.added())
            .union_with(inferred.removed())
            .subtract(inferred.removed());
    }
    let Some(merged) = merger.tagged().merge(&op.expr, &op.bindings) else {
        return Ok(false);
    };
    let rows = store.evaluate(&merged, &op.bindings, op.include_inferred)?;
    Ok(rows.iter().any(is_marked))
}
