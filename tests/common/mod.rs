#![allow(dead_code)]

use std::sync::Arc;

use optiquad::{
    BindingSet, MemoryStore, OptimisticStore, Record, RecordPattern, Session, Slot, StoreConfig,
    Term, TupleExpr,
};

pub fn iri(name: &str) -> Term {
    Term::iri(name)
}

pub fn rec(s: &str, p: &str, o: &str) -> Record {
    Record::new(iri(s), iri(p), iri(o))
}

pub fn year(painting: &str, year: i64) -> Record {
    Record::new(iri(painting), iri("year"), Term::Integer(year))
}

pub fn var(name: &str) -> Slot {
    Slot::var(name)
}

pub fn val(name: &str) -> Slot {
    Slot::value(iri(name))
}

pub fn open(config: StoreConfig) -> (Arc<MemoryStore>, OptimisticStore) {
    let memory = Arc::new(MemoryStore::new());
    let store = OptimisticStore::new(memory.clone(), config);
    (memory, store)
}

pub fn open_default() -> (Arc<MemoryStore>, OptimisticStore) {
    open(StoreConfig::default())
}

/// Session with auto-commit off, so a transaction is always open.
pub fn manual_session(store: &OptimisticStore) -> Session {
    let mut session = store.open_session();
    session.set_auto_commit(false).unwrap();
    session
}

pub fn total(session: &Session) -> usize {
    session.count(&RecordPattern::any(), false).unwrap()
}

/// Values of `name` across `rows`, skipping rows where it is unbound.
pub fn values(rows: &[BindingSet], name: &str) -> Vec<Term> {
    rows.iter().filter_map(|row| row.get(name).cloned()).collect()
}

/// `[a painter] paints ?painting`
pub fn paintings_of_painters() -> TupleExpr {
    TupleExpr::join(
        TupleExpr::pattern(var("painter"), val("type"), val("Painter")),
        TupleExpr::pattern(var("painter"), val("paints"), var("painting")),
    )
}

pub fn seed_rembrandt(session: &mut Session) {
    for record in [
        rec("rembrandt", "type", "Painter"),
        rec("rembrandt", "paints", "nightwatch"),
        rec("rembrandt", "paints", "artemisia"),
        rec("rembrandt", "paints", "danae"),
    ] {
        session.add(record).unwrap();
    }
}
