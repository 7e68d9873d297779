mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use optiquad::{
    ChangeEvent, ChangeListener, OptiQuadError, Record, RecordKind, RecordPattern, StoreConfig,
    Term, TxnState, LARGE_BLOCK,
};
use parking_lot::Mutex;

fn numbered(i: usize) -> Record {
    Record::new(iri("item"), iri("n"), Term::Integer(i as i64))
}

fn small_blocks() -> StoreConfig {
    StoreConfig::new().escalation_threshold(4)
}

#[test]
fn sole_transaction_escalates_at_threshold() {
    let (memory, store) = open(small_blocks());
    let mut session = manual_session(&store);
    for i in 0..3 {
        session.add(numbered(i)).unwrap();
    }
    assert_eq!(session.current_txn().state(), TxnState::Active);
    assert!(memory.is_empty());

    session.add(numbered(3)).unwrap();
    assert_eq!(session.current_txn().state(), TxnState::Exclusive);
    assert_eq!(store.exclusive_transaction(), Some(session.current_txn().id()));
    assert_eq!(memory.len(RecordKind::Explicit), 4);
    assert!(memory.in_store_txn());

    // writes now go straight through, and reads see them
    session.add(numbered(4)).unwrap();
    assert_eq!(memory.len(RecordKind::Explicit), 5);
    assert_eq!(total(&session), 5);
    assert_eq!(session.remove(&RecordPattern::any().object(Term::Integer(0))).unwrap(), 1);

    session.commit().unwrap();
    assert!(!memory.in_store_txn());
    assert_eq!(memory.len(RecordKind::Explicit), 4);
    assert_eq!(store.exclusive_transaction(), None);
    assert_eq!(session.current_txn().state(), TxnState::Active);
}

#[test]
fn default_threshold_is_one_large_block() {
    let (memory, store) = open_default();
    let mut session = manual_session(&store);
    for i in 0..LARGE_BLOCK - 1 {
        session.add(numbered(i)).unwrap();
    }
    assert!(!session.current_txn().is_exclusive());
    session.add(numbered(LARGE_BLOCK)).unwrap();
    assert!(session.current_txn().is_exclusive());
    assert_eq!(memory.len(RecordKind::Explicit), LARGE_BLOCK);
    session.commit().unwrap();
}

#[test]
fn escalation_is_refused_while_others_are_active() {
    let (memory, store) = open(small_blocks());
    let mut session = manual_session(&store);
    let _other = manual_session(&store);
    for i in 0..8 {
        session.add(numbered(i)).unwrap();
    }
    assert_eq!(session.current_txn().state(), TxnState::Active);
    assert!(memory.is_empty());
    session.commit().unwrap();
    assert_eq!(memory.len(RecordKind::Explicit), 8);
}

#[test]
fn marked_transaction_does_not_escalate() {
    let (memory, store) = open(small_blocks());
    let mut reader = manual_session(&store);
    let mut writer = manual_session(&store);

    assert_eq!(total(&reader), 0);
    writer.add(rec("alice", "likes", "cats")).unwrap();
    writer.set_auto_commit(true).unwrap();
    drop(writer);

    for i in 0..4 {
        reader.add(numbered(i)).unwrap();
    }
    assert_eq!(reader.current_txn().state(), TxnState::Active);
    assert!(matches!(reader.commit(), Err(OptiQuadError::Conflict(_))));
    assert_eq!(memory.len(RecordKind::Explicit), 1);
}

#[test]
fn zero_threshold_never_escalates() {
    let (memory, store) = open(StoreConfig::new().disable_escalation());
    let mut session = manual_session(&store);
    for i in 0..64 {
        session.add(numbered(i)).unwrap();
    }
    assert!(!session.current_txn().is_exclusive());
    assert!(memory.is_empty());
}

#[test]
fn exclusive_rollback_undoes_direct_writes() {
    let (memory, store) = open(small_blocks());
    let mut seed = store.open_session();
    seed.add(rec("alice", "likes", "cats")).unwrap();

    let mut session = manual_session(&store);
    session.remove(&RecordPattern::any()).unwrap();
    for i in 0..4 {
        session.add(numbered(i)).unwrap();
    }
    assert!(session.current_txn().is_exclusive());
    assert_eq!(memory.len(RecordKind::Explicit), 4);

    session.rollback().unwrap();
    assert_eq!(memory.records(RecordKind::Explicit), vec![rec("alice", "likes", "cats")]);
    assert!(!memory.in_store_txn());
    assert_eq!(store.exclusive_transaction(), None);
}

fn recorder() -> (Arc<Mutex<Vec<ChangeEvent>>>, Arc<dyn ChangeListener>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Arc<dyn ChangeListener> =
        Arc::new(move |event: &ChangeEvent| sink.lock().push(event.clone()));
    (seen, listener)
}

#[test]
fn listeners_block_escalation_by_default() {
    let (memory, store) = open(small_blocks());
    let mut session = manual_session(&store);
    let (seen, listener) = recorder();
    session.add_listener(listener);
    for i in 0..8 {
        session.add(numbered(i)).unwrap();
    }
    assert!(!session.current_txn().is_exclusive());
    assert!(memory.is_empty());
    session.commit().unwrap();
    assert_eq!(seen.lock().len(), 8);
}

#[test]
fn escalated_events_are_delivered_at_commit() {
    let (_memory, store) = open(small_blocks().escalate_with_listeners(true));
    let mut seed = store.open_session();
    seed.add(numbered(0)).unwrap();

    let mut session = manual_session(&store);
    let (seen, listener) = recorder();
    session.add_listener(listener);
    // numbered(0) is already stored, so it yields no event
    for i in 0..4 {
        session.add(numbered(i)).unwrap();
    }
    assert!(session.current_txn().is_exclusive());
    session.add(numbered(4)).unwrap();
    session.add(numbered(4)).unwrap();
    session.remove(&RecordPattern::any().object(Term::Integer(1))).unwrap();
    assert!(seen.lock().is_empty());

    session.commit().unwrap();
    let events = seen.lock().clone();
    assert_eq!(events.len(), 5);
    assert!(events.contains(&ChangeEvent::Added(numbered(4))));
    assert!(events.contains(&ChangeEvent::Removed(numbered(1))));
    assert!(!events.contains(&ChangeEvent::Added(numbered(0))));
}

#[test]
fn begin_waits_for_exclusive_transaction() {
    let (memory, store) = open(small_blocks());
    let mut session = manual_session(&store);
    for i in 0..4 {
        session.add(numbered(i)).unwrap();
    }
    assert!(session.current_txn().is_exclusive());

    let (tx, rx) = mpsc::channel();
    thread::scope(|scope| {
        let store = &store;
        scope.spawn(move || {
            let other = manual_session(store);
            tx.send(total(&other)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        session.set_auto_commit(true).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 4);
    });
    assert_eq!(memory.len(RecordKind::Explicit), 4);
}
