use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::record::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// An explicit record that was not in the store before the commit.
    Added(Record),
    /// An explicit record that was in the store before the commit.
    Removed(Record),
    /// Fired once per commit that changed anything.
    StoreChanged { added: bool, removed: bool },
}

pub trait ChangeListener: Send + Sync {
    fn on_event(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_event(&self, event: &ChangeEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registered listeners. `has_listeners` reads an atomic flag so the write
/// path never touches the list lock when nobody is listening.
#[derive(Default)]
pub struct ObserverList {
    any: AtomicBool,
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut listeners = self.listeners.lock();
        listeners.push((id, listener));
        self.any.store(true, Ordering::Release);
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        self.any.store(!listeners.is_empty(), Ordering::Release);
        listeners.len() != before
    }

    pub fn has_listeners(&self) -> bool {
        self.any.load(Ordering::Acquire)
    }

    /// Delivers `events` in order to every listener registered at call time.
    /// Listeners run outside the list lock and may register or remove
    /// listeners themselves.
    pub fn dispatch(&self, events: &[ChangeEvent]) {
        if events.is_empty() || !self.has_listeners() {
            return;
        }
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Term;

    #[test]
    fn removed_listener_stops_receiving() {
        let list = ObserverList::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = list.add(Arc::new(move |event: &ChangeEvent| sink.lock().push(event.clone())));
        assert!(list.has_listeners());

        let record = Record::new(Term::iri("a"), Term::iri("b"), Term::iri("c"));
        list.dispatch(&[ChangeEvent::Added(record.clone())]);
        assert!(list.remove(id));
        assert!(!list.has_listeners());
        list.dispatch(&[ChangeEvent::Removed(record.clone())]);

        assert_eq!(*seen.lock(), vec![ChangeEvent::Added(record)]);
        assert!(!list.remove(id));
    }
}
