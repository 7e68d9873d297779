use std::fmt;
use std::sync::Arc;

use crate::api::session::Session;
use crate::core::lock_stats::set_lock_stats_enabled;
use crate::storage::Store;
use crate::txn::{
    ChangeListener, EscalationPolicy, IsolationLevel, ListenerId, LockCoordinator, ObserverList,
    Transaction, TxnId, LARGE_BLOCK,
};

pub struct StoreConfig {
    /// Staged records per escalation attempt:
    /// - 0 = never escalate
    /// - N > 0 = try to become exclusive each time N more records are staged
    pub escalation_threshold: usize,
    /// Allow escalation while per-record listeners are registered.
    pub escalate_with_listeners: bool,
    /// Whether a transaction that wrote nothing may commit after its reads
    /// were invalidated. Serializable by default.
    pub isolation: IsolationLevel,
    pub lock_stats_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: LARGE_BLOCK,
            escalate_with_listeners: false,
            isolation: IsolationLevel::default(),
            lock_stats_enabled: false,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escalation_threshold(mut self, threshold: usize) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    pub fn disable_escalation(mut self) -> Self {
        self.escalation_threshold = 0;
        self
    }

    pub fn escalate_with_listeners(mut self, enabled: bool) -> Self {
        self.escalate_with_listeners = enabled;
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn lock_stats_enabled(mut self, enabled: bool) -> Self {
        self.lock_stats_enabled = enabled;
        self
    }

    fn policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            threshold: self.escalation_threshold,
            with_listeners: self.escalate_with_listeners,
        }
    }
}

/// A store shared by many concurrently running transactions.
pub struct OptimisticStore {
    store: Arc<dyn Store>,
    coordinator: Arc<LockCoordinator>,
    policy: EscalationPolicy,
    isolation: IsolationLevel,
    lock_stats_enabled: bool,
    store_listeners: Arc<ObserverList>,
}

impl fmt::Debug for OptimisticStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticStore")
            .field("policy", &self.policy)
            .field("isolation", &self.isolation)
            .field("lock_stats_enabled", &self.lock_stats_enabled)
            .field("active_transactions", &self.coordinator.active_count())
            .finish()
    }
}

impl OptimisticStore {
    pub fn new(store: Arc<dyn Store>, config: StoreConfig) -> Self {
        if config.lock_stats_enabled {
            set_lock_stats_enabled(true);
        }
        Self {
            store,
            coordinator: Arc::new(LockCoordinator::new()),
            policy: config.policy(),
            isolation: config.isolation,
            lock_stats_enabled: config.lock_stats_enabled,
            store_listeners: Arc::new(ObserverList::new()),
        }
    }

    /// Session in auto-commit mode.
    pub fn open_session(&self) -> Session {
        Session::new(
            self.store.clone(),
            self.coordinator.clone(),
            self.transaction(),
        )
    }

    /// A bare transaction, not yet begun.
    pub fn transaction(&self) -> Transaction {
        Transaction::new(
            self.store.clone(),
            self.coordinator.clone(),
            self.policy,
            self.store_listeners.clone(),
        )
        .with_isolation(self.isolation)
    }

    /// Registers a listener for `StoreChanged` events, fired once per commit
    /// by any transaction.
    pub fn add_store_listener(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.store_listeners.add(listener)
    }

    pub fn remove_store_listener(&self, id: ListenerId) -> bool {
        self.store_listeners.remove(id)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn active_transactions(&self) -> usize {
        self.coordinator.active_count()
    }

    pub fn exclusive_transaction(&self) -> Option<TxnId> {
        self.coordinator.exclusive_holder()
    }
}
