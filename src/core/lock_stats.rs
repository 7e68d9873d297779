//! Process-wide accounting of time spent waiting for and holding the
//! coordinator's locks. Disabled by default; enabling it costs one relaxed
//! atomic load per acquisition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatKind {
    /// Shared membership holds taken by `begin`.
    Membership,
    /// Shared holds around buffered reads/writes and the exclusive prepare hold.
    Preparation,
    /// Store-level transaction wrapping a flush.
    Flush,
}

impl LockStatKind {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            LockStatKind::Membership => 0,
            LockStatKind::Preparation => 1,
            LockStatKind::Flush => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct LockCounterSnapshot {
    pub acquires: u64,
    pub wait_ns: u64,
    pub max_wait_ns: u64,
    pub hold_ns: u64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct LockStatsSnapshot {
    pub membership: LockCounterSnapshot,
    pub preparation: LockCounterSnapshot,
    pub flush: LockCounterSnapshot,
}

impl LockStatsSnapshot {
    pub fn total_wait_ns(&self) -> u64 {
        self.membership
            .wait_ns
            .saturating_add(self.preparation.wait_ns)
            .saturating_add(self.flush.wait_ns)
    }
}

#[derive(Debug, Default)]
struct LockCounter {
    acquires: AtomicU64,
    wait_ns: AtomicU64,
    max_wait_ns: AtomicU64,
    hold_ns: AtomicU64,
}

impl LockCounter {
    fn record_wait(&self, wait: Duration) {
        let ns = duration_as_u64_ns(wait);
        self.acquires.fetch_add(1, Ordering::Relaxed);
        self.wait_ns.fetch_add(ns, Ordering::Relaxed);
        self.max_wait_ns.fetch_max(ns, Ordering::Relaxed);
    }

    fn record_hold(&self, hold: Duration) {
        self.hold_ns
            .fetch_add(duration_as_u64_ns(hold), Ordering::Relaxed);
    }

    fn snapshot(&self) -> LockCounterSnapshot {
        LockCounterSnapshot {
            acquires: self.acquires.load(Ordering::Relaxed),
            wait_ns: self.wait_ns.load(Ordering::Relaxed),
            max_wait_ns: self.max_wait_ns.load(Ordering::Relaxed),
            hold_ns: self.hold_ns.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [&self.acquires, &self.wait_ns, &self.max_wait_ns, &self.hold_ns] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct LockStats {
    enabled: AtomicBool,
    counters: [LockCounter; LockStatKind::COUNT],
}

impl LockStats {
    fn counter(&self, kind: LockStatKind) -> &LockCounter {
        &self.counters[kind.index()]
    }
}

static GLOBAL_LOCK_STATS: OnceLock<LockStats> = OnceLock::new();

fn global_lock_stats() -> &'static LockStats {
    GLOBAL_LOCK_STATS.get_or_init(LockStats::default)
}

pub fn set_lock_stats_enabled(enabled: bool) {
    global_lock_stats()
        .enabled
        .store(enabled, Ordering::Relaxed);
}

pub fn lock_stats_enabled() -> bool {
    global_lock_stats().enabled.load(Ordering::Relaxed)
}

pub fn reset_lock_stats() {
    for counter in &global_lock_stats().counters {
        counter.reset();
    }
}

pub fn snapshot_lock_stats() -> LockStatsSnapshot {
    let stats = global_lock_stats();
    LockStatsSnapshot {
        membership: stats.counter(LockStatKind::Membership).snapshot(),
        preparation: stats.counter(LockStatKind::Preparation).snapshot(),
        flush: stats.counter(LockStatKind::Flush).snapshot(),
    }
}

pub fn record_lock_wait(kind: LockStatKind, wait: Duration) {
    if !lock_stats_enabled() {
        return;
    }
    global_lock_stats().counter(kind).record_wait(wait);
}

pub fn begin_lock_hold(kind: LockStatKind) -> LockHoldGuard {
    LockHoldGuard {
        kind,
        start: Instant::now(),
        enabled: lock_stats_enabled(),
    }
}

/// Adds the elapsed time to the kind's hold counter when dropped.
#[derive(Debug)]
pub struct LockHoldGuard {
    kind: LockStatKind,
    start: Instant,
    enabled: bool,
}

impl Drop for LockHoldGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }
        global_lock_stats()
            .counter(self.kind)
            .record_hold(self.start.elapsed());
    }
}

fn duration_as_u64_ns(duration: Duration) -> u64 {
    duration.as_nanos().min(u64::MAX as u128) as u64
}
