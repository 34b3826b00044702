//! Read tracking for diagnostics.
//!
//! Every typed read through the context is recorded as (branch, section, key)
//! with a hit count. Reads made while a [`SuppressGuard`] is alive on the
//! current thread are not recorded. Reads the engine makes on its own behalf
//! (diffing, migration, persistence) go through the branch directly and are
//! never recorded.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

thread_local! {
    static SUPPRESS_DEPTH: Cell<u32> = const { Cell::new(0) };
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AccessKey {
    pub branch: String,
    pub section: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRecord {
    #[serde(flatten)]
    pub key: AccessKey,
    pub count: u64,
}

#[derive(Debug)]
pub struct AccessTracker {
    enabled: AtomicBool,
    records: Mutex<BTreeMap<AccessKey, u64>>,
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AccessTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// True while a [`SuppressGuard`] is alive on this thread.
    pub fn is_suppressed() -> bool {
        SUPPRESS_DEPTH.with(|depth| depth.get() > 0)
    }

    /// Suppress recording on the current thread until the guard drops. Nests.
    #[must_use = "suppression ends when the guard is dropped"]
    pub fn suppress() -> SuppressGuard {
        SUPPRESS_DEPTH.with(|depth| depth.set(depth.get() + 1));
        SuppressGuard { _private: () }
    }

    pub fn record(&self, branch: &str, section: &str, key: &str) {
        if !self.is_enabled() || Self::is_suppressed() {
            return;
        }
        let entry = AccessKey {
            branch: branch.to_string(),
            section: section.to_string(),
            key: key.to_string(),
        };
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        *records.entry(entry).or_insert(0) += 1;
    }

    pub fn count(&self, branch: &str, section: &str, key: &str) -> u64 {
        let probe = AccessKey {
            branch: branch.to_string(),
            section: section.to_string(),
            key: key.to_string(),
        };
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&probe)
            .copied()
            .unwrap_or(0)
    }

    /// All records, sorted by branch, section and key.
    pub fn snapshot(&self) -> Vec<AccessRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(key, count)| AccessRecord {
                key: key.clone(),
                count: *count,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

pub struct SuppressGuard {
    _private: (),
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        SUPPRESS_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}
