// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! Storage contract for the active-state name.
//!
//! The machine reads the active state through [`ActiveStateStore::read`] whenever it snapshots
//! an event and writes it once per transition. Every write is immediately read back; a store
//! that returns anything else is reported as
//! [`FsmError::StorageInconsistency`](crate::FsmError::StorageInconsistency).

use parking_lot::RwLock;

/// Where the active-state name lives.
pub trait ActiveStateStore: Send + Sync + 'static {
    /// Current active-state name, `None` before the first write.
    fn read(&self) -> Option<String>;

    fn write(&self, name: &str);
}

/// In-memory store, the default.
#[derive(Debug, Default)]
pub struct MemoryStore {
    active: RwLock<Option<String>>,
}

impl ActiveStateStore for MemoryStore {
    fn read(&self) -> Option<String> {
        self.active.read().clone()
    }

    fn write(&self, name: &str) {
        *self.active.write() = Some(name.to_string());
    }
}

/// Adapts a read/write closure pair, e.g. to mirror the active state into an application store.
///
/// ```rust
/// use std::sync::Arc;
/// use parking_lot::Mutex;
/// use queued_fsm::{ActiveStateStore, FnStore};
///
/// let slot = Arc::new(Mutex::new(None::<String>));
/// let (r, w) = (slot.clone(), slot.clone());
/// let store = FnStore::new(move || r.lock().clone(), move |name: &str| *w.lock() = Some(name.to_string()));
///
/// store.write("idle");
/// assert_eq!(store.read().as_deref(), Some("idle"));
/// ```
pub struct FnStore<R, W> {
    read: R,
    write: W,
}

impl<R, W> FnStore<R, W>
where
    R: Fn() -> Option<String> + Send + Sync + 'static,
    W: Fn(&str) + Send + Sync + 'static,
{
    pub fn new(read: R, write: W) -> Self {
        Self { read, write }
    }
}

impl<R, W> ActiveStateStore for FnStore<R, W>
where
    R: Fn() -> Option<String> + Send + Sync + 'static,
    W: Fn(&str) + Send + Sync + 'static,
{
    fn read(&self) -> Option<String> {
        (self.read)()
    }

    fn write(&self, name: &str) {
        (self.write)(name)
    }
}
