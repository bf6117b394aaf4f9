// SPDX-License-Identifier: MIT OR Apache-2.0
// SPDX-FileCopyrightText: 2025-2026 ObzenFlow Contributors
// https://obzenflow.dev

//! State-change and error listener registries.

use parking_lot::RwLock;

use crate::error::FsmError;
use crate::handlers::{ErrorListener, StateChangeListener};
use crate::types::DispatchOutcome;

#[derive(Default)]
pub(crate) struct Listeners {
    changes: RwLock<Vec<StateChangeListener>>,
    errors: RwLock<Vec<ErrorListener>>,
}

impl Listeners {
    pub fn add_change(&self, listener: StateChangeListener) {
        self.changes.write().push(listener);
    }

    pub fn add_error(&self, listener: ErrorListener) {
        self.errors.write().push(listener);
    }

    pub fn emit_change(&self, outcome: &DispatchOutcome) {
        // Snapshot first so a listener may register further listeners.
        let listeners = self.changes.read().clone();
        for listener in listeners {
            listener(outcome);
        }
    }

    pub fn emit_error(&self, error: &FsmError) {
        let listeners = self.errors.read().clone();
        for listener in listeners {
            listener(error);
        }
    }
}
