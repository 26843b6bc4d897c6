//! Hook counting applied changes for the run summary.

use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::addrs::ResourceInstanceAddr;
use crate::error::HookError;
use crate::plans::{Action, Importing};

use super::Hook;

/// Counts successful lifecycle events.
#[derive(Debug, Default)]
pub struct CountHook {
    added: AtomicUsize,
    changed: AtomicUsize,
    removed: AtomicUsize,
    imported: AtomicUsize,
    forgotten: AtomicUsize,
}

/// Snapshot of a [`CountHook`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct HookCounts {
    /// Objects created.
    pub added: usize,
    /// Objects updated in place.
    pub changed: usize,
    /// Objects destroyed.
    pub removed: usize,
    /// Objects imported.
    pub imported: usize,
    /// Instances forgotten.
    pub forgotten: usize,
}

impl CountHook {
    /// Creates a hook with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counts.
    #[must_use]
    pub fn counts(&self) -> HookCounts {
        HookCounts {
            added: self.added.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            imported: self.imported.load(Ordering::Relaxed),
            forgotten: self.forgotten.load(Ordering::Relaxed),
        }
    }
}

impl Hook for CountHook {
    fn post_apply_import(&self, _addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
        self.imported.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn post_apply_forget(&self, _addr: &ResourceInstanceAddr) -> Result<(), HookError> {
        self.forgotten.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn post_apply(
        &self,
        _addr: &ResourceInstanceAddr,
        action: Action,
        _new_value: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), HookError> {
        if error.is_some() {
            return Ok(());
        }
        let counter = match action {
            Action::Create => &self.added,
            Action::Update => &self.changed,
            Action::Delete => &self.removed,
            _ => return Ok(()),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
