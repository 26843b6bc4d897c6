//! Hook writing lifecycle events to the tracing log.

use serde_json::Value;
use tracing::{error, info};

use crate::addrs::ResourceInstanceAddr;
use crate::error::HookError;
use crate::plans::{Action, Importing};

use super::Hook;

/// Logs every lifecycle event.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl LoggingHook {
    /// Creates a new logging hook.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Hook for LoggingHook {
    fn pre_apply_import(&self, addr: &ResourceInstanceAddr, importing: &Importing) -> Result<(), HookError> {
        info!("{}: Importing from ID {:?}...", addr, importing.id);
        Ok(())
    }

    fn post_apply_import(&self, addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
        info!("{}: Import complete", addr);
        Ok(())
    }

    fn pre_apply_forget(&self, addr: &ResourceInstanceAddr) -> Result<(), HookError> {
        info!("{}: Removing from state...", addr);
        Ok(())
    }

    fn post_apply_forget(&self, addr: &ResourceInstanceAddr) -> Result<(), HookError> {
        info!("{}: Removed from state", addr);
        Ok(())
    }

    fn pre_apply(&self, addr: &ResourceInstanceAddr, action: Action) -> Result<(), HookError> {
        info!("{}: Starting {}...", addr, action);
        Ok(())
    }

    fn post_apply(
        &self,
        addr: &ResourceInstanceAddr,
        action: Action,
        _new_value: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), HookError> {
        match error {
            Some(message) => error!("{}: {} failed: {}", addr, action, message),
            None => info!("{}: {} complete", addr, action),
        }
        Ok(())
    }
}
