//! Lifecycle hooks notified during an apply.
//!
//! Hooks are observers. They are told about imports, forgets and every
//! provider-mutating step but can never change what the engine does: a
//! failing hook only contributes an error diagnostic.

mod count;
mod logging;

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::addrs::ResourceInstanceAddr;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::HookError;
use crate::plans::{Action, Importing, ResourceChange};

pub use count::{CountHook, HookCounts};
pub use logging::LoggingHook;

/// Observer of apply lifecycle events.
///
/// Every method defaults to doing nothing, so implementations only override
/// the events they care about.
pub trait Hook: Send + Sync {
    /// Called before an existing object is adopted into management.
    fn pre_apply_import(&self, _addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after an existing object is adopted into management.
    fn post_apply_import(&self, _addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
        Ok(())
    }

    /// Called before an instance is dropped from state.
    fn pre_apply_forget(&self, _addr: &ResourceInstanceAddr) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after an instance is dropped from state.
    fn post_apply_forget(&self, _addr: &ResourceInstanceAddr) -> Result<(), HookError> {
        Ok(())
    }

    /// Called before a provider is asked to create, update, delete or read.
    fn pre_apply(&self, _addr: &ResourceInstanceAddr, _action: Action) -> Result<(), HookError> {
        Ok(())
    }

    /// Called after a provider step, with the new value or the error message.
    fn post_apply(
        &self,
        _addr: &ResourceInstanceAddr,
        _action: Action,
        _new_value: Option<&Value>,
        _error: Option<&str>,
    ) -> Result<(), HookError> {
        Ok(())
    }
}

/// Registered hooks, notified in registration order.
pub type Hooks = Vec<Arc<dyn Hook>>;

/// Notifies every hook about the import and forget changes of a plan.
///
/// Each importing change gets one pre and one post import notification per
/// hook, and likewise for forget changes. Failures become error diagnostics
/// naming the phase; they never stop dispatch to the remaining hooks.
#[must_use]
pub fn dispatch_lifecycle_hooks(hooks: &[Arc<dyn Hook>], changes: &[ResourceChange]) -> Diagnostics {
    let mut diags = Diagnostics::new();

    for change in changes {
        if let Some(importing) = &change.importing {
            debug!("Dispatching import hooks for {}", change.addr);
            for hook in hooks {
                if let Err(e) = hook.pre_apply_import(&change.addr, importing) {
                    diags.push(hook_failure("Pre-import hook failed", &change.addr, &e));
                }
                if let Err(e) = hook.post_apply_import(&change.addr, importing) {
                    diags.push(hook_failure("Post-import hook failed", &change.addr, &e));
                }
            }
        }

        if change.is_forget() {
            debug!("Dispatching forget hooks for {}", change.addr);
            for hook in hooks {
                if let Err(e) = hook.pre_apply_forget(&change.addr) {
                    diags.push(hook_failure("Pre-forget hook failed", &change.addr, &e));
                }
                if let Err(e) = hook.post_apply_forget(&change.addr) {
                    diags.push(hook_failure("Post-forget hook failed", &change.addr, &e));
                }
            }
        }
    }

    diags
}

/// Builds the diagnostic for a failed hook notification.
pub(crate) fn hook_failure(summary: &str, addr: &ResourceInstanceAddr, error: &HookError) -> Diagnostic {
    warn!("{} for {}: {}", summary, addr, error);
    Diagnostic::from_error(summary, error).with_address(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::Forgetting;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
        fail_pre_import: bool,
    }

    impl Recorder {
        fn record(&self, event: String) {
            self.events.lock().expect("events lock").push(event);
        }
    }

    impl Hook for Recorder {
        fn pre_apply_import(&self, addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
            self.record(format!("pre-import {addr}"));
            if self.fail_pre_import {
                return Err(HookError::failed("audit log unavailable"));
            }
            Ok(())
        }

        fn post_apply_import(&self, addr: &ResourceInstanceAddr, _importing: &Importing) -> Result<(), HookError> {
            self.record(format!("post-import {addr}"));
            Ok(())
        }

        fn pre_apply_forget(&self, addr: &ResourceInstanceAddr) -> Result<(), HookError> {
            self.record(format!("pre-forget {addr}"));
            Ok(())
        }

        fn post_apply_forget(&self, addr: &ResourceInstanceAddr) -> Result<(), HookError> {
            self.record(format!("post-forget {addr}"));
            Ok(())
        }
    }

    fn change(addr: &str, action: Action) -> ResourceChange {
        ResourceChange {
            addr: addr.parse().expect("addr"),
            provider: "aws".parse().expect("provider"),
            action,
            before: None,
            after: None,
            importing: None,
            forgetting: None,
        }
    }

    #[test]
    fn test_dispatch_order_and_failures() {
        let failing = Arc::new(Recorder {
            fail_pre_import: true,
            ..Recorder::default()
        });
        let healthy = Arc::new(Recorder::default());
        let hooks: Vec<Arc<dyn Hook>> = vec![failing.clone(), healthy.clone()];

        let mut imported = change("aws_instance.web", Action::NoOp);
        imported.importing = Some(Importing { id: String::from("i-1") });
        let mut forgotten = change("aws_s3_bucket.logs", Action::Delete);
        forgotten.forgetting = Some(Forgetting {});
        let changes = vec![imported, change("aws_vpc.main", Action::Create), forgotten];

        let diags = dispatch_lifecycle_hooks(&hooks, &changes);

        assert_eq!(diags.len(), 1);
        let diag = diags.iter().next().expect("one diagnostic");
        assert_eq!(diag.summary, "Pre-import hook failed");
        assert_eq!(diag.detail, "audit log unavailable");
        assert_eq!(diag.address.as_deref(), Some("aws_instance.web"));

        let expected = [
            "pre-import aws_instance.web",
            "post-import aws_instance.web",
            "pre-forget aws_s3_bucket.logs",
            "post-forget aws_s3_bucket.logs",
        ];
        for recorder in [&failing, &healthy] {
            assert_eq!(*recorder.events.lock().expect("events lock"), expected);
        }
    }
}
