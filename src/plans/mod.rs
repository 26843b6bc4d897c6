//! Plan model consumed by the apply engine.
//!
//! A plan is produced by the planning phase and is immutable input to an
//! apply. It records the per-instance changes, the prior state they were
//! computed against, the variable values used, and the filters in effect.

mod changes;
mod plan;

pub use changes::{Action, Changes, Forgetting, Importing, ResourceChange};
pub use plan::{DynamicValue, Plan, UiMode};
