//! Expression evaluation during the walk.
//!
//! Expressions in configuration are references, function calls or literals.
//! References are parsed into a subject plus traversal steps and resolved
//! against the evaluation scope (variables and module outputs) or the working
//! state (resource values). Provider function results are memoized per apply.

mod evaluator;
mod functions;
mod reference;
mod scope;

pub use evaluator::{Evaluator, PLAN_TIMESTAMP_FUNCTION};
pub use functions::{FunctionCall, FunctionResultRecord, FunctionResults};
pub use reference::{Reference, Step, Subject};
pub use scope::EvalScope;
