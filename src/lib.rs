// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Terrace
//!
//! The apply-time engine of a declarative infrastructure tool.
//!
//! ## Overview
//!
//! Terrace takes a saved plan (the proposed changes computed earlier against a
//! prior state) together with the configuration it was planned from, and
//! carries those changes out against providers:
//!
//! - Resolve the input variables recorded in the plan
//! - Build a dependency graph of every operation the plan requires
//! - Walk the graph concurrently, respecting dependencies and a parallelism cap
//! - Notify lifecycle hooks around imports, forgets and provider calls
//! - Produce the resulting state and a list of diagnostics
//!
//! ## Architecture
//!
//! An apply is a sequence of stages, each appending to one [`Diagnostics`] list:
//!
//! 1. **Variables**: plan-recorded values decoded into [`engine::InputValues`]
//! 2. **Graph**: [`graph::GraphBuilder`] compiles changes into an [`graph::ApplyGraph`]
//! 3. **Walk**: [`graph::Walker`] executes nodes once their dependencies applied
//! 4. **Finalize**: [`engine::finalize`] records checks and closes the state
//!
//! ## Modules
//!
//! - [`addrs`]: Module, resource, instance and provider addresses
//! - [`config`]: Configuration tree and YAML loading
//! - [`plans`]: Saved plans and planned changes
//! - [`state`]: Infrastructure state, its concurrent wrapper and the run lock
//! - [`eval`]: Expression evaluation against the apply scope
//! - [`graph`]: Apply graph construction and the concurrent walker
//! - [`hooks`]: Lifecycle hook trait and built-in hooks
//! - [`providers`]: Provider capability and registry
//! - [`engine`]: The [`Engine`] entry point
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use terrace::{Config, Engine, EngineOptions, Plan};
//! use terrace::providers::{EchoProvider, Provider};
//!
//! # async fn example(plan: Plan, config: Config) {
//! let engine = Engine::new(EngineOptions::default())
//!     .with_provider("aws", Arc::new(|| Arc::new(EchoProvider::new()) as Arc<dyn Provider>));
//!
//! let (state, diags) = engine.apply(&plan, &config).await;
//! if diags.has_errors() {
//!     eprintln!("apply failed");
//! }
//! # let _ = state;
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod addrs;
pub mod checks;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod hooks;
pub mod plans;
pub mod providers;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{Config, ConfigParser};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::{CancelToken, Engine, EngineOptions};
pub use error::{Result, TerraceError};
pub use graph::{ApplyGraph, GraphBuilder, NodeOutcome, Walker};
pub use hooks::{CountHook, Hook, LoggingHook};
pub use plans::{Action, Plan, ResourceChange, UiMode};
pub use providers::{EchoProvider, Provider, ProviderRegistry};
pub use state::{RunLock, State, SyncState};
