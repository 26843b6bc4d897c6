//! The apply operation.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::graph::{GraphBuilder, UiGraph, WalkContext, Walker};
use crate::hooks::dispatch_lifecycle_hooks;
use crate::plans::Plan;
use crate::state::State;

use super::cancel::CancelToken;
use super::finalize::finalize;
use super::variables::resolve_variables;
use super::Engine;

impl Engine {
    /// Applies a plan.
    ///
    /// Returns the new state, or `None` if the apply could not start, along
    /// with every diagnostic produced. A returned state may still come with
    /// error diagnostics when some changes failed.
    pub async fn apply(&self, plan: &Plan, config: &Config) -> (Option<State>, Diagnostics) {
        self.apply_with_cancel(plan, config, CancelToken::new()).await
    }

    /// Applies a plan, stopping new operations once `cancel` fires.
    pub async fn apply_with_cancel(
        &self,
        plan: &Plan,
        config: &Config,
        cancel: CancelToken,
    ) -> (Option<State>, Diagnostics) {
        let guard = match self.run_lock.acquire("apply").await {
            Ok(guard) => guard,
            Err(e) => return (None, Diagnostic::from_error("Failed to acquire run lock", &e).into()),
        };
        info!(
            "Applying plan with {} changes (lock {})",
            plan.changes.resources.len(),
            guard.info().lock_id
        );

        if plan.errored {
            warn!("Refusing to apply a plan created with errors");
            return (
                None,
                Diagnostic::error(
                    "Cannot apply failed plan",
                    "The plan was created with errors and cannot be applied. \
                     Fix the errors and create a new plan.",
                )
                .into(),
            );
        }

        let mut diags = dispatch_lifecycle_hooks(&self.hooks, &plan.changes.resources);

        let (variables, variable_diags) = resolve_variables(plan, config);
        let invalid_variables = variable_diags.has_errors();
        diags.extend(variable_diags);
        if invalid_variables {
            return (None, diags);
        }

        let (graph, graph_diags) = GraphBuilder::new(plan, config, &variables, &self.providers).build();
        diags.extend(graph_diags);
        let Some(graph) = graph else {
            return (None, diags);
        };

        let ctx = Arc::new(WalkContext::new(
            plan.prior_state.clone(),
            &graph,
            self.providers.clone(),
            self.hooks.clone(),
            plan.timestamp,
        ));
        let walker = Walker::new(self.options.parallelism, cancel);
        let (walk, walk_diags) = walker.walk(&graph, ctx).await;
        diags.extend(walk.non_fatal_diagnostics.clone());
        diags.extend(walk_diags);

        let state = finalize(&walk, plan, &mut diags);
        info!(
            "Apply finished with {} errors and {} warnings",
            diags.errors().count(),
            diags.warnings().count()
        );
        drop(guard);
        (Some(state), diags)
    }

    /// Builds the apply graph for a plan without walking it, for rendering.
    #[must_use]
    pub fn apply_graph_for_ui(&self, plan: &Plan, config: &Config) -> (Option<UiGraph>, Diagnostics) {
        let (variables, mut diags) = resolve_variables(plan, config);
        if diags.has_errors() {
            return (None, diags);
        }
        let (graph, graph_diags) = GraphBuilder::new(plan, config, &variables, &self.providers).build();
        diags.extend(graph_diags);
        (graph.map(|g| g.for_ui()), diags)
    }
}
