//! Turns the walk's working state into the final state.

use tracing::{debug, info};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::graph::WalkResult;
use crate::plans::{Plan, UiMode};
use crate::state::State;

/// Produces the final state after a walk.
///
/// Steps run in a fixed order: check results are recorded, the working state
/// is closed, empty resource entries are pruned after an error-free destroy,
/// refresh-only runs keep the plan's check results, and filtered runs get one
/// warning that the applied changes may be incomplete.
pub fn finalize(walk: &WalkResult, plan: &Plan, diags: &mut Diagnostics) -> State {
    walk.state.record_check_results(walk.checks.clone());
    let mut state = walk.state.close();

    if plan.ui_mode == UiMode::Destroy && !diags.has_errors() {
        debug!("Pruning {} empty resource entries", state.husks().len());
        state.prune_resource_husks();
    }

    if plan.ui_mode == UiMode::RefreshOnly {
        state.check_results = plan.checks.clone();
    }

    if plan.is_filtered() {
        diags.push(Diagnostic::warning(
            "Applied changes may be incomplete",
            "The plan was created with targets or excludes, so not every planned \
             change was considered. Run a new plan without them to verify that no \
             other changes are pending.",
        ));
    }

    info!("Final state has {} resource instances", state.instance_count());
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ProviderAddr;
    use crate::checks::{CheckCollector, CheckStatus};
    use crate::state::{InstanceObject, SyncState};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn walk_result(plan: &Plan) -> WalkResult {
        let mut state = plan.prior_state.clone();
        state.set_resource_instance(
            &"aws_vpc.main".parse().expect("addr"),
            InstanceObject::ready(json!({"id": "vpc-1"})),
            &ProviderAddr::new("aws"),
        );
        state.remove_resource_instance(&"aws_vpc.main".parse().expect("addr"));

        let checks = CheckCollector::new([String::from("aws_vpc.main")]);
        checks.report("aws_vpc.main", CheckStatus::Pass, None);
        WalkResult {
            state: Arc::new(SyncState::new(state)),
            non_fatal_diagnostics: Diagnostics::new(),
            checks: checks.results(),
            outcomes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_destroy_prunes_husks_only_without_errors() {
        let plan = Plan {
            ui_mode: UiMode::Destroy,
            ..Plan::default()
        };

        let mut diags = Diagnostics::new();
        let state = finalize(&walk_result(&plan), &plan, &mut diags);
        assert!(state.husks().is_empty());
        assert_eq!(
            state.check_results.get("aws_vpc.main").map(|r| r.status),
            Some(CheckStatus::Pass)
        );

        let mut diags = Diagnostics::from(Diagnostic::error("Failed", "boom"));
        let state = finalize(&walk_result(&plan), &plan, &mut diags);
        assert_eq!(state.husks().len(), 1);
    }

    #[test]
    fn test_refresh_only_keeps_plan_checks_and_filters_warn_once() {
        let plan = Plan {
            ui_mode: UiMode::RefreshOnly,
            target_addrs: vec!["aws_vpc.main".parse().expect("target")],
            ..Plan::default()
        };

        let mut diags = Diagnostics::new();
        let state = finalize(&walk_result(&plan), &plan, &mut diags);

        assert_eq!(state.check_results, plan.checks);
        assert_eq!(state.husks().len(), 1);
        let warnings: Vec<_> = diags.warnings().map(|d| d.summary.as_str()).collect();
        assert_eq!(warnings, ["Applied changes may be incomplete"]);
    }
}
