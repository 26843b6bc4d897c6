//! Concurrent walk of the apply graph.

use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::checks::CheckResults;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::engine::CancelToken;
use crate::state::SyncState;

use super::apply_graph::ApplyGraph;
use super::execute::{execute_node, NodeRun, WalkContext};
use super::node::GraphNode;

/// Final outcome of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node ran and succeeded.
    Applied,
    /// The node ran and failed.
    Errored,
    /// The node never ran.
    Skipped(SkipReason),
}

/// Why a node never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A node it depends on, directly or transitively, failed.
    DependencyFailed {
        /// Label of the failed node.
        dependency: String,
    },
    /// The apply was cancelled before the node started.
    Cancelled,
}

/// What a walk leaves behind.
#[derive(Debug)]
pub struct WalkResult {
    /// The working state, written by every applied node.
    pub state: Arc<SyncState>,
    /// Warnings about nodes that were not run.
    pub non_fatal_diagnostics: Diagnostics,
    /// Postcondition results collected during the walk.
    pub checks: CheckResults,
    /// Outcome of every node, by label.
    pub outcomes: BTreeMap<String, NodeOutcome>,
}

/// Runs graph nodes as soon as their predecessors finish.
#[derive(Debug, Clone)]
pub struct Walker {
    parallelism: usize,
    cancel: CancelToken,
}

impl Walker {
    /// Creates a walker running at most `parallelism` nodes at once.
    #[must_use]
    pub fn new(parallelism: usize, cancel: CancelToken) -> Self {
        Self {
            parallelism: parallelism.max(1),
            cancel,
        }
    }

    /// Walks the graph.
    ///
    /// Returns the walk result and the diagnostics of the nodes that ran, in
    /// topological order.
    pub async fn walk(&self, graph: &ApplyGraph, ctx: Arc<WalkContext>) -> (WalkResult, Diagnostics) {
        let order = graph.topological_order();
        info!("Walking {} nodes with parallelism {}", order.len(), self.parallelism);

        let position: HashMap<NodeIndex, usize> = order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut waiting: HashMap<NodeIndex, usize> = order
            .iter()
            .map(|&n| (n, graph.predecessors(n).count()))
            .collect();
        let mut ready: VecDeque<NodeIndex> = order
            .iter()
            .copied()
            .filter(|n| waiting.get(n) == Some(&0))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut running: JoinSet<Option<NodeRun>> = JoinSet::new();
        let mut spawned: HashMap<Id, NodeIndex> = HashMap::new();
        let mut outcomes: HashMap<NodeIndex, NodeOutcome> = HashMap::new();
        let mut node_diags: HashMap<NodeIndex, Diagnostics> = HashMap::new();

        loop {
            while let Some(index) = ready.pop_front() {
                let skip = if self.cancel.is_cancelled() {
                    Some(SkipReason::Cancelled)
                } else {
                    blocked_by(graph, index, &outcomes, &position)
                };
                if let Some(reason) = skip {
                    outcomes.insert(index, NodeOutcome::Skipped(reason));
                    release(graph, index, &mut waiting, &mut ready);
                    continue;
                }

                let node = graph.node(index).clone();
                let label = node.to_string();
                let ctx = Arc::clone(&ctx);
                let semaphore = Arc::clone(&semaphore);
                let cancel = self.cancel.clone();
                let handle = running.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let run = match tokio::spawn(execute_node(node, ctx)).await {
                        Ok(run) => run,
                        Err(e) => panicked(&label, &e),
                    };
                    Some(run)
                });
                spawned.insert(handle.id(), index);
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };
            let Some((index, run)) = settle(graph, &mut spawned, joined) else {
                continue;
            };

            let outcome = match run {
                None => NodeOutcome::Skipped(SkipReason::Cancelled),
                Some(run) => {
                    node_diags.insert(index, run.diags);
                    if run.failed {
                        error!("{} failed", graph.node(index));
                        NodeOutcome::Errored
                    } else {
                        debug!("{} applied", graph.node(index));
                        NodeOutcome::Applied
                    }
                }
            };
            outcomes.insert(index, outcome);
            release(graph, index, &mut waiting, &mut ready);
        }

        let mut diags = Diagnostics::new();
        let mut non_fatal = Diagnostics::new();
        let mut cancelled = 0_usize;
        let mut labelled = BTreeMap::new();

        for &index in order {
            let node = graph.node(index);
            let label = node.to_string();
            let outcome = outcomes.remove(&index).unwrap_or_else(|| {
                diags.push(Diagnostic::error(
                    "Operation did not complete",
                    format!("{label} never reported an outcome."),
                ));
                NodeOutcome::Errored
            });

            if let Some(ran) = node_diags.remove(&index) {
                diags.extend(ran);
            }
            match &outcome {
                NodeOutcome::Skipped(SkipReason::Cancelled) => cancelled += 1,
                NodeOutcome::Skipped(SkipReason::DependencyFailed { dependency }) if node.reports_skip() => {
                    warn!("Skipped {} because {} failed", label, dependency);
                    non_fatal.push(skip_warning(node, &label, dependency));
                }
                _ => {}
            }
            labelled.insert(label, outcome);
        }

        if cancelled > 0 {
            warn!("Apply cancelled with {} operations not started", cancelled);
            non_fatal.push(Diagnostic::warning(
                "Apply cancelled",
                format!("{cancelled} operations were not started."),
            ));
        }

        let result = WalkResult {
            state: Arc::clone(&ctx.state),
            non_fatal_diagnostics: non_fatal,
            checks: ctx.checks.results(),
            outcomes: labelled,
        };
        (result, diags)
    }
}

/// Maps a finished walk task back to its node. A task that failed outside
/// the node itself still errors that node so its dependents are released.
fn settle(
    graph: &ApplyGraph,
    spawned: &mut HashMap<Id, NodeIndex>,
    joined: Result<(Id, Option<NodeRun>), JoinError>,
) -> Option<(NodeIndex, Option<NodeRun>)> {
    match joined {
        Ok((id, run)) => spawned.remove(&id).map(|index| (index, run)),
        Err(e) => {
            let index = spawned.remove(&e.id())?;
            Some((index, Some(panicked(&graph.node(index).to_string(), &e))))
        }
    }
}

fn panicked(label: &str, e: &JoinError) -> NodeRun {
    error!("Node {} stopped: {}", label, e);
    let summary = if e.is_panic() {
        "Node panicked"
    } else {
        "Node task cancelled"
    };
    Diagnostics::from(Diagnostic::error(
        summary,
        format!("The operation for {label} stopped unexpectedly: {e}"),
    ))
    .into()
}

/// Returns why `index` must not run, if any predecessor did not apply.
fn blocked_by(
    graph: &ApplyGraph,
    index: NodeIndex,
    outcomes: &HashMap<NodeIndex, NodeOutcome>,
    position: &HashMap<NodeIndex, usize>,
) -> Option<SkipReason> {
    let first = graph
        .predecessors(index)
        .filter(|p| outcomes.get(p) != Some(&NodeOutcome::Applied))
        .min_by_key(|p| position.get(p).copied().unwrap_or(usize::MAX))?;

    Some(match outcomes.get(&first) {
        Some(NodeOutcome::Skipped(reason)) => reason.clone(),
        _ => SkipReason::DependencyFailed {
            dependency: graph.node(first).to_string(),
        },
    })
}

fn release(
    graph: &ApplyGraph,
    index: NodeIndex,
    waiting: &mut HashMap<NodeIndex, usize>,
    ready: &mut VecDeque<NodeIndex>,
) {
    for successor in graph.successors(index) {
        if let Some(count) = waiting.get_mut(&successor) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                ready.push_back(successor);
            }
        }
    }
}

fn skip_warning(node: &GraphNode, label: &str, dependency: &str) -> Diagnostic {
    let summary = match node {
        GraphNode::Output { .. } => "Output value not updated",
        _ => "Resource instance not applied",
    };
    Diagnostic::warning(summary, format!("Skipped because {dependency} failed.")).with_address(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ResourceInstanceAddr;
    use crate::config::ConfigParser;
    use crate::engine::resolve_variables;
    use crate::error::{HookError, ProviderError};
    use crate::graph::GraphBuilder;
    use crate::hooks::Hook;
    use crate::plans::{Action, Plan};
    use crate::providers::{ApplyRequest, Provider, ProviderRegistry};
    use crate::state::State;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Barrier;

    const CONFIG: &str = r"
resources:
  - type: aws_instance
    name: a
  - type: aws_instance
    name: b
    config:
      peer: { ref: aws_instance.a.id }
  - type: aws_instance
    name: c
    config:
      peer: { ref: aws_instance.b.id }
  - type: aws_instance
    name: d
outputs:
  - name: c_id
    value: { ref: aws_instance.c.id }
";

    #[derive(Default)]
    struct Scripted {
        fail: Option<&'static str>,
        panic: Option<&'static str>,
        barrier: Option<Arc<Barrier>>,
    }

    #[async_trait]
    impl Provider for Scripted {
        async fn configure(&self, _config: Value) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn apply(&self, request: ApplyRequest) -> Result<Option<Value>, ProviderError> {
            let addr = request.addr.to_string();
            if let Some(barrier) = &self.barrier {
                barrier.wait().await;
            }
            if self.fail == Some(addr.as_str()) {
                return Err(ProviderError::operation("create", addr, "quota exceeded"));
            }
            assert!(self.panic != Some(addr.as_str()), "provider crashed");
            Ok(Some(json!({"id": addr})))
        }

        async fn read_data_source(&self, _type_name: String, config: Value) -> Result<Value, ProviderError> {
            Ok(config)
        }

        async fn call_function(&self, name: String, _args: Vec<Value>) -> Result<Value, ProviderError> {
            Err(ProviderError::UnknownFunction { function: name })
        }
    }

    struct FailingHook;

    impl Hook for FailingHook {
        fn pre_apply(&self, _addr: &ResourceInstanceAddr, _action: Action) -> Result<(), HookError> {
            Err(HookError::failed("audit log unavailable"))
        }
    }

    fn plan(addrs: &[&str]) -> Plan {
        let changes: Vec<Value> = addrs
            .iter()
            .map(|addr| json!({"addr": addr, "provider": "aws", "action": "create", "after": {}}))
            .collect();
        serde_json::from_value(json!({"changes": {"resources": changes}})).expect("plan")
    }

    fn build(plan: &Plan, provider: Scripted) -> (ApplyGraph, ProviderRegistry) {
        let config = ConfigParser::parse_yaml(CONFIG, None).expect("config");
        let (variables, _) = resolve_variables(plan, &config);
        let provider: Arc<dyn Provider> = Arc::new(provider);
        let mut providers = ProviderRegistry::new();
        providers.register("aws", Arc::new(move || Arc::clone(&provider)));

        let (graph, diags) = GraphBuilder::new(plan, &config, &variables, &providers).build();
        assert!(!diags.has_errors(), "{diags:?}");
        (graph.expect("graph"), providers)
    }

    async fn walk(
        plan: &Plan,
        provider: Scripted,
        hooks: Vec<Arc<dyn Hook>>,
        walker: Walker,
    ) -> (WalkResult, Diagnostics) {
        let (graph, providers) = build(plan, provider);
        let ctx = Arc::new(WalkContext::new(State::new(), &graph, providers, hooks, plan.timestamp));
        walker.walk(&graph, ctx).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_independent_nodes_run_concurrently() {
        let plan = plan(&["aws_instance.a", "aws_instance.d"]);
        let provider = Scripted {
            barrier: Some(Arc::new(Barrier::new(2))),
            ..Scripted::default()
        };
        let walker = Walker::new(2, CancelToken::new());

        let (result, diags) = tokio::time::timeout(Duration::from_secs(5), walk(&plan, provider, vec![], walker))
            .await
            .expect("both creates must be in flight together");

        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(result.outcomes["aws_instance.a"], NodeOutcome::Applied);
        assert_eq!(result.outcomes["aws_instance.d"], NodeOutcome::Applied);
    }

    #[tokio::test]
    async fn test_failure_skips_only_descendants() {
        let plan = plan(&["aws_instance.a", "aws_instance.b", "aws_instance.c", "aws_instance.d"]);
        let provider = Scripted {
            fail: Some("aws_instance.a"),
            ..Scripted::default()
        };
        let (result, diags) = walk(&plan, provider, vec![], Walker::new(4, CancelToken::new())).await;

        let failed = SkipReason::DependencyFailed {
            dependency: String::from("aws_instance.a"),
        };
        assert_eq!(result.outcomes["aws_instance.a"], NodeOutcome::Errored);
        assert_eq!(result.outcomes["aws_instance.b"], NodeOutcome::Skipped(failed.clone()));
        assert_eq!(result.outcomes["aws_instance.c"], NodeOutcome::Skipped(failed.clone()));
        assert_eq!(result.outcomes["output.c_id"], NodeOutcome::Skipped(failed));
        assert_eq!(result.outcomes["aws_instance.d"], NodeOutcome::Applied);

        assert_eq!(diags.errors().count(), 1);
        let warnings: Vec<_> = result
            .non_fatal_diagnostics
            .warnings()
            .map(|d| (d.summary.as_str(), d.address.as_deref()))
            .collect();
        assert_eq!(
            warnings,
            [
                ("Resource instance not applied", Some("aws_instance.b")),
                ("Resource instance not applied", Some("aws_instance.c")),
                ("Output value not updated", Some("output.c_id")),
            ]
        );

        let state = result.state.close();
        assert!(state.resource_instance(&"aws_instance.d".parse().expect("addr")).is_some());
        assert!(state.resource_instance(&"aws_instance.a".parse().expect("addr")).is_none());
    }

    #[tokio::test]
    async fn test_cancelled_walk_starts_nothing() {
        let plan = plan(&["aws_instance.a", "aws_instance.d"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let (result, diags) = walk(&plan, Scripted::default(), vec![], Walker::new(2, cancel)).await;

        assert!(diags.is_empty());
        assert!(result
            .outcomes
            .values()
            .all(|o| *o == NodeOutcome::Skipped(SkipReason::Cancelled)));
        let summaries: Vec<_> = result.non_fatal_diagnostics.iter().map(|d| d.summary.as_str()).collect();
        assert_eq!(summaries, ["Apply cancelled"]);
        assert_eq!(result.state.close().instance_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_node_becomes_error() {
        let plan = plan(&["aws_instance.a", "aws_instance.b"]);
        let provider = Scripted {
            panic: Some("aws_instance.a"),
            ..Scripted::default()
        };
        let (result, diags) = walk(&plan, provider, vec![], Walker::new(2, CancelToken::new())).await;

        assert_eq!(result.outcomes["aws_instance.a"], NodeOutcome::Errored);
        assert!(matches!(result.outcomes["aws_instance.b"], NodeOutcome::Skipped(_)));
        assert_eq!(diags.errors().next().map(|d| d.summary.as_str()), Some("Node panicked"));
    }

    #[tokio::test]
    async fn test_hook_failure_keeps_outcome() {
        let plan = plan(&["aws_instance.a", "aws_instance.b"]);
        let (result, diags) = walk(
            &plan,
            Scripted::default(),
            vec![Arc::new(FailingHook) as Arc<dyn Hook>],
            Walker::new(2, CancelToken::new()),
        )
        .await;

        assert_eq!(result.outcomes["aws_instance.a"], NodeOutcome::Applied);
        assert_eq!(result.outcomes["aws_instance.b"], NodeOutcome::Applied);
        assert_eq!(diags.errors().count(), 2);
        assert!(diags.iter().all(|d| d.summary == "Pre-apply hook failed"));
    }

    #[tokio::test]
    async fn test_lost_task_errors_its_node() {
        let plan = plan(&["aws_instance.a"]);
        let (graph, _) = build(&plan, Scripted::default());
        let index = graph
            .topological_order()
            .iter()
            .copied()
            .find(|&n| graph.node(n).to_string() == "aws_instance.a")
            .expect("resource node");

        let mut tasks: JoinSet<Option<NodeRun>> = JoinSet::new();
        let handle = tasks.spawn(std::future::pending());
        let mut spawned = HashMap::from([(handle.id(), index)]);
        handle.abort();

        let joined = tasks.join_next_with_id().await.expect("one task");
        let (settled, run) = settle(&graph, &mut spawned, joined).expect("task maps to its node");

        assert_eq!(settled, index);
        assert!(spawned.is_empty());
        let run = run.expect("a failed run, not a skip");
        assert!(run.failed);
        assert_eq!(
            run.diags.errors().next().map(|d| d.summary.as_str()),
            Some("Node task cancelled")
        );
    }
}
