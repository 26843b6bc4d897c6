//! Execution of individual graph nodes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::addrs::{ConfigResource, ModulePath, ProviderAddr, ResourceInstanceAddr};
use crate::checks::{CheckCollector, CheckStatus};
use crate::config::{CheckRule, Expression};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::engine::VariableValue;
use crate::error::ProviderError;
use crate::eval::{EvalScope, Evaluator, FunctionResults};
use crate::hooks::{hook_failure, Hook};
use crate::plans::{Action, ResourceChange};
use crate::providers::{ApplyAction, ApplyRequest, Provider, ProviderRegistry};
use crate::state::{InstanceObject, ObjectStatus, OutputValue, State, SyncState};

use super::apply_graph::{ApplyGraph, Operation};
use super::node::{GraphNode, ResourcePhase};

/// Everything a running node can read or write.
pub struct WalkContext {
    pub(crate) state: Arc<SyncState>,
    pub(crate) scope: EvalScope,
    pub(crate) functions: Arc<FunctionResults>,
    pub(crate) checks: CheckCollector,
    providers: ProviderRegistry,
    configured: DashMap<ProviderAddr, Arc<dyn Provider>>,
    hooks: Vec<Arc<dyn Hook>>,
    operation: Operation,
    timestamp: DateTime<Utc>,
}

impl WalkContext {
    /// Creates the context for walking `graph`, starting from `state`.
    #[must_use]
    pub fn new(
        state: State,
        graph: &ApplyGraph,
        providers: ProviderRegistry,
        hooks: Vec<Arc<dyn Hook>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            state: Arc::new(SyncState::new(state)),
            scope: EvalScope::new(),
            functions: graph.functions(),
            checks: CheckCollector::new(graph.check_objects()),
            providers,
            configured: DashMap::new(),
            hooks,
            operation: graph.operation(),
            timestamp,
        }
    }

    fn evaluator<'a>(&'a self, module: &'a ModulePath) -> Evaluator<'a> {
        Evaluator::new(
            module,
            &self.scope,
            &self.state,
            &self.functions,
            &self.providers,
            self.timestamp,
        )
    }

    fn provider(&self, addr: &ProviderAddr) -> Result<Arc<dyn Provider>, ProviderError> {
        self.configured
            .get(addr)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ProviderError::NotAvailable {
                name: addr.to_string(),
            })
    }

    fn set_root_variable(&self, name: &str, value: VariableValue, default: Option<Value>) -> Diagnostics {
        let value = match value {
            VariableValue::Set(value) => Some(value),
            VariableValue::Unset => default,
        };
        let Some(value) = value else {
            return Diagnostic::error(
                "No value for required variable",
                format!("The root module variable {name:?} is not set and has no default value."),
            )
            .with_address(format!("var.{name}"))
            .into();
        };
        self.scope.set_variable(&ModulePath::root(), name, value);
        Diagnostics::new()
    }

    async fn set_module_variable(
        &self,
        module: &ModulePath,
        name: &str,
        expr: Option<&Expression>,
        default: Option<Value>,
        label: &str,
    ) -> Diagnostics {
        let value = match (expr, default) {
            (Some(expr), _) => {
                let parent = module.split_last().map_or_else(ModulePath::root, |(parent, _)| parent);
                match self.evaluator(&parent).evaluate(expr).await {
                    Ok(value) => value,
                    Err(e) => {
                        return Diagnostic::from_error("Invalid value for module variable", &e)
                            .with_address(label)
                            .into();
                    }
                }
            }
            (None, Some(default)) => default,
            (None, None) => {
                return Diagnostic::error(
                    "No value for required variable",
                    format!("The variable {name:?} of {module} is not set and has no default value."),
                )
                .with_address(label)
                .into();
            }
        };
        self.scope.set_variable(module, name, value);
        Diagnostics::new()
    }

    async fn configure_provider(&self, addr: ProviderAddr, config: &BTreeMap<String, Expression>) -> Diagnostics {
        let root = ModulePath::root();
        let failed = |e: &dyn std::error::Error| -> Diagnostics {
            Diagnostic::from_error("Failed to configure provider", e)
                .with_address(format!("provider[{addr}]"))
                .into()
        };

        let config = match self.evaluator(&root).evaluate_object(config).await {
            Ok(config) => config,
            Err(e) => return failed(&e),
        };
        let provider = match self.providers.instantiate(&addr.name) {
            Ok(provider) => provider,
            Err(e) => return failed(&e),
        };
        if let Err(e) = provider.configure(config).await {
            return failed(&e);
        }

        debug!("Configured provider {}", addr);
        self.configured.insert(addr, provider);
        Diagnostics::new()
    }

    async fn update_output(
        &self,
        module: &ModulePath,
        name: &str,
        expr: &Expression,
        sensitive: bool,
        label: &str,
    ) -> Diagnostics {
        if self.operation == Operation::Destroy {
            if module.is_root() {
                self.state.remove_output_value(name);
            }
            return Diagnostics::new();
        }

        match self.evaluator(module).evaluate(expr).await {
            Ok(value) => {
                self.scope.set_output(module, name, value.clone());
                if module.is_root() {
                    self.state.set_output_value(name, OutputValue { value, sensitive });
                }
                Diagnostics::new()
            }
            Err(e) => Diagnostic::from_error("Failed to evaluate output", &e)
                .with_address(label)
                .into(),
        }
    }

    /// Runs one provider step between the `pre_apply` and `post_apply` notifications.
    async fn notify_around<F>(
        &self,
        addr: &ResourceInstanceAddr,
        action: Action,
        diags: &mut Diagnostics,
        step: F,
    ) -> Result<Option<Value>, ProviderError>
    where
        F: Future<Output = Result<Option<Value>, ProviderError>>,
    {
        for hook in &self.hooks {
            if let Err(e) = hook.pre_apply(addr, action) {
                diags.push(hook_failure("Pre-apply hook failed", addr, &e));
            }
        }

        let result = step.await;

        let (new_value, message) = match &result {
            Ok(value) => (value.as_ref(), None),
            Err(e) => (None, Some(e.to_string())),
        };
        for hook in &self.hooks {
            if let Err(e) = hook.post_apply(addr, action, new_value, message.as_deref()) {
                diags.push(hook_failure("Post-apply hook failed", addr, &e));
            }
        }
        result
    }

    async fn apply_instance(
        &self,
        change: &ResourceChange,
        phase: ResourcePhase,
        checks: &[CheckRule],
        dependencies: Vec<ConfigResource>,
    ) -> NodeRun {
        let addr = &change.addr;
        let mut diags = Diagnostics::new();

        if change.is_forget() {
            debug!("Forgetting {}", addr);
            self.state.remove_resource_instance(addr);
            return NodeRun::applied(diags);
        }

        let result = match phase {
            ResourcePhase::Destroy | ResourcePhase::DestroyReplaced => {
                self.destroy_instance(change, phase, &mut diags).await
            }
            ResourcePhase::Apply => self.apply_change(change, dependencies, &mut diags).await,
        };

        let failed = match result {
            Ok(()) if phase == ResourcePhase::Apply => !self.evaluate_checks(addr, checks, &mut diags).await,
            Ok(()) => false,
            Err(e) => {
                error!("Failed to apply {}: {}", addr, e);
                diags.push(Diagnostic::from_error("Failed to apply resource instance", &e).with_address(addr));
                true
            }
        };
        NodeRun { diags, failed }
    }

    async fn destroy_instance(
        &self,
        change: &ResourceChange,
        phase: ResourcePhase,
        diags: &mut Diagnostics,
    ) -> Result<(), ProviderError> {
        let addr = &change.addr;
        let provider = self.provider(&change.provider)?;
        let prior = match phase {
            ResourcePhase::DestroyReplaced => change.before.clone(),
            ResourcePhase::Destroy | ResourcePhase::Apply => self
                .state
                .resource_instance(addr)
                .map(|object| object.value)
                .or_else(|| change.before.clone()),
        };
        let request = ApplyRequest {
            addr: addr.clone(),
            action: ApplyAction::Delete,
            prior,
            planned: None,
        };

        self.notify_around(addr, Action::Delete, diags, provider.apply(request))
            .await?;

        if phase == ResourcePhase::Destroy {
            self.state.remove_resource_instance(addr);
        }
        info!("Destroyed {}", addr);
        Ok(())
    }

    async fn apply_change(
        &self,
        change: &ResourceChange,
        dependencies: Vec<ConfigResource>,
        diags: &mut Diagnostics,
    ) -> Result<(), ProviderError> {
        let addr = &change.addr;

        if let Some(importing) = &change.importing {
            if matches!(change.action, Action::Create | Action::NoOp) {
                let value = change
                    .after
                    .clone()
                    .or_else(|| change.before.clone())
                    .unwrap_or_else(|| json!({ "id": importing.id }));
                debug!("Adopting imported object {} for {}", importing.id, addr);
                self.write_instance(change, value, dependencies);
                return Ok(());
            }
        }

        let value = match change.action {
            Action::NoOp | Action::Delete | Action::Forget => return Ok(()),
            Action::Read => {
                let provider = self.provider(&change.provider)?;
                let config = change.after.clone().unwrap_or(Value::Null);
                let type_name = addr.resource.type_name.clone();
                self.notify_around(addr, Action::Read, diags, async {
                    provider.read_data_source(type_name, config).await.map(Some)
                })
                .await?
            }
            Action::Create | Action::DeleteThenCreate | Action::CreateThenDelete => {
                let provider = self.provider(&change.provider)?;
                let request = ApplyRequest {
                    addr: addr.clone(),
                    action: ApplyAction::Create,
                    prior: None,
                    planned: change.after.clone(),
                };
                self.notify_around(addr, Action::Create, diags, provider.apply(request))
                    .await?
            }
            Action::Update => {
                let provider = self.provider(&change.provider)?;
                let prior = self
                    .state
                    .resource_instance(addr)
                    .map(|object| object.value)
                    .or_else(|| change.before.clone());
                let request = ApplyRequest {
                    addr: addr.clone(),
                    action: ApplyAction::Update,
                    prior,
                    planned: change.after.clone(),
                };
                self.notify_around(addr, Action::Update, diags, provider.apply(request))
                    .await?
            }
        };

        let value = value.ok_or_else(|| {
            ProviderError::operation(change.action.to_string(), addr.to_string(), "provider returned no object")
        })?;
        self.write_instance(change, value, dependencies);
        info!("Applied {} ({})", addr, change.action);
        Ok(())
    }

    fn write_instance(&self, change: &ResourceChange, value: Value, dependencies: Vec<ConfigResource>) {
        let object = InstanceObject {
            value,
            status: ObjectStatus::Ready,
            dependencies,
        };
        self.state
            .set_resource_instance(&change.addr, object, &change.provider);
    }

    /// Returns true if every postcondition held.
    async fn evaluate_checks(&self, addr: &ResourceInstanceAddr, checks: &[CheckRule], diags: &mut Diagnostics) -> bool {
        let object = addr.resource.to_string();
        let mut passed = true;
        let evaluator = self.evaluator(addr.module());
        for rule in checks {
            match evaluator.evaluate_condition(&rule.condition).await {
                Ok(true) => self.checks.report(&object, CheckStatus::Pass, None),
                Ok(false) => {
                    passed = false;
                    self.checks
                        .report(&object, CheckStatus::Fail, Some(rule.error_message.clone()));
                    diags.push(
                        Diagnostic::error("Resource postcondition failed", rule.error_message.clone())
                            .with_address(addr),
                    );
                }
                Err(e) => {
                    passed = false;
                    self.checks.report(&object, CheckStatus::Error, None);
                    diags.push(Diagnostic::from_error("Invalid postcondition", &e).with_address(addr));
                }
            }
        }
        passed
    }
}

impl std::fmt::Debug for WalkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkContext")
            .field("operation", &self.operation)
            .field("providers", &self.providers)
            .field("hooks", &self.hooks.len())
            .field("timestamp", &self.timestamp)
            .finish_non_exhaustive()
    }
}

/// Outcome of running one node.
#[derive(Debug, Default)]
pub(crate) struct NodeRun {
    /// Diagnostics produced by the node, including hook failures.
    pub(crate) diags: Diagnostics,
    /// Whether the node itself failed. Hook failures do not count.
    pub(crate) failed: bool,
}

impl NodeRun {
    const fn applied(diags: Diagnostics) -> Self {
        Self { diags, failed: false }
    }
}

impl From<Diagnostics> for NodeRun {
    fn from(diags: Diagnostics) -> Self {
        Self {
            failed: diags.has_errors(),
            diags,
        }
    }
}

/// Executes one node.
pub(crate) async fn execute_node(node: GraphNode, ctx: Arc<WalkContext>) -> NodeRun {
    let label = node.to_string();
    debug!("Executing {}", label);

    match node {
        GraphNode::RootVariable { name, value, default } => {
            ctx.set_root_variable(&name, value, default).into()
        }
        GraphNode::ModuleVariable {
            module,
            name,
            expr,
            default,
        } => ctx
            .set_module_variable(&module, &name, expr.as_ref(), default, &label)
            .await
            .into(),
        GraphNode::Provider { addr, config } => ctx.configure_provider(addr, &config).await.into(),
        GraphNode::ResourceInstance {
            change,
            phase,
            checks,
            dependencies,
        } => ctx.apply_instance(&change, phase, &checks, dependencies).await,
        GraphNode::Output {
            module,
            name,
            expr,
            sensitive,
        } => ctx
            .update_output(&module, &name, &expr, sensitive, &label)
            .await
            .into(),
    }
}
