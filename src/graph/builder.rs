//! Compiles a plan and configuration into an [`ApplyGraph`].

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::addrs::{ConfigResource, ModulePath, ProviderAddr, ResourceInstanceAddr};
use crate::config::{Config, Expression, OutputDecl, ResourceBlock};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::engine::{InputValues, VariableValue};
use crate::error::{EvalError, GraphError};
use crate::eval::{FunctionResults, Reference, Subject};
use crate::plans::{Action, Plan, ResourceChange, UiMode};
use crate::providers::ProviderRegistry;

use super::apply_graph::{ApplyGraph, Operation};
use super::node::{GraphNode, ResourcePhase};

/// Builds the apply graph for one plan.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    plan: &'a Plan,
    config: &'a Config,
    variables: &'a InputValues,
    providers: &'a ProviderRegistry,
}

/// Mutable compilation state.
#[derive(Default)]
struct Compiler {
    graph: DiGraph<GraphNode, ()>,
    edges: Vec<(NodeIndex, NodeIndex)>,
    diags: Diagnostics,
    variables: HashMap<(ModulePath, String), NodeIndex>,
    providers: HashMap<ProviderAddr, NodeIndex>,
    applies: HashMap<ConfigResource, Vec<NodeIndex>>,
    destroys: HashMap<ConfigResource, Vec<NodeIndex>>,
    outputs: HashMap<(ModulePath, String), NodeIndex>,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(
        plan: &'a Plan,
        config: &'a Config,
        variables: &'a InputValues,
        providers: &'a ProviderRegistry,
    ) -> Self {
        Self {
            plan,
            config,
            variables,
            providers,
        }
    }

    /// Returns the walk kind selected by the plan's mode.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self.plan.ui_mode {
            UiMode::Destroy => Operation::Destroy,
            UiMode::Normal | UiMode::RefreshOnly => Operation::Apply,
        }
    }

    /// Compiles the graph.
    ///
    /// Any structural error is reported as an error diagnostic and no graph
    /// is returned.
    #[must_use]
    pub fn build(&self) -> (Option<ApplyGraph>, Diagnostics) {
        let operation = self.operation();
        debug!("Building apply graph for {:?} operation", operation);

        let mut c = Compiler::default();
        let changes = self.included_changes(&mut c);

        self.add_variables(&mut c);
        self.add_providers(&mut c, &changes);
        self.add_resources(&mut c, changes);
        self.add_outputs(&mut c);
        if c.diags.has_errors() {
            return (None, c.diags);
        }

        self.connect(&mut c);
        if c.diags.has_errors() {
            return (None, c.diags);
        }

        for (from, to) in std::mem::take(&mut c.edges) {
            if from != to {
                c.graph.update_edge(from, to, ());
            }
        }

        let order = match toposort(&c.graph, None) {
            Ok(order) => order,
            Err(cycle) => {
                let node = c.graph[cycle.node_id()].to_string();
                c.error(GraphError::Cycle { node });
                return (None, c.diags);
            }
        };

        info!(
            "Built apply graph with {} nodes and {} edges",
            c.graph.node_count(),
            c.graph.edge_count()
        );
        let functions = Arc::new(FunctionResults::from_records(&self.plan.function_results));
        let graph = ApplyGraph::new(c.graph, order, operation, functions);
        (Some(graph), c.diags)
    }

    fn is_included(&self, addr: &ResourceInstanceAddr) -> bool {
        let targeted = self.plan.target_addrs.is_empty()
            || self.plan.target_addrs.iter().any(|t| t.matches(addr));
        targeted && !self.plan.exclude_addrs.iter().any(|t| t.matches(addr))
    }

    fn included_changes(&self, c: &mut Compiler) -> Vec<ResourceChange> {
        let mut included = Vec::new();
        for change in &self.plan.changes.resources {
            if !self.is_included(&change.addr) {
                debug!("Leaving {} out of the apply graph", change.addr);
                continue;
            }
            if change.importing.is_some() && change.forgetting.is_some() {
                c.error(GraphError::invalid_change(
                    change.addr.to_string(),
                    "an instance cannot be imported and forgotten at once",
                ));
                continue;
            }

            let mut change = change.clone();
            if change.action == Action::Update && self.plan.force_replace_addrs.contains(&change.addr) {
                debug!("Replacing {} as requested", change.addr);
                change.action = Action::DeleteThenCreate;
            }
            included.push(change);
        }
        included
    }

    fn add_variables(&self, c: &mut Compiler) {
        for decl in &self.config.root.variables {
            let value = self
                .variables
                .get(&decl.name)
                .map_or(VariableValue::Unset, |input| input.value.clone());
            let node = c.graph.add_node(GraphNode::RootVariable {
                name: decl.name.clone(),
                value,
                default: decl.default.clone(),
            });
            c.variables.insert((ModulePath::root(), decl.name.clone()), node);
        }

        for (path, module) in self.config.modules() {
            let Some((parent, call_name)) = path.split_last() else {
                continue;
            };
            let call = self
                .config
                .module(&parent)
                .and_then(|m| m.module_call(call_name));
            for decl in &module.variables {
                let node = c.graph.add_node(GraphNode::ModuleVariable {
                    module: path.clone(),
                    name: decl.name.clone(),
                    expr: call.and_then(|call| call.inputs.get(&decl.name)).cloned(),
                    default: decl.default.clone(),
                });
                c.variables.insert((path.clone(), decl.name.clone()), node);
            }
        }
    }

    fn add_providers(&self, c: &mut Compiler, changes: &[ResourceChange]) {
        let used: BTreeSet<&ProviderAddr> = changes
            .iter()
            .filter(|change| !change.is_forget())
            .map(|change| &change.provider)
            .collect();

        for addr in used {
            if !self.providers.contains(&addr.name) {
                c.error(GraphError::InvalidProvider {
                    address: addr.to_string(),
                    message: format!("provider {:?} is not available", addr.name),
                });
                continue;
            }
            let block = self.config.root.provider(addr);
            if block.is_none() && addr.alias.is_some() {
                c.error(GraphError::InvalidProvider {
                    address: addr.to_string(),
                    message: String::from("no configuration block for this provider alias"),
                });
                continue;
            }
            let node = c.graph.add_node(GraphNode::Provider {
                addr: addr.clone(),
                config: block.map(|b| b.config.clone()).unwrap_or_default(),
            });
            c.providers.insert(addr.clone(), node);
        }
    }

    fn add_resources(&self, c: &mut Compiler, changes: Vec<ResourceChange>) {
        for change in changes {
            let resource = change.addr.resource.clone();
            let block = self.config.resource(&resource);
            let needs_config = !change.is_forget()
                && matches!(
                    change.action,
                    Action::Create
                        | Action::Update
                        | Action::Read
                        | Action::DeleteThenCreate
                        | Action::CreateThenDelete
                );
            if block.is_none() && needs_config {
                c.error(GraphError::invalid_change(
                    change.addr.to_string(),
                    format!("cannot {} a resource that is not declared in configuration", change.action),
                ));
                continue;
            }

            let dependencies = block
                .map(|b| self.referenced_resources(b, &resource))
                .unwrap_or_default();
            let checks = block.map(|b| b.checks.clone()).unwrap_or_default();

            let phases: &[ResourcePhase] = if change.is_forget() {
                &[ResourcePhase::Apply]
            } else {
                match change.action {
                    Action::Delete => &[ResourcePhase::Destroy],
                    Action::DeleteThenCreate => &[ResourcePhase::Destroy, ResourcePhase::Apply],
                    Action::CreateThenDelete => &[ResourcePhase::Apply, ResourcePhase::DestroyReplaced],
                    _ => &[ResourcePhase::Apply],
                }
            };

            let mut added = Vec::with_capacity(phases.len());
            for &phase in phases {
                let node = c.graph.add_node(GraphNode::ResourceInstance {
                    change: change.clone(),
                    phase,
                    checks: if phase == ResourcePhase::Apply {
                        checks.clone()
                    } else {
                        Vec::new()
                    },
                    dependencies: dependencies.clone(),
                });
                let index = if phase == ResourcePhase::Apply {
                    &mut c.applies
                } else {
                    &mut c.destroys
                };
                index.entry(resource.clone()).or_default().push(node);
                added.push(node);
            }

            // Replace ordering follows the order of the phases.
            for pair in added.windows(2) {
                c.edges.push((pair[0], pair[1]));
            }
        }
    }

    fn add_outputs(&self, c: &mut Compiler) {
        let filtered = self.plan.is_filtered();
        let pending_elsewhere: HashSet<&ConfigResource> = if filtered {
            self.plan
                .changes
                .resources
                .iter()
                .filter(|change| change.action != Action::NoOp && !self.is_included(&change.addr))
                .map(|change| &change.addr.resource)
                .collect()
        } else {
            HashSet::new()
        };

        let mut left_out: HashSet<(ModulePath, String)> = HashSet::new();
        // Children first, so a parent sees which child outputs were left out.
        for (path, module) in self.config.modules().into_iter().rev() {
            for output in &module.outputs {
                if filtered && Self::output_is_stale(output, &path, &pending_elsewhere, &left_out) {
                    debug!("Leaving output {}.{} out of the filtered apply", path, output.name);
                    left_out.insert((path.clone(), output.name.clone()));
                    continue;
                }
                let node = c.graph.add_node(GraphNode::Output {
                    module: path.clone(),
                    name: output.name.clone(),
                    expr: output.value.clone(),
                    sensitive: output.sensitive,
                });
                c.outputs.insert((path.clone(), output.name.clone()), node);
            }
        }
    }

    fn output_is_stale(
        output: &OutputDecl,
        module: &ModulePath,
        pending_elsewhere: &HashSet<&ConfigResource>,
        left_out: &HashSet<(ModulePath, String)>,
    ) -> bool {
        output.value.references().into_iter().any(|text| {
            match Reference::parse(text, module).map(|r| r.subject) {
                Ok(Subject::Resource(resource)) => pending_elsewhere.contains(&resource),
                Ok(Subject::ModuleOutput { module, name }) => left_out.contains(&(module, name)),
                Ok(Subject::Variable(_)) | Err(_) => false,
            }
        })
    }

    /// Adds every dependency edge.
    fn connect(&self, c: &mut Compiler) {
        let indices: Vec<NodeIndex> = c.graph.node_indices().collect();
        for index in indices {
            let node = c.graph[index].clone();
            match &node {
                GraphNode::RootVariable { .. } => {}
                GraphNode::ModuleVariable { module, expr, .. } => {
                    if let (Some(expr), Some((parent, _))) = (expr, module.split_last()) {
                        self.depend_on_expression(c, index, expr, &parent, None);
                    }
                }
                GraphNode::Provider { config, .. } => {
                    for expr in config.values() {
                        self.depend_on_expression(c, index, expr, &ModulePath::root(), None);
                    }
                }
                GraphNode::ResourceInstance { change, phase, .. } => {
                    if change.is_forget() {
                        continue;
                    }
                    if let Some(&provider) = c.providers.get(&change.provider) {
                        c.edges.push((provider, index));
                    }
                    if *phase == ResourcePhase::Apply {
                        if let Some(block) = self.config.resource(&change.addr.resource) {
                            self.depend_on_block(c, index, block, &change.addr.resource);
                        }
                    }
                }
                GraphNode::Output { module, expr, .. } => {
                    self.depend_on_expression(c, index, expr, module, None);
                }
            }
        }

        self.order_destroys(c);
    }

    fn depend_on_block(&self, c: &mut Compiler, index: NodeIndex, block: &ResourceBlock, own: &ConfigResource) {
        let module = &own.module;
        for expr in block.expressions() {
            self.depend_on_expression(c, index, expr, module, Some(own));
        }
        for text in &block.depends_on {
            match Reference::parse(text, module) {
                Ok(Reference {
                    subject: Subject::Resource(resource),
                    ..
                }) => self.depend_on_resource(c, index, &resource, text, Some(own)),
                Ok(_) => c.error(GraphError::InvalidReference {
                    reference: text.clone(),
                    message: String::from("depends_on entries must name resources"),
                }),
                Err(e) => c.error(invalid_reference(text, e)),
            }
        }
    }

    fn depend_on_expression(
        &self,
        c: &mut Compiler,
        index: NodeIndex,
        expr: &Expression,
        module: &ModulePath,
        own: Option<&ConfigResource>,
    ) {
        for text in expr.references() {
            let reference = match Reference::parse(text, module) {
                Ok(reference) => reference,
                Err(e) => {
                    c.error(invalid_reference(text, e));
                    continue;
                }
            };
            match reference.subject {
                Subject::Variable(name) => match c.variables.get(&(module.clone(), name)) {
                    Some(&variable) => c.edges.push((variable, index)),
                    None => c.error(unresolved("variable", text, module)),
                },
                Subject::ModuleOutput { module: child, name } => {
                    let declared = self
                        .config
                        .module(&child)
                        .and_then(|m| m.output(&name))
                        .is_some();
                    if !declared {
                        c.error(unresolved("module output", text, module));
                    } else if let Some(&output) = c.outputs.get(&(child, name)) {
                        c.edges.push((output, index));
                    }
                }
                Subject::Resource(resource) => self.depend_on_resource(c, index, &resource, text, own),
            }
        }
    }

    fn depend_on_resource(
        &self,
        c: &mut Compiler,
        index: NodeIndex,
        resource: &ConfigResource,
        text: &str,
        own: Option<&ConfigResource>,
    ) {
        if own == Some(resource) {
            return;
        }
        if self.config.resource(resource).is_none() {
            c.error(unresolved("resource", text, &resource.module));
            return;
        }
        if let Some(applies) = c.applies.get(resource) {
            c.edges.extend(applies.iter().map(|&apply| (apply, index)));
        }
    }

    /// Dependents are destroyed before the resources they depend on.
    fn order_destroys(&self, c: &mut Compiler) {
        let mut edges = Vec::new();
        for (resource, destroys) in &c.destroys {
            for dependency in self.destroy_dependencies(resource) {
                if &dependency == resource {
                    continue;
                }
                let Some(targets) = c.destroys.get(&dependency) else {
                    continue;
                };
                for &dependent in destroys {
                    edges.extend(targets.iter().map(|&target| (dependent, target)));
                }
            }
        }
        edges.sort();
        c.edges.extend(edges);
    }

    fn destroy_dependencies(&self, resource: &ConfigResource) -> BTreeSet<ConfigResource> {
        let mut dependencies: BTreeSet<ConfigResource> = self
            .config
            .resource(resource)
            .map(|block| self.referenced_resources(block, resource))
            .unwrap_or_default()
            .into_iter()
            .collect();
        if let Some(recorded) = self.plan.prior_state.resource(resource) {
            for object in recorded.instances.values() {
                dependencies.extend(object.dependencies.iter().cloned());
            }
        }
        dependencies
    }

    /// Resources referenced by a block, excluding itself.
    fn referenced_resources(&self, block: &ResourceBlock, own: &ConfigResource) -> Vec<ConfigResource> {
        let texts = block
            .expressions()
            .flat_map(Expression::references)
            .chain(block.depends_on.iter().map(String::as_str));
        let found: BTreeSet<ConfigResource> = texts
            .filter_map(|text| Reference::parse(text, &own.module).ok())
            .filter_map(|reference| match reference.subject {
                Subject::Resource(resource) if &resource != own => Some(resource),
                _ => None,
            })
            .filter(|resource| self.config.resource(resource).is_some())
            .collect();
        found.into_iter().collect()
    }
}

impl Compiler {
    fn error(&mut self, error: GraphError) {
        let summary = match &error {
            GraphError::UnresolvedReference { .. } => "Reference to undeclared object",
            GraphError::InvalidReference { .. } => "Invalid reference",
            GraphError::Cycle { .. } => "Cycle in apply graph",
            GraphError::InvalidProvider { .. } => "Invalid provider configuration",
            GraphError::InvalidChange { .. } => "Invalid planned change",
        };
        self.diags.push(Diagnostic::from_error(summary, &error));
    }
}

fn unresolved(kind: &'static str, reference: &str, module: &ModulePath) -> GraphError {
    GraphError::UnresolvedReference {
        kind,
        reference: reference.to_string(),
        module: module.to_string(),
    }
}

fn invalid_reference(text: &str, error: EvalError) -> GraphError {
    let message = match error {
        EvalError::InvalidReference { message, .. } => message,
        other => other.to_string(),
    };
    GraphError::InvalidReference {
        reference: text.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::engine::resolve_variables;
    use crate::providers::{EchoProvider, Provider};

    const CONFIG: &str = r#"
variables:
  - name: cidr
    default: 10.0.0.0/16

providers:
  - name: aws
    config:
      region: eu-west-1

resources:
  - type: aws_vpc
    name: main
    config:
      cidr_block: { ref: var.cidr }
  - type: aws_subnet
    name: private
    config:
      vpc_id: { ref: aws_vpc.main.id }
    checks:
      - condition: { ref: aws_subnet.private.available }
        error_message: subnet must be available
  - type: aws_instance
    name: web
    depends_on: [aws_subnet.private]

outputs:
  - name: vpc_id
    value: { ref: aws_vpc.main.id }
  - name: zone
    value: { ref: module.dns.zone_id }

modules:
  - name: dns
    inputs:
      vpc: { ref: aws_vpc.main.id }
    module:
      variables:
        - name: vpc
      outputs:
        - name: zone_id
          value: { ref: var.vpc }
"#;

    fn change(addr: &str, action: &str) -> serde_json::Value {
        serde_json::json!({"addr": addr, "provider": "aws", "action": action, "after": {}})
    }

    fn build(plan: serde_json::Value, config: &str) -> (Option<ApplyGraph>, Diagnostics) {
        let plan: Plan = serde_json::from_value(plan).expect("valid plan");
        let config = ConfigParser::parse_yaml(config, None).expect("valid config");
        let (variables, diags) = resolve_variables(&plan, &config);
        assert!(!diags.has_errors());

        let mut providers = ProviderRegistry::new();
        providers.register("aws", Arc::new(|| Arc::new(EchoProvider::new()) as Arc<dyn Provider>));
        GraphBuilder::new(&plan, &config, &variables, &providers).build()
    }

    fn summaries(diags: &Diagnostics) -> Vec<&str> {
        diags.iter().map(|d| d.summary.as_str()).collect()
    }

    #[test]
    fn test_reference_edges() {
        let plan = serde_json::json!({"changes": {"resources": [
            change("aws_vpc.main", "create"),
            change("aws_subnet.private", "create"),
            change("aws_instance.web", "create"),
        ]}});
        let (graph, diags) = build(plan, CONFIG);
        assert!(diags.is_empty(), "{diags:?}");
        let graph = graph.expect("graph");

        assert_eq!(graph.operation(), Operation::Apply);
        assert!(graph.has_edge("var.cidr", "aws_vpc.main"));
        assert!(graph.has_edge("provider[aws]", "aws_vpc.main"));
        assert!(graph.has_edge("aws_vpc.main", "aws_subnet.private"));
        assert!(graph.has_edge("aws_subnet.private", "aws_instance.web"));
        assert!(graph.has_edge("aws_vpc.main", "module.dns.var.vpc"));
        assert!(graph.has_edge("module.dns.var.vpc", "module.dns.output.zone_id"));
        assert!(graph.has_edge("module.dns.output.zone_id", "output.zone"));
        assert!(!graph.has_edge("aws_subnet.private", "aws_subnet.private"));
        assert_eq!(graph.check_objects(), ["aws_subnet.private"]);

        let labels = graph.labels();
        let position = |label: &str| labels.iter().position(|l| l == label).expect(label);
        assert!(position("aws_vpc.main") < position("aws_subnet.private"));
    }

    #[test]
    fn test_force_replace_and_create_before_destroy() {
        let plan = serde_json::json!({
            "changes": {"resources": [
                change("aws_vpc.main", "update"),
                change("aws_instance.web", "create_then_delete"),
            ]},
            "force_replace_addrs": ["aws_vpc.main"]
        });
        let (graph, diags) = build(plan, CONFIG);
        assert!(!diags.has_errors(), "{diags:?}");
        let graph = graph.expect("graph");

        assert!(graph.has_edge("aws_vpc.main (destroy)", "aws_vpc.main"));
        assert!(graph.has_edge("aws_instance.web", "aws_instance.web (destroy replaced)"));
    }

    #[test]
    fn test_destroy_order_is_reversed() {
        let plan = serde_json::json!({
            "ui_mode": "destroy",
            "changes": {"resources": [
                change("aws_vpc.main", "delete"),
                change("aws_subnet.private", "delete"),
                change("aws_instance.web", "delete"),
            ]}
        });
        let (graph, _) = build(plan, CONFIG);
        let graph = graph.expect("graph");

        assert_eq!(graph.operation(), Operation::Destroy);
        assert!(graph.has_edge("aws_subnet.private (destroy)", "aws_vpc.main (destroy)"));
        assert!(graph.has_edge("aws_instance.web (destroy)", "aws_subnet.private (destroy)"));
    }

    #[test]
    fn test_filters_leave_out_changes_and_stale_outputs() {
        let plan = serde_json::json!({
            "changes": {"resources": [
                change("aws_vpc.main", "update"),
                change("aws_instance.web", "create"),
            ]},
            "exclude_addrs": ["aws_vpc.main"]
        });
        let (graph, diags) = build(plan, CONFIG);
        assert!(diags.is_empty());
        let labels = graph.expect("graph").labels();

        assert!(labels.contains(&String::from("aws_instance.web")));
        assert!(!labels.contains(&String::from("aws_vpc.main")));
        assert!(!labels.contains(&String::from("output.vpc_id")));
        assert!(labels.contains(&String::from("output.zone")));
    }

    #[test]
    fn test_unresolved_reference_fails() {
        let config = r"
resources:
  - type: aws_instance
    name: web
    config:
      subnet_id: { ref: aws_subnet.missing.id }
";
        let plan = serde_json::json!({"changes": {"resources": [change("aws_instance.web", "create")]}});
        let (graph, diags) = build(plan, config);
        assert!(graph.is_none());
        assert_eq!(summaries(&diags), ["Reference to undeclared object"]);
    }

    #[test]
    fn test_cycle_fails() {
        let config = r"
resources:
  - type: aws_instance
    name: a
    config:
      peer: { ref: aws_instance.b.id }
  - type: aws_instance
    name: b
    config:
      peer: { ref: aws_instance.a.id }
";
        let plan = serde_json::json!({"changes": {"resources": [
            change("aws_instance.a", "create"),
            change("aws_instance.b", "create"),
        ]}});
        let (graph, diags) = build(plan, config);
        assert!(graph.is_none());
        assert_eq!(summaries(&diags), ["Cycle in apply graph"]);
    }

    #[test]
    fn test_structural_change_errors() {
        let mut both = change("aws_vpc.main", "no_op");
        both["importing"] = serde_json::json!({"id": "vpc-1"});
        both["forgetting"] = serde_json::json!({});
        let mut unknown = change("aws_instance.web", "create");
        unknown["provider"] = serde_json::json!("gcp");

        let plan = serde_json::json!({"changes": {"resources": [
            both,
            unknown,
            change("aws_instance.gone", "create"),
        ]}});
        let (graph, diags) = build(plan, CONFIG);
        assert!(graph.is_none());
        assert_eq!(
            summaries(&diags),
            [
                "Invalid planned change",
                "Invalid provider configuration",
                "Invalid planned change",
            ]
        );
    }
}
