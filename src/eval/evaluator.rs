//! Expression evaluator.

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::addrs::{ConfigResource, InstanceKey, ModulePath};
use crate::config::Expression;
use crate::error::EvalError;
use crate::providers::ProviderRegistry;
use crate::state::SyncState;

use super::functions::{FunctionCall, FunctionResults};
use super::reference::{Reference, Step, Subject};
use super::scope::EvalScope;

/// Built-in function returning the plan's timestamp.
pub const PLAN_TIMESTAMP_FUNCTION: &str = "plantimestamp";

/// Evaluates expressions in one module against the walk's current values.
pub struct Evaluator<'a> {
    module: &'a ModulePath,
    scope: &'a EvalScope,
    state: &'a SyncState,
    functions: &'a FunctionResults,
    providers: &'a ProviderRegistry,
    timestamp: DateTime<Utc>,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator for expressions appearing in `module`.
    #[must_use]
    pub const fn new(
        module: &'a ModulePath,
        scope: &'a EvalScope,
        state: &'a SyncState,
        functions: &'a FunctionResults,
        providers: &'a ProviderRegistry,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            module,
            scope,
            state,
            functions,
            providers,
            timestamp,
        }
    }

    /// Evaluates an expression.
    pub fn evaluate<'e>(&'e self, expr: &'e Expression) -> BoxFuture<'e, Result<Value, EvalError>> {
        Box::pin(async move {
            match expr {
                Expression::Literal(value) => Ok(value.clone()),
                Expression::Reference { reference } => self.resolve(reference),
                Expression::Call { call, args } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(self.evaluate(arg).await?);
                    }
                    self.call(call, values).await
                }
            }
        })
    }

    /// Evaluates a map of expressions into a JSON object.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error.
    pub async fn evaluate_object(&self, exprs: &BTreeMap<String, Expression>) -> Result<Value, EvalError> {
        let mut object = serde_json::Map::new();
        for (name, expr) in exprs {
            object.insert(name.clone(), self.evaluate(expr).await?);
        }
        Ok(Value::Object(object))
    }

    /// Evaluates a condition.
    ///
    /// # Errors
    ///
    /// Returns an error if evaluation fails or the result is not a boolean.
    pub async fn evaluate_condition(&self, expr: &Expression) -> Result<bool, EvalError> {
        match self.evaluate(expr).await? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotABoolean {
                found: json_type(&other).to_string(),
            }),
        }
    }

    fn resolve(&self, text: &str) -> Result<Value, EvalError> {
        let reference = Reference::parse(text, self.module)?;
        let root = match &reference.subject {
            Subject::Variable(name) => self
                .scope
                .variable(self.module, name)
                .ok_or_else(|| EvalError::MissingVariable { name: name.clone() })?,
            Subject::ModuleOutput { module, name } => {
                self.scope
                    .output(module, name)
                    .ok_or_else(|| EvalError::MissingOutput {
                        module: module.to_string(),
                        name: name.clone(),
                    })?
            }
            Subject::Resource(resource) => self.resource_value(resource),
        };
        traverse(root, &reference)
    }

    fn resource_value(&self, resource: &ConfigResource) -> Value {
        let Some(instances) = self.state.resource_values(resource) else {
            return Value::Null;
        };
        if let Some(value) = instances.get(&InstanceKey::NoKey) {
            return value.clone();
        }
        if instances.keys().all(|k| matches!(k, InstanceKey::Int(_))) {
            return Value::Array(instances.into_values().collect());
        }
        Value::Object(
            instances
                .into_iter()
                .filter_map(|(key, value)| match key {
                    InstanceKey::Str(k) => Some((k, value)),
                    InstanceKey::Int(i) => Some((i.to_string(), value)),
                    InstanceKey::NoKey => None,
                })
                .collect(),
        )
    }

    async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        if name == PLAN_TIMESTAMP_FUNCTION {
            if !args.is_empty() {
                return Err(EvalError::FunctionCall {
                    function: name.to_string(),
                    message: String::from("takes no arguments"),
                });
            }
            return Ok(Value::String(
                self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            ));
        }

        let call = FunctionCall::parse(name, args).ok_or_else(|| EvalError::FunctionCall {
            function: name.to_string(),
            message: String::from("unknown function"),
        })?;

        let providers = self.providers;
        let target = &call;
        self.functions
            .get_or_call(&call, move || async move {
                debug!("Calling provider function {}", name);
                let provider = providers
                    .instantiate(&target.provider)
                    .map_err(|e| EvalError::FunctionCall {
                        function: name.to_string(),
                        message: e.to_string(),
                    })?;
                provider
                    .call_function(target.function.clone(), target.args.clone())
                    .await
                    .map_err(|e| EvalError::FunctionCall {
                        function: name.to_string(),
                        message: e.to_string(),
                    })
            })
            .await
    }
}

fn traverse(mut value: Value, reference: &Reference) -> Result<Value, EvalError> {
    for step in &reference.steps {
        value = match (value, step) {
            (Value::Null, _) => Value::Null,
            (Value::Object(mut map), Step::Attr(name) | Step::Index(InstanceKey::Str(name))) => {
                map.remove(name).ok_or_else(|| unsupported(step, reference))?
            }
            (Value::Array(items), Step::Index(InstanceKey::Int(i))) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.into_iter().nth(i))
                .ok_or_else(|| unsupported(step, reference))?,
            _ => return Err(unsupported(step, reference)),
        };
    }
    Ok(value)
}

fn unsupported(step: &Step, reference: &Reference) -> EvalError {
    EvalError::UnsupportedAttribute {
        step: step.to_string(),
        reference: reference.text.clone(),
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ProviderAddr;
    use crate::error::ProviderError;
    use crate::providers::{MockProvider, Provider};
    use crate::state::{InstanceObject, State};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        module: ModulePath,
        scope: EvalScope,
        state: SyncState,
        functions: FunctionResults,
        providers: ProviderRegistry,
    }

    impl Fixture {
        fn new(providers: ProviderRegistry) -> Self {
            let mut state = State::new();
            for (addr, value) in [
                ("aws_vpc.main", json!({"id": "vpc-1"})),
                ("aws_subnet.private[0]", json!({"id": "subnet-a"})),
                ("aws_subnet.private[1]", json!({"id": "subnet-b"})),
            ] {
                state.set_resource_instance(
                    &addr.parse().expect("addr"),
                    InstanceObject::ready(value),
                    &ProviderAddr::new("aws"),
                );
            }
            let scope = EvalScope::new();
            scope.set_variable(&ModulePath::root(), "region", json!("eu-west-1"));
            scope.set_output(&ModulePath::root().child("dns"), "zone_id", json!("Z123"));

            Self {
                module: ModulePath::root(),
                scope,
                state: SyncState::new(state),
                functions: FunctionResults::default(),
                providers,
            }
        }

        fn evaluator(&self) -> Evaluator<'_> {
            Evaluator::new(
                &self.module,
                &self.scope,
                &self.state,
                &self.functions,
                &self.providers,
                "2026-01-02T03:04:05Z".parse().expect("timestamp"),
            )
        }
    }

    #[tokio::test]
    async fn test_resolve_references() {
        let fixture = Fixture::new(ProviderRegistry::new());
        let eval = fixture.evaluator();

        let cases = [
            ("var.region", json!("eu-west-1")),
            ("module.dns.zone_id", json!("Z123")),
            ("aws_vpc.main.id", json!("vpc-1")),
            ("aws_subnet.private[1].id", json!("subnet-b")),
            ("aws_instance.missing.id", Value::Null),
        ];
        for (reference, expected) in cases {
            let value = eval
                .evaluate(&Expression::reference(reference))
                .await
                .expect(reference);
            assert_eq!(value, expected, "{reference}");
        }

        let err = eval
            .evaluate(&Expression::reference("aws_vpc.main.arn"))
            .await
            .expect_err("no such attribute");
        assert!(matches!(err, EvalError::UnsupportedAttribute { .. }));

        let err = eval
            .evaluate(&Expression::reference("var.zone"))
            .await
            .expect_err("unset variable");
        assert_eq!(err, EvalError::MissingVariable { name: String::from("zone") });
    }

    #[tokio::test]
    async fn test_plan_timestamp_and_conditions() {
        let fixture = Fixture::new(ProviderRegistry::new());
        let eval = fixture.evaluator();

        let ts = eval
            .evaluate(&Expression::Call {
                call: String::from(PLAN_TIMESTAMP_FUNCTION),
                args: vec![],
            })
            .await
            .expect("timestamp");
        assert_eq!(ts, json!("2026-01-02T03:04:05Z"));

        assert!(eval.evaluate_condition(&Expression::Literal(json!(true))).await.expect("bool"));
        assert!(matches!(
            eval.evaluate_condition(&Expression::reference("var.region")).await,
            Err(EvalError::NotABoolean { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_functions_are_memoized() {
        let mut mock = MockProvider::new();
        mock.expect_call_function()
            .withf(|name, args| name == "upper" && args == &vec![json!("eu-west-1")])
            .times(1)
            .returning(|_, _| Ok(json!("EU-WEST-1")));
        mock.expect_call_function()
            .withf(|name, _| name == "broken")
            .returning(|name, _| {
                Err(ProviderError::FunctionFailed {
                    function: name,
                    message: String::from("boom"),
                })
            });
        let mock: Arc<dyn Provider> = Arc::new(mock);

        let mut providers = ProviderRegistry::new();
        providers.register("aws", Arc::new(move || Arc::clone(&mock)));
        let fixture = Fixture::new(providers);
        let eval = fixture.evaluator();

        let upper = Expression::Call {
            call: String::from("provider::aws::upper"),
            args: vec![Expression::reference("var.region")],
        };
        for _ in 0..3 {
            assert_eq!(eval.evaluate(&upper).await.expect("call"), json!("EU-WEST-1"));
        }
        assert_eq!(fixture.functions.len(), 1);

        let broken = Expression::Call {
            call: String::from("provider::aws::broken"),
            args: vec![],
        };
        assert!(matches!(
            eval.evaluate(&broken).await,
            Err(EvalError::FunctionCall { .. })
        ));
    }
}
