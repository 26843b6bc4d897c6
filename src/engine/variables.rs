//! Root module variable resolution.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::Config;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::PlanError;
use crate::plans::Plan;

/// The value of a root variable as recorded in the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    /// A decoded value.
    Set(Value),
    /// Declared but not recorded; the declared default applies.
    Unset,
}

/// Where an input value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Recorded in the plan.
    Plan,
}

/// A resolved input value.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValue {
    /// The value.
    pub value: VariableValue,
    /// Its source.
    pub source: ValueSource,
}

/// Resolved root variables by name.
pub type InputValues = BTreeMap<String, InputValue>;

/// Decodes the root variable values recorded in the plan.
///
/// Every recorded value that fails to decode adds an error diagnostic; the
/// caller must not start the walk in that case. Variables declared in
/// configuration but absent from the plan resolve to [`VariableValue::Unset`].
#[must_use]
pub fn resolve_variables(plan: &Plan, config: &Config) -> (InputValues, Diagnostics) {
    let mut values = InputValues::new();
    let mut diags = Diagnostics::new();

    for (name, raw) in &plan.variable_values {
        match raw.decode() {
            Ok(value) => {
                values.insert(
                    name.clone(),
                    InputValue {
                        value: VariableValue::Set(value),
                        source: ValueSource::Plan,
                    },
                );
            }
            Err(e) => {
                let error = PlanError::InvalidVariableValue {
                    name: name.clone(),
                    message: e.to_string(),
                };
                diags.push(
                    Diagnostic::from_error("Invalid variable value in plan", &error)
                        .with_address(format!("var.{name}")),
                );
            }
        }
    }

    for decl in &config.root.variables {
        if !plan.variable_values.contains_key(&decl.name) {
            debug!("Variable {} not recorded in plan", decl.name);
            values.insert(
                decl.name.clone(),
                InputValue {
                    value: VariableValue::Unset,
                    source: ValueSource::Plan,
                },
            );
        }
    }

    (values, diags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::plans::DynamicValue;
    use serde_json::json;

    #[test]
    fn test_resolve_variables() {
        let config = ConfigParser::parse_yaml(
            "variables:\n  - name: region\n  - name: size\n    default: 2\n",
            None,
        )
        .expect("config");
        let mut plan = Plan::default();
        plan.variable_values
            .insert(String::from("region"), DynamicValue::encode(&json!("eu-west-1")));

        let (values, diags) = resolve_variables(&plan, &config);

        assert!(diags.is_empty());
        assert_eq!(values["region"].value, VariableValue::Set(json!("eu-west-1")));
        assert_eq!(values["size"].value, VariableValue::Unset);
    }

    #[test]
    fn test_undecodable_value_is_an_error() {
        let mut plan = Plan::default();
        plan.variable_values
            .insert(String::from("tags"), DynamicValue::from_raw("{not json"));

        let (values, diags) = resolve_variables(&plan, &Config::default());

        assert!(values.is_empty());
        assert!(diags.has_errors());
        let diag = diags.iter().next().expect("diagnostic");
        assert_eq!(diag.summary, "Invalid variable value in plan");
        assert_eq!(diag.address.as_deref(), Some("var.tags"));
    }
}
