//! The plan document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::addrs::{ResourceInstanceAddr, Target};
use crate::checks::CheckResults;
use crate::error::{PlanError, Result};
use crate::eval::FunctionResultRecord;
use crate::state::State;

use super::changes::Changes;

/// The mode the plan was created in.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UiMode {
    /// Converge real infrastructure to the configuration.
    #[default]
    Normal,
    /// Destroy every managed object.
    Destroy,
    /// Only refresh state from real infrastructure.
    RefreshOnly,
}

/// A JSON-encoded value of dynamic type, as recorded by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DynamicValue(String);

/// A precomputed change plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Mode the plan was created in.
    #[serde(default)]
    pub ui_mode: UiMode,
    /// Planned changes.
    #[serde(default)]
    pub changes: Changes,
    /// State the changes were computed against.
    #[serde(default)]
    pub prior_state: State,
    /// Root variable values used while planning.
    #[serde(default)]
    pub variable_values: BTreeMap<String, DynamicValue>,
    /// Instances the user targeted.
    #[serde(default)]
    pub target_addrs: Vec<Target>,
    /// Instances the user excluded.
    #[serde(default)]
    pub exclude_addrs: Vec<Target>,
    /// Instances whose update must be a replace.
    #[serde(default)]
    pub force_replace_addrs: Vec<ResourceInstanceAddr>,
    /// Check results computed at plan time.
    #[serde(default)]
    pub checks: CheckResults,
    /// Provider function results observed at plan time.
    #[serde(default)]
    pub function_results: Vec<FunctionResultRecord>,
    /// When the plan was created.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Set when planning failed. An errored plan cannot be applied.
    #[serde(default)]
    pub errored: bool,
}

impl DynamicValue {
    /// Encodes a value.
    #[must_use]
    pub fn encode(value: &Value) -> Self {
        Self(value.to_string())
    }

    /// Wraps already-encoded text without validating it.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Decodes the value.
    ///
    /// # Errors
    ///
    /// Returns an error if the recorded text is not valid JSON.
    pub fn decode(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.0)
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            ui_mode: UiMode::Normal,
            changes: Changes::default(),
            prior_state: State::default(),
            variable_values: BTreeMap::new(),
            target_addrs: Vec::new(),
            exclude_addrs: Vec::new(),
            force_replace_addrs: Vec::new(),
            checks: CheckResults::default(),
            function_results: Vec::new(),
            timestamp: Utc::now(),
            errored: false,
        }
    }
}

impl Plan {
    /// Parses a plan from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid plan.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            PlanError::Unreadable {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Loads a plan from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading plan from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| PlanError::Unreadable {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json(&content)
    }

    /// Returns true if target or exclude filters were used.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        !self.target_addrs.is_empty() || !self.exclude_addrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::Action;

    #[test]
    fn test_minimal_plan_defaults() {
        let plan = Plan::from_json("{}").expect("empty plan");
        assert_eq!(plan.ui_mode, UiMode::Normal);
        assert!(plan.changes.resources.is_empty());
        assert!(!plan.errored);
        assert!(!plan.is_filtered());
    }

    #[test]
    fn test_plan_with_filters_and_variables() {
        let plan = Plan::from_json(
            r#"{
                "ui_mode": "destroy",
                "variable_values": {"region": "\"eu-west-1\"", "broken": "{nope"},
                "target_addrs": ["module.app"],
                "changes": {"resources": [
                    {"addr": "module.app.aws_instance.web", "provider": "aws", "action": "delete",
                     "before": {"id": "i-1"}}
                ]}
            }"#,
        )
        .expect("valid plan");

        assert_eq!(plan.ui_mode, UiMode::Destroy);
        assert!(plan.is_filtered());
        assert_eq!(plan.changes.resources[0].action, Action::Delete);
        assert_eq!(
            plan.variable_values["region"].decode().ok(),
            Some(serde_json::json!("eu-west-1"))
        );
        assert!(plan.variable_values["broken"].decode().is_err());
    }

    #[test]
    fn test_unreadable_plan() {
        assert!(Plan::from_json("[]").is_err());
    }
}
