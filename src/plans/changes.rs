//! Planned resource instance changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::addrs::{ProviderAddr, ResourceInstanceAddr};

/// The set of changes recorded in a plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Changes {
    /// One entry per affected resource instance.
    #[serde(default)]
    pub resources: Vec<ResourceChange>,
}

/// A planned change to one resource instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceChange {
    /// Instance address.
    pub addr: ResourceInstanceAddr,
    /// Provider configuration handling the instance.
    pub provider: ProviderAddr,
    /// Primary action.
    pub action: Action,
    /// Value before the change.
    #[serde(default)]
    pub before: Option<Value>,
    /// Planned value after the change.
    #[serde(default)]
    pub after: Option<Value>,
    /// Set when an existing object is adopted into management.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importing: Option<Importing>,
    /// Set when the instance is dropped from state without being destroyed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forgetting: Option<Forgetting>,
}

/// Importing marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Importing {
    /// Provider-specific identifier of the existing object.
    pub id: String,
}

/// Forgetting marker.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Forgetting {}

/// Primary action of a planned change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing to do.
    NoOp,
    /// Create a new object.
    Create,
    /// Read a data source.
    Read,
    /// Update the object in place.
    Update,
    /// Destroy the object.
    Delete,
    /// Destroy the object, then create its replacement.
    DeleteThenCreate,
    /// Create the replacement, then destroy the old object.
    CreateThenDelete,
    /// Drop the instance from state without destroying it.
    Forget,
}

impl ResourceChange {
    /// Returns true if the instance is dropped from state without destruction.
    #[must_use]
    pub const fn is_forget(&self) -> bool {
        matches!(self.action, Action::Forget) || self.forgetting.is_some()
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::DeleteThenCreate => "replace (delete first)",
            Self::CreateThenDelete => "replace (create first)",
            Self::Forget => "forget",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_from_json() {
        let change: ResourceChange = serde_json::from_str(
            r#"{
                "addr": "aws_instance.web[0]",
                "provider": "aws",
                "action": "no_op",
                "before": {"id": "i-123"},
                "after": {"id": "i-123"},
                "importing": {"id": "i-123"}
            }"#,
        )
        .expect("valid change");

        assert_eq!(change.addr.to_string(), "aws_instance.web[0]");
        assert_eq!(change.action, Action::NoOp);
        assert_eq!(
            change.importing,
            Some(Importing {
                id: String::from("i-123")
            })
        );
        assert!(!change.is_forget());
    }

    #[test]
    fn test_forgetting_marker_counts_as_forget() {
        let change: ResourceChange = serde_json::from_str(
            r#"{"addr": "aws_s3_bucket.logs", "provider": "aws", "action": "delete", "forgetting": {}}"#,
        )
        .expect("valid change");
        assert!(change.is_forget());
    }
}
