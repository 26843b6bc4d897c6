//! Check results for resource postconditions.
//!
//! A plan carries the check results computed at plan time. During an apply,
//! every resource node with postconditions reports into a [`CheckCollector`];
//! the finalizer copies the collected results onto the new state.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of the checks declared on one configuration object.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The checks were never evaluated.
    #[default]
    Unknown,
    /// Every condition held.
    Pass,
    /// At least one condition was false.
    Fail,
    /// At least one condition could not be evaluated.
    Error,
}

/// Aggregated result for one configuration object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResult {
    /// Aggregated status.
    pub status: CheckStatus,
    /// Messages of failed conditions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_messages: Vec<String>,
}

/// Check results keyed by configuration object address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResults {
    /// Results per object.
    #[serde(default)]
    pub objects: BTreeMap<String, CheckResult>,
}

impl CheckStatus {
    const fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Pass => 1,
            Self::Fail => 2,
            Self::Error => 3,
        }
    }

    /// Combines two statuses, keeping the most severe one.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

impl CheckResults {
    /// Returns true if no object has a result.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns the result for an object.
    #[must_use]
    pub fn get(&self, object: &str) -> Option<&CheckResult> {
        self.objects.get(object)
    }
}

/// Concurrent collector for check results reported during a walk.
#[derive(Debug, Default)]
pub struct CheckCollector {
    results: DashMap<String, CheckResult>,
}

impl CheckCollector {
    /// Creates a collector expecting results for the given objects.
    ///
    /// Declared objects that never report end up [`CheckStatus::Unknown`].
    #[must_use]
    pub fn new(declared: impl IntoIterator<Item = String>) -> Self {
        let results = DashMap::new();
        for object in declared {
            results.insert(object, CheckResult::default());
        }
        Self { results }
    }

    /// Records one evaluated condition for an object.
    pub fn report(&self, object: &str, status: CheckStatus, message: Option<String>) {
        let mut entry = self.results.entry(object.to_string()).or_default();
        entry.status = entry.status.merge(status);
        if let Some(message) = message {
            entry.failure_messages.push(message);
        }
    }

    /// Returns a snapshot of the collected results.
    #[must_use]
    pub fn results(&self) -> CheckResults {
        CheckResults {
            objects: self
                .results
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_precedence() {
        assert_eq!(CheckStatus::Pass.merge(CheckStatus::Fail), CheckStatus::Fail);
        assert_eq!(CheckStatus::Error.merge(CheckStatus::Pass), CheckStatus::Error);
        assert_eq!(CheckStatus::Unknown.merge(CheckStatus::Pass), CheckStatus::Pass);
    }

    #[test]
    fn test_collector_merges_instances() {
        let collector = CheckCollector::new([
            String::from("aws_instance.web"),
            String::from("aws_instance.db"),
        ]);
        collector.report("aws_instance.web", CheckStatus::Pass, None);
        collector.report(
            "aws_instance.web",
            CheckStatus::Fail,
            Some(String::from("web[1] is not healthy")),
        );

        let results = collector.results();
        let web = results.get("aws_instance.web").expect("web result");
        assert_eq!(web.status, CheckStatus::Fail);
        assert_eq!(web.failure_messages, ["web[1] is not healthy"]);
        assert_eq!(
            results.get("aws_instance.db").map(|r| r.status),
            Some(CheckStatus::Unknown)
        );
    }
}
