//! Provider function result cache.
//!
//! Provider functions are pure, so a call with the same arguments must return
//! the same result everywhere within one apply, and the same result it
//! returned while planning. Results are keyed by a SHA-256 fingerprint of the
//! provider, function name and canonical JSON arguments.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::error::EvalError;

/// A function result recorded in a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResultRecord {
    /// Call fingerprint.
    pub fingerprint: String,
    /// Recorded result.
    pub result: Value,
}

/// Identity of one provider function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    /// Provider local name.
    pub provider: String,
    /// Function name.
    pub function: String,
    /// Evaluated arguments.
    pub args: Vec<Value>,
}

/// Memoized provider function results shared by graph and walk.
///
/// Each fingerprint owns one cell, so concurrent identical calls wait on the
/// first one instead of reaching the provider again.
#[derive(Debug, Default)]
pub struct FunctionResults {
    results: DashMap<String, Arc<OnceCell<Value>>>,
}

impl FunctionCall {
    /// Parses `provider::<provider>::<function>`.
    #[must_use]
    pub fn parse(name: &str, args: Vec<Value>) -> Option<Self> {
        let rest = name.strip_prefix("provider::")?;
        let (provider, function) = rest.split_once("::")?;
        if provider.is_empty() || function.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            function: function.to_string(),
            args,
        })
    }

    /// Computes the call fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.provider.as_bytes());
        hasher.update([0]);
        hasher.update(self.function.as_bytes());
        hasher.update([0]);
        for arg in &self.args {
            // Object keys serialize sorted, so the encoding is canonical.
            hasher.update(arg.to_string().as_bytes());
            hasher.update([0]);
        }
        hex::encode(hasher.finalize())
    }
}

impl FunctionResults {
    /// Creates a cache seeded with results recorded at plan time.
    #[must_use]
    pub fn from_records(records: &[FunctionResultRecord]) -> Self {
        let results = DashMap::new();
        for record in records {
            results.insert(
                record.fingerprint.clone(),
                Arc::new(OnceCell::from(record.result.clone())),
            );
        }
        Self { results }
    }

    /// Returns the memoized result of a call.
    #[must_use]
    pub fn get(&self, call: &FunctionCall) -> Option<Value> {
        self.results
            .get(&call.fingerprint())
            .and_then(|cell| cell.get().cloned())
    }

    /// Returns the memoized result of a call, running `compute` at most once
    /// per fingerprint. A failed computation is not memoized.
    ///
    /// # Errors
    ///
    /// Returns the error of `compute`.
    pub async fn get_or_call<F, Fut>(&self, call: &FunctionCall, compute: F) -> Result<Value, EvalError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, EvalError>>,
    {
        let cell = Arc::clone(&self.results.entry(call.fingerprint()).or_default());
        cell.get_or_try_init(compute).await.cloned()
    }

    /// Returns every recorded result.
    #[must_use]
    pub fn records(&self) -> Vec<FunctionResultRecord> {
        let mut records: Vec<_> = self
            .results
            .iter()
            .filter_map(|entry| {
                entry.value().get().map(|result| FunctionResultRecord {
                    fingerprint: entry.key().clone(),
                    result: result.clone(),
                })
            })
            .collect();
        records.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        records
    }

    /// Returns the number of recorded results.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.iter().filter(|entry| entry.value().initialized()).count()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn arn_parse(arn: &str) -> FunctionCall {
        FunctionCall::parse("provider::aws::arn_parse", vec![json!(arn)]).expect("valid call")
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = FunctionCall::parse("provider::aws::tags", vec![json!({"b": 1, "a": 2})]).expect("call");
        let b = FunctionCall::parse("provider::aws::tags", vec![json!({"a": 2, "b": 1})]).expect("call");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
        assert_ne!(a.fingerprint(), arn_parse("x").fingerprint());
    }

    #[test]
    fn test_parse_rejects_non_provider_functions() {
        assert!(FunctionCall::parse("upper", vec![]).is_none());
        assert!(FunctionCall::parse("provider::aws", vec![]).is_none());
        assert!(FunctionCall::parse("provider::::f", vec![]).is_none());
    }

    #[tokio::test]
    async fn test_seeded_results_skip_the_provider() {
        let call = arn_parse("arn:aws:s3:::logs");
        let results = FunctionResults::from_records(&[FunctionResultRecord {
            fingerprint: call.fingerprint(),
            result: json!({"service": "s3"}),
        }]);

        assert_eq!(results.get(&call), Some(json!({"service": "s3"})));
        let seeded = results
            .get_or_call(&call, || async { Ok(json!({"service": "ec2"})) })
            .await;
        assert_eq!(seeded, Ok(json!({"service": "s3"})));

        let other = arn_parse("arn:aws:ec2:::i-1");
        let failed = results
            .get_or_call(&other, || async {
                Err(EvalError::FunctionCall {
                    function: String::from("provider::aws::arn_parse"),
                    message: String::from("throttled"),
                })
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(results.len(), 1);

        let retried = results
            .get_or_call(&other, || async { Ok(json!({"service": "ec2"})) })
            .await;
        assert_eq!(retried, Ok(json!({"service": "ec2"})));
        assert_eq!(results.records().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_calls_run_once() {
        let results = Arc::new(FunctionResults::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let results = Arc::clone(&results);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    let call = arn_parse("arn:aws:s3:::logs");
                    results
                        .get_or_call(&call, || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(json!({"service": "s3"}))
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.expect("task"), Ok(json!({"service": "s3"})));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
