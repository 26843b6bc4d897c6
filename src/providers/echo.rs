//! A provider that applies planned values as-is.
//!
//! Useful for dry runs of the engine: every create and update returns the
//! planned object, assigning an `id` when the plan left it unset.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::ProviderError;

use super::{ApplyAction, ApplyRequest, Provider};

/// Provider echoing planned values.
#[derive(Debug, Default)]
pub struct EchoProvider;

impl EchoProvider {
    /// Creates a new echo provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for EchoProvider {
    async fn configure(&self, config: Value) -> Result<(), ProviderError> {
        if config.is_object() || config.is_null() {
            Ok(())
        } else {
            Err(ProviderError::InvalidConfiguration {
                message: String::from("configuration must be an object"),
            })
        }
    }

    async fn apply(&self, request: ApplyRequest) -> Result<Option<Value>, ProviderError> {
        debug!("echo {} {}", request.action, request.addr);
        match request.action {
            ApplyAction::Delete => Ok(None),
            ApplyAction::Create | ApplyAction::Update => {
                let mut value = request
                    .planned
                    .or(request.prior)
                    .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
                if let Value::Object(map) = &mut value {
                    if !map.get("id").is_some_and(|id| !id.is_null()) {
                        let id = format!(
                            "{}-{}",
                            request.addr.resource.type_name,
                            &Uuid::new_v4().to_string()[..8]
                        );
                        map.insert(String::from("id"), Value::String(id));
                    }
                }
                Ok(Some(value))
            }
        }
    }

    async fn read_data_source(&self, _type_name: String, config: Value) -> Result<Value, ProviderError> {
        Ok(config)
    }

    async fn call_function(&self, name: String, _args: Vec<Value>) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownFunction { function: name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(action: ApplyAction, planned: Option<Value>) -> ApplyRequest {
        ApplyRequest {
            addr: "aws_instance.web".parse().expect("addr"),
            action,
            prior: None,
            planned,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let provider = EchoProvider::new();
        let created = provider
            .apply(request(ApplyAction::Create, Some(json!({"ami": "ami-1", "id": null}))))
            .await
            .expect("create")
            .expect("object");
        assert_eq!(created["ami"], "ami-1");
        assert!(created["id"].as_str().is_some_and(|id| id.starts_with("aws_instance-")));
    }

    #[tokio::test]
    async fn test_delete_returns_nothing() {
        let provider = EchoProvider::new();
        let deleted = provider.apply(request(ApplyAction::Delete, None)).await.expect("delete");
        assert!(deleted.is_none());
    }
}
