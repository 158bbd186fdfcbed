use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::StatusOracle;
use crate::error::OracleError;
use crate::orders::models::{OrderId, OrderStatus, StrategyStatus};

const STATUS_FIELD: &str = "getStrategyStatusByHash";

const STATUS_QUERY: &str = r#"
query StrategyStatusByHash($hash: String!) {
  getStrategyStatusByHash(input: { hash: $hash })
}
"#;

/// CCAI terminal API client (GraphQL over HTTP)
pub struct CcaiOracle {
    client: Client,
    endpoint: String,
}

impl CcaiOracle {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Raw strategy status for one order hash
    pub async fn fetch_status(&self, id: &OrderId) -> Result<StrategyStatus, OracleError> {
        let body: Value = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "query": STATUS_QUERY,
                "variables": { "hash": id.as_str() },
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_status_response(&body)
    }
}

#[async_trait]
impl StatusOracle for CcaiOracle {
    #[instrument(skip(self), fields(order_id = %id))]
    async fn query_status(&self, id: &OrderId) -> OrderStatus {
        debug!("Querying CCAI API for order status");

        match self.fetch_status(id).await {
            Ok(status) => {
                debug!("Status {} for order {}", status, id);
                status.classify()
            }
            Err(e) => {
                warn!("Exception while querying CCAI API for {}: {}", id, e);
                OrderStatus::NotTerminal
            }
        }
    }
}

/// Extract the strategy status from a GraphQL response body
pub fn parse_status_response(body: &Value) -> Result<StrategyStatus, OracleError> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        return Err(OracleError::GraphQl(errors.to_string()));
    }

    let data = body
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or(OracleError::MissingField("data"))?;

    let value = data
        .get(STATUS_FIELD)
        .filter(|v| !v.is_null())
        .ok_or(OracleError::MissingField(STATUS_FIELD))?;

    let label = value
        .as_str()
        .ok_or_else(|| OracleError::UnexpectedPayload(value.to_string()))?;

    Ok(StrategyStatus::from_label(label))
}
