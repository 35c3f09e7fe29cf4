//! Minimal GraphQL-over-HTTP client for the park middleware.
//!
//! Every request goes through one `reqwest::Client` built with the
//! configured timeout, so a hung upstream surfaces as
//! [`ParkError::Upstream`] instead of stalling the caller.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::UpstreamConfig;
use crate::error::{ParkError, Result};

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Value>,
}

pub struct GraphQlClient {
    http: reqwest::Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ParkError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.api_base.clone(),
        })
    }

    /// Underlying HTTP client, for plain downloads that share the timeout.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// POST `query` and decode its `data` member.
    ///
    /// A non-empty `errors` member fails the whole query even when partial
    /// `data` is present.
    pub async fn query<T: DeserializeOwned>(&self, query: &str, headers: &[(&str, &str)]) -> Result<T> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": {} }));
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ParkError::from_transport("GraphQL request", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ParkError::Upstream(format!(
                "GraphQL endpoint returned {status}: {body}"
            )));
        }

        let envelope: GraphQlResponse<T> = response
            .json()
            .await
            .map_err(|e| ParkError::from_transport("GraphQL response", e))?;

        if let Some(errors) = envelope.errors.filter(has_errors) {
            return Err(ParkError::Upstream(format!("GraphQL error: {errors}")));
        }

        envelope
            .data
            .ok_or_else(|| ParkError::Upstream("GraphQL response has no data".to_string()))
    }
}

fn has_errors(errors: &Value) -> bool {
    match errors {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}
