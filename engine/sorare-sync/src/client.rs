//! Sorare GraphQL client
//!
//! Transport failures, HTTP errors and responses without `data` surface as a
//! [`FetchError`]. Field-level GraphQL `errors` next to usable `data` are kept
//! on the [`GraphQlResponse`]: [`GraphQlClient::fetch`] logs them and returns
//! the data, [`GraphQlClient::fetch_strict`] turns them into an error.

use crate::config::SorareConfig;
use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned by remote fetches
#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS or timeout failure
    #[error("network error: {0}")]
    Network(String),

    /// The API rejected the variables (HTTP 422)
    #[error("unprocessable request: {0}")]
    Unprocessable(String),

    /// Any other non-success HTTP status
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// The body was not the expected JSON
    #[error("malformed response: {0}")]
    Decode(String),

    /// The response carried a GraphQL `errors` array
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
}

/// A decoded GraphQL response
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlResponse {
    pub data: Value,
    /// Messages of the `errors` array, empty on full success
    pub errors: Vec<String>,
}

impl GraphQlResponse {
    /// The data, or the errors when there are any
    pub fn into_strict(self) -> Result<Value, FetchError> {
        if self.errors.is_empty() {
            Ok(self.data)
        } else {
            Err(FetchError::GraphQl(self.errors.join("; ")))
        }
    }
}

impl From<Value> for GraphQlResponse {
    fn from(data: Value) -> Self {
        Self { data, errors: Vec::new() }
    }
}

/// Something that can execute a GraphQL query
#[async_trait::async_trait]
pub trait GraphQlClient: Send + Sync {
    /// Execute `query` with `variables`
    async fn execute(&self, query: &str, variables: Value) -> Result<GraphQlResponse, FetchError>;

    /// The `data` object, logging field errors that came with it
    async fn fetch(&self, query: &str, variables: Value) -> Result<Value, FetchError> {
        let response = self.execute(query, variables).await?;
        if !response.errors.is_empty() {
            warn!("GraphQL returned partial data: {}", response.errors.join("; "));
        }
        Ok(response.data)
    }

    /// The `data` object, failing on any GraphQL error
    async fn fetch_strict(&self, query: &str, variables: Value) -> Result<Value, FetchError> {
        self.execute(query, variables).await?.into_strict()
    }
}

/// HTTP client for the Sorare API
pub struct SorareClient {
    client: Client,
    api_url: String,
    api_key: String,
    api_version: String,
}

impl SorareClient {
    /// Create a new client
    pub fn new(config: &SorareConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent("Mozilla/5.0")
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait::async_trait]
impl GraphQlClient for SorareClient {
    async fn execute(&self, query: &str, variables: Value) -> Result<GraphQlResponse, FetchError> {
        debug!("GraphQL request with variables {}", variables);

        let response = self
            .client
            .post(&self.api_url)
            .header("APIKEY", &self.api_key)
            .header("X-Sorare-ApiVersion", &self.api_version)
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| FetchError::Network(e.to_string()))?;

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!("Unprocessable request for {}: {}", variables, body);
            return Err(FetchError::Unprocessable(body));
        }

        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), body });
        }

        parse_graphql_body(&body)
    }
}

/// Split a GraphQL response body into `data` and error messages
///
/// A body without `data` is an error; its `errors`, if any, become the message.
pub fn parse_graphql_body(body: &str) -> Result<GraphQlResponse, FetchError> {
    let mut payload: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    let errors: Vec<String> = match payload.get("errors") {
        Some(Value::Array(errors)) => errors
            .iter()
            .map(|e| match e.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => e.to_string(),
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.to_string()],
    };

    match payload.get_mut("data").map(Value::take) {
        Some(Value::Null) | None if !errors.is_empty() => {
            Err(FetchError::GraphQl(errors.join("; ")))
        }
        Some(Value::Null) | None => Err(FetchError::Decode("response has no data".to_string())),
        Some(data) => Ok(GraphQlResponse { data, errors }),
    }
}

/// Walk a JSON value along `path`, treating any missing step as absent
pub fn at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key)).filter(|v| !v.is_null())
}
