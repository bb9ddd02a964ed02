use crate::http::build_client;
use crate::shopify::config::API_VERSION;
use reqwest::Client;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("{0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("GraphQL error: {0}")]
    Graphql(String),
    #[error("{0}")]
    UserError(String),
    #[error("no staged upload target returned")]
    MissingTarget,
}

/// Authenticated Admin GraphQL client for one store. Operation methods
/// live in the sibling modules (`uploads`, `products`, `inventory`,
/// `publish`) as further `impl` blocks.
#[derive(Clone)]
pub struct AdminClient {
    pub(crate) http: Client,
    base: String,
    token: String,
}

impl AdminClient {
    /// `base` is the store origin, e.g. `https://demo.myshopify.com`.
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: build_client(),
            base: base.into(),
            token: token.into(),
        }
    }

    fn graphql_url(&self) -> String {
        format!("{}/admin/api/{}/graphql.json", self.base, *API_VERSION)
    }

    /// Posts one GraphQL document and returns the `data` object.
    ///
    /// Transport failures and top-level `errors` entries both surface as
    /// `Err`; mutation `userErrors` live inside `data` and are checked by
    /// each operation, since not every caller treats them as fatal.
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ShopifyError> {
        let response = self
            .http
            .post(self.graphql_url())
            .header("X-Shopify-Access-Token", &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ShopifyError::Request(format!("HTTP {}", response.status())));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = join_messages(errors);
                debug!(target = "flatlay.shopify", errors = %joined, "graphql errors");
                return Err(ShopifyError::Graphql(joined));
            }
        }

        Ok(payload.get("data").cloned().unwrap_or(Value::Null))
    }

    /// Smoke-tests the token by querying the shop name.
    pub async fn shop_name(&self) -> Result<String, ShopifyError> {
        let data = self.graphql("{ shop { name } }", Value::Null).await?;
        Ok(data["shop"]["name"].as_str().unwrap_or_default().to_string())
    }
}

/// Joins the `message` fields of an error array, falling back to the raw
/// JSON when an entry has none.
pub(crate) fn join_messages(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|entry| {
            entry
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| entry.to_string())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Collects a mutation's `userErrors` into one message, `None` when the
/// array is absent or empty.
pub(crate) fn user_errors(data: &Value, mutation: &str) -> Option<String> {
    let errors = data.get(mutation)?.get("userErrors")?.as_array()?;
    if errors.is_empty() {
        return None;
    }
    Some(join_messages(errors))
}
