use crate::shopify::client::{AdminClient, ShopifyError, user_errors};
use serde_json::{Value, json};
use tracing::{debug, warn};

const PUBLICATIONS: &str = r#"
query { publications(first: 10) { nodes { id name } } }
"#;

const PUBLISHABLE_PUBLISH: &str = r#"
mutation publishablePublish($id: ID!, $input: [PublicationInput!]!) {
  publishablePublish(id: $id, input: $input) {
    userErrors { field message }
  }
}
"#;

impl AdminClient {
    /// Publishes a product to the Online Store sales channel, falling
    /// back to the first publication when no channel carries that name.
    /// A store with no publications makes this a no-op.
    pub async fn publish_product(&self, product_id: &str) -> Result<(), ShopifyError> {
        let data = self.graphql(PUBLICATIONS, Value::Null).await?;
        let nodes = data["publications"]["nodes"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let publication_id = nodes
            .iter()
            .find(|node| {
                node["name"]
                    .as_str()
                    .is_some_and(|name| name.to_lowercase().contains("online store"))
            })
            .or_else(|| nodes.first())
            .and_then(|node| node["id"].as_str())
            .map(str::to_string);

        let Some(publication_id) = publication_id else {
            debug!(
                target = "flatlay.shopify",
                product_id, "no publications, skipping publish"
            );
            return Ok(());
        };

        let data = self
            .graphql(
                PUBLISHABLE_PUBLISH,
                json!({
                    "id": product_id,
                    "input": [{ "publicationId": publication_id }],
                }),
            )
            .await?;
        if let Some(message) = user_errors(&data, "publishablePublish") {
            warn!(target = "flatlay.shopify", product_id, %message, "publish refused");
        }
        Ok(())
    }
}
