use crate::shopify::client::{AdminClient, ShopifyError, user_errors};
use serde_json::{Value, json};
use tracing::info;

const PRODUCT_SET: &str = r#"
mutation productSet($input: ProductSetInput!, $synchronous: Boolean!) {
  productSet(input: $input, synchronous: $synchronous) {
    product {
      id
      title
      handle
      variants(first: 20) {
        nodes {
          id
          sku
          inventoryItem { id }
        }
      }
    }
    userErrors { field message }
  }
}
"#;

/// One color variant as it goes into `productSet`.
#[derive(Debug, Clone)]
pub struct VariantDraft {
    pub color_name: String,
    pub price: String,
    pub sku: String,
    pub inventory: i64,
}

#[derive(Debug, Clone)]
pub struct MediaDraft {
    pub resource_url: String,
    pub alt: String,
}

#[derive(Debug, Clone)]
pub struct CreatedVariant {
    pub id: String,
    pub sku: String,
    pub inventory_item_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedProduct {
    pub id: String,
    pub title: String,
    pub handle: String,
    pub variants: Vec<CreatedVariant>,
}

impl AdminClient {
    /// Creates one product with its color variants and attached media in
    /// a single synchronous `productSet` call.
    pub async fn create_product(
        &self,
        title: &str,
        description_html: &str,
        vendor: &str,
        product_type: &str,
        variants: &[VariantDraft],
        media: &[MediaDraft],
    ) -> Result<CreatedProduct, ShopifyError> {
        let option_values: Vec<Value> = variants
            .iter()
            .map(|draft| json!({ "name": draft.color_name }))
            .collect();
        let variant_inputs: Vec<Value> = variants
            .iter()
            .map(|draft| {
                json!({
                    "optionValues": [{ "optionName": "Color", "name": draft.color_name }],
                    "price": draft.price,
                    "sku": draft.sku,
                    "inventoryItem": { "tracked": true },
                })
            })
            .collect();
        let files: Vec<Value> = media
            .iter()
            .map(|draft| {
                json!({
                    "originalSource": draft.resource_url,
                    "alt": draft.alt,
                    "contentType": "IMAGE",
                })
            })
            .collect();

        let variables = json!({
            "synchronous": true,
            "input": {
                "title": title,
                "descriptionHtml": description_html,
                "vendor": vendor,
                "productType": product_type,
                "status": "ACTIVE",
                "productOptions": [{ "name": "Color", "values": option_values }],
                "variants": variant_inputs,
                "files": files,
            }
        });

        let data = self.graphql(PRODUCT_SET, variables).await?;

        if let Some(message) = user_errors(&data, "productSet") {
            return Err(ShopifyError::UserError(format!(
                "Product creation error: {message}"
            )));
        }

        let product = &data["productSet"]["product"];
        if product.is_null() {
            return Err(ShopifyError::Graphql(
                "productSet returned no product".to_string(),
            ));
        }

        let created = CreatedProduct {
            id: string_field(product, "id"),
            title: string_field(product, "title"),
            handle: string_field(product, "handle"),
            variants: product["variants"]["nodes"]
                .as_array()
                .map(|nodes| {
                    nodes
                        .iter()
                        .map(|node| CreatedVariant {
                            id: string_field(node, "id"),
                            sku: string_field(node, "sku"),
                            inventory_item_id: node["inventoryItem"]["id"]
                                .as_str()
                                .map(str::to_string),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        info!(
            target = "flatlay.shopify",
            title = %created.title,
            handle = %created.handle,
            variants = created.variants.len(),
            "product created"
        );
        Ok(created)
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopify::config::API_VERSION;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graphql_path() -> String {
        format!("/admin/api/{}/graphql.json", *API_VERSION)
    }

    fn drafts() -> Vec<VariantDraft> {
        vec![
            VariantDraft {
                color_name: "Black".to_string(),
                price: "49.99".to_string(),
                sku: "CNC-P001-BLK".to_string(),
                inventory: 12,
            },
            VariantDraft {
                color_name: "Navy".to_string(),
                price: "49.99".to_string(),
                sku: "CNC-P001-NVY".to_string(),
                inventory: 7,
            },
        ]
    }

    #[tokio::test]
    async fn create_product_parses_variants_with_inventory_items() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(graphql_path()))
            .and(body_string_contains("productSet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"productSet": {
                    "product": {
                        "id": "gid://shopify/Product/1",
                        "title": "Trail Jacket",
                        "handle": "trail-jacket",
                        "variants": {"nodes": [
                            {"id": "gid://shopify/ProductVariant/10", "sku": "CNC-P001-BLK",
                             "inventoryItem": {"id": "gid://shopify/InventoryItem/100"}},
                            {"id": "gid://shopify/ProductVariant/11", "sku": "CNC-P001-NVY",
                             "inventoryItem": {"id": "gid://shopify/InventoryItem/101"}}
                        ]}
                    },
                    "userErrors": []
                }}
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let created = client
            .create_product("Trail Jacket", "<p>desc</p>", "Acme", "Jacket", &drafts(), &[])
            .await
            .unwrap();
        assert_eq!(created.handle, "trail-jacket");
        assert_eq!(created.variants.len(), 2);
        assert_eq!(created.variants[1].sku, "CNC-P001-NVY");
        assert_eq!(
            created.variants[0].inventory_item_id.as_deref(),
            Some("gid://shopify/InventoryItem/100")
        );
    }

    #[tokio::test]
    async fn create_product_user_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(graphql_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"productSet": {
                    "product": null,
                    "userErrors": [{"field": ["title"], "message": "Title can't be blank"}]
                }}
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let err = client
            .create_product("", "", "", "", &drafts(), &[])
            .await
            .unwrap_err();
        assert!(
            matches!(&err, ShopifyError::UserError(msg) if msg.contains("Title can't be blank")),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn missing_product_in_clean_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(graphql_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"productSet": {"product": null, "userErrors": []}}
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let err = client
            .create_product("Trail Jacket", "", "", "", &drafts(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ShopifyError::Graphql(_)), "got: {err}");
    }
}
