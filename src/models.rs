use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One normalized catalog row: a single color variant of a product.
///
/// Rows sharing a `product_number` form a variant group; the non-color
/// fields are trusted from the first member when the parent product is
/// created downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub product_number: String,
    pub gender_code: String,
    pub color_code: String,
    pub product_name: String,
    pub color_name: String,
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Raw product row as the frontend sends it (store-builder output and
/// push payloads both use the CSV column names as JSON keys).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProductRow {
    #[serde(rename = "ProductNumber", default)]
    pub product_number: String,
    #[serde(rename = "GenderCode", default)]
    pub gender_code: String,
    #[serde(rename = "ColorCode", default)]
    pub color_code: String,
    #[serde(rename = "ProductName", default)]
    pub product_name: String,
    #[serde(rename = "ColorName", default)]
    pub color_name: String,
    #[serde(rename = "ProductType", default)]
    pub product_type: String,
    #[serde(rename = "Description", default)]
    pub description: String,
    #[serde(rename = "Price", default)]
    pub price: String,
    #[serde(rename = "Inventory", default)]
    pub inventory: String,
    #[serde(rename = "FlatLayPrompt", default)]
    pub flat_lay_prompt: String,
}

impl RawProductRow {
    /// Stock quantity as a number; blank or malformed values count as zero.
    pub fn inventory_quantity(&self) -> i64 {
        self.inventory.trim().parse::<i64>().unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateCsvResponse {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    pub preview: Vec<PreviewRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub product_number: String,
    pub product_name: String,
    pub gender_code: String,
    pub color_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductsRequest {
    pub api_key: String,
    pub products: Vec<RawProductRow>,
    #[serde(default = "default_photo_style")]
    pub photo_style: String,
}

fn default_photo_style() -> String {
    "professional product photography, clean white background, soft shadows".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RegenerateSingleRequest {
    pub api_key: String,
    pub product_number: String,
    pub product_name: String,
    #[serde(default = "default_gender_code")]
    pub gender_code: String,
    #[serde(default)]
    pub color_code: String,
    #[serde(default)]
    pub color_name: String,
    pub prompt: String,
}

fn default_gender_code() -> String {
    "U".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateSingleResponse {
    pub filename: String,
    pub product_name: String,
    pub color_name: String,
    pub prompt: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct ShopifyValidateRequest {
    pub store_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct ShopifyValidateResponse {
    pub ok: bool,
    pub shop_name: String,
    pub store_url: String,
}

/// Brand metadata produced by the store builder; only `name` is used as
/// the product vendor on push, the rest rides along for the frontend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Brand {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tagline: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub style: String,
}

#[derive(Debug, Deserialize)]
pub struct ShopifyPushRequest {
    pub store_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub products: Vec<RawProductRow>,
    #[serde(default)]
    pub brand: Option<Brand>,
    /// filename -> base64 JPEG bytes, keyed by the deterministic filename.
    pub images: HashMap<String, String>,
    /// Numeric Shopify location id override for inventory activation.
    #[serde(default)]
    pub location_id: Option<String>,
}
