use crate::genai::config::{API_ROOT, TEXT_MODEL};
use crate::genai::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::http::build_client;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Caller-supplied reference material attached to the concept prompt.
#[derive(Debug, Clone)]
pub enum ConceptPart {
    Text(String),
    Inline { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Error)]
pub enum ConceptError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not parse response as JSON")]
    Parse,
    #[error("response missing required 'brand' or 'products' fields")]
    MissingFields,
}

/// Brand concept plus product catalog rows, passed through to the stream
/// as-is; the rows use the CSV column names as keys.
#[derive(Debug, Clone)]
pub struct StoreConcept {
    pub brand: Value,
    pub products: Value,
}

#[derive(Clone)]
pub struct ConceptClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl ConceptClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: build_client(),
            api_key: api_key.into(),
            base_url: API_ROOT.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Asks the text model for a brand concept and `product_count`
    /// product designs with 2-3 color variants each, as JSON.
    pub async fn generate_store_concept(
        &self,
        description: &str,
        product_count: usize,
        extra_parts: &[ConceptPart],
    ) -> Result<StoreConcept, ConceptError> {
        let mut parts = vec![Part::text(concept_prompt(description, product_count))];
        for extra in extra_parts {
            parts.push(match extra {
                ConceptPart::Text(text) => Part::text(text.clone()),
                ConceptPart::Inline { mime_type, data } => {
                    Part::inline(mime_type.clone(), BASE64.encode(data))
                }
            });
        }

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Vec::new(),
                response_mime_type: Some("application/json"),
            }),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, *TEXT_MODEL
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ConceptError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ConceptError::Request(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let payload: GenerateContentResponse = response
            .json()
            .await
            .map_err(|err| ConceptError::Request(err.to_string()))?;

        let value = parse_concept_json(&payload.joined_text())?;
        let brand = value.get("brand").cloned().ok_or(ConceptError::MissingFields)?;
        let products = value
            .get("products")
            .cloned()
            .ok_or(ConceptError::MissingFields)?;
        Ok(StoreConcept { brand, products })
    }
}

/// Parses the model output, tolerating prose around the JSON object by
/// falling back to the outermost brace span.
fn parse_concept_json(text: &str) -> Result<Value, ConceptError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }
    let start = trimmed.find('{').ok_or(ConceptError::Parse)?;
    let end = trimmed.rfind('}').ok_or(ConceptError::Parse)?;
    if end <= start {
        return Err(ConceptError::Parse);
    }
    serde_json::from_str(&trimmed[start..=end]).map_err(|_| ConceptError::Parse)
}

fn concept_prompt(description: &str, product_count: usize) -> String {
    format!(
        r#"You are a creative brand strategist and product designer. Based on the following store description, create a complete brand concept and product catalog.

STORE DESCRIPTION:
{description}

REQUIREMENTS:
1. Create a brand with:
   - name: A unique, memorable brand name
   - tagline: A catchy slogan (max 10 words)
   - description: Brief brand story (2-3 sentences)
   - style: Visual style keywords for image generation (e.g., "minimalist, earth tones, natural textures")

2. Generate exactly {product_count} unique product designs. For each design, create 2-3 color variants.
   All color variants of the same product MUST share the same ProductNumber and ProductName, but differ in ColorCode, ColorName, and FlatLayPrompt.

   Each product variant row must have:
   - ProductNumber: Format "CNC-P001", "CNC-P002", etc. Same number for all color variants of the same product.
   - ProductName: Descriptive product name. Same for all color variants of the same product.
   - GenderCode: "M" (Men), "W" (Women), or "U" (Unisex)
   - ColorCode: 2-3 letter uppercase code (e.g., "BLK", "WHT", "NVY")
   - ColorName: Full color name (e.g., "Black", "White", "Navy Blue")
   - ProductType: A store product category (e.g., "T-Shirt", "Pants", "Jacket", "Hoodie", "Sneakers"). Same for all variants of the same product.
   - Description: A compelling product description (2-3 sentences). Highlight materials, features, and appeal. Write in a brand-appropriate tone.
   - Price: A realistic retail price as a number (no currency symbol), e.g. "49.99"
   - Inventory: A random whole number between 1 and 100 representing stock quantity, e.g. "42". Each variant should have a different random value.
   - FlatLayPrompt: Detailed image generation prompt for a flat-lay product photo. Include the exact product type and style, color and material details, background and lighting consistent with the brand, any props or styling elements, and specify "flat-lay product photography" style.

IMPORTANT: The FlatLayPrompt should be detailed enough to generate a professional product image. Make all products cohesive with the brand style.

Respond with valid JSON only, no markdown formatting:
{{
  "brand": {{"name": "...", "tagline": "...", "description": "...", "style": "..."}},
  "products": [
    {{"ProductNumber": "CNC-P001", "ProductName": "...", "GenderCode": "...", "ColorCode": "BLK", "ColorName": "Black", "ProductType": "...", "Description": "...", "Price": "49.99", "Inventory": "42", "FlatLayPrompt": "..."}}
  ]
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn store_concept_round_trips_brand_and_products() {
        let server = MockServer::start().await;
        let concept_json = json!({
            "brand": {"name": "Northwind", "tagline": "Gear up."},
            "products": [{"ProductNumber": "CNC-P001"}]
        })
        .to_string();
        Mock::given(method("POST"))
            .and(path(format!(
                "/v1beta/models/{}:generateContent",
                *TEXT_MODEL
            )))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": concept_json}]}
                }]
            })))
            .mount(&server)
            .await;

        let client = ConceptClient::new("test-key").with_base_url(server.uri());
        let concept = client
            .generate_store_concept("outdoor gear", 5, &[])
            .await
            .unwrap();
        assert_eq!(concept.brand["name"], "Northwind");
        assert_eq!(concept.products[0]["ProductNumber"], "CNC-P001");
    }

    #[tokio::test]
    async fn missing_catalog_fields_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"brand\": {}}"}]}
                }]
            })))
            .mount(&server)
            .await;

        let client = ConceptClient::new("test-key").with_base_url(server.uri());
        let err = client
            .generate_store_concept("outdoor gear", 5, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ConceptError::MissingFields));
    }

    #[test]
    fn parses_plain_json() {
        let value = parse_concept_json(r#"{"brand":{},"products":[]}"#).unwrap();
        assert!(value.get("brand").is_some());
    }

    #[test]
    fn extracts_json_wrapped_in_prose() {
        let text = "Here is your catalog:\n{\"brand\":{\"name\":\"X\"},\"products\":[]}\nEnjoy!";
        let value = parse_concept_json(text).unwrap();
        assert_eq!(value["brand"]["name"], "X");
    }

    #[test]
    fn rejects_braceless_text() {
        assert!(matches!(
            parse_concept_json("no json here"),
            Err(ConceptError::Parse)
        ));
    }

    #[test]
    fn prompt_embeds_description_and_count() {
        let prompt = concept_prompt("hiking gear", 7);
        assert!(prompt.contains("hiking gear"));
        assert!(prompt.contains("exactly 7 unique product designs"));
    }
}
