use crate::genai::config::{API_ROOT, IMAGE_MODEL};
use crate::genai::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use crate::http::build_client;
use crate::transcode;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

/// Retry bounds for one generation call. Explicit so tests can run with a
/// zero base delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: `base_delay * 2^attempt`, attempt counted
    /// from zero.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Terminal failure of one generation call after the retry budget is
/// spent. Callers treat this as a recoverable per-item failure; it never
/// propagates past the orchestrator.
#[derive(Debug, Error)]
#[error("image generation failed: {message}")]
pub struct GenError {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Reference image supplied as conditioning input so a later variant keeps
/// the same product geometry while changing color.
#[derive(Debug, Clone)]
pub struct Reference {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct ImageClient {
    http: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl ImageClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: build_client(),
            api_key: api_key.into(),
            base_url: API_ROOT.clone(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Generates one image, retrying on any failure including a response
    /// that carries no image payload. Sleeps between attempts but not
    /// after the last; on exhaustion returns the last observed error.
    ///
    /// PNG results are transcoded to JPEG; a failed transcode delivers
    /// the PNG unchanged.
    pub async fn generate(
        &self,
        prompt: &str,
        reference: Option<&Reference>,
    ) -> Result<GeneratedImage, GenError> {
        let mut last_error = String::from("no attempts made");
        for attempt in 0..self.retry.max_attempts {
            match self.generate_once(prompt, reference).await {
                Ok(image) => return Ok(self.deliver(image).await),
                Err(message) => {
                    warn!(
                        target = "flatlay.genai",
                        attempt,
                        error = %message,
                        "image_generation_attempt_failed"
                    );
                    last_error = message;
                }
            }
            if attempt + 1 < self.retry.max_attempts {
                sleep(self.retry.delay(attempt)).await;
            }
        }
        Err(GenError {
            message: last_error,
        })
    }

    async fn generate_once(
        &self,
        prompt: &str,
        reference: Option<&Reference>,
    ) -> Result<GeneratedImage, String> {
        let mut parts = Vec::new();
        if let Some(reference) = reference {
            parts.push(Part::inline(
                reference.mime_type.clone(),
                BASE64.encode(&reference.data),
            ));
        }
        parts.push(Part::text(prompt));

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
                response_mime_type: None,
            }),
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, *IMAGE_MODEL
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let payload: GenerateContentResponse =
            response.json().await.map_err(|err| err.to_string())?;

        let inline = payload
            .first_inline_data()
            .ok_or_else(|| "No image data in API response".to_string())?;
        let data = BASE64
            .decode(&inline.data)
            .map_err(|err| format!("invalid image payload: {err}"))?;
        Ok(GeneratedImage {
            data,
            mime_type: inline.mime_type.clone(),
        })
    }

    /// Canonical delivery format is JPEG; PNG output is transcoded and
    /// kept as PNG only when the transcode fails.
    async fn deliver(&self, image: GeneratedImage) -> GeneratedImage {
        if image.mime_type != "image/png" {
            return image;
        }
        match transcode::png_to_jpeg(&image.data).await {
            Some(jpeg) => GeneratedImage {
                data: jpeg,
                mime_type: "image/jpeg".to_string(),
            },
            None => image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn backoff_doubles_per_attempt() {
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(retry.delay(0), Duration::from_secs(2));
        assert_eq!(retry.delay(1), Duration::from_secs(4));
        assert_eq!(retry.delay(2), Duration::from_secs(8));
    }

    fn no_backoff() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        }
    }

    fn model_path() -> String {
        format!("/v1beta/models/{}:generateContent", *IMAGE_MODEL)
    }

    fn image_response(bytes: &[u8]) -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "image/jpeg",
                            "data": BASE64.encode(bytes),
                        }
                    }]
                }
            }]
        })
    }

    #[tokio::test]
    async fn generate_recovers_after_transient_failures() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(model_path()))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(model_path()))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response(b"jpeg")))
            .mount(&server)
            .await;

        let client = ImageClient::new("test-key")
            .with_base_url(server.uri())
            .with_retry(no_backoff());
        let image = client.generate("flat-lay jacket", None).await.unwrap();
        assert_eq!(image.data, b"jpeg");
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn generate_surfaces_last_error_after_exhaustion() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(model_path()))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = ImageClient::new("test-key")
            .with_base_url(server.uri())
            .with_retry(no_backoff());
        let err = client.generate("flat-lay jacket", None).await.unwrap_err();
        assert!(err.message.contains("HTTP 500"), "got: {}", err.message);
    }

    #[tokio::test]
    async fn response_without_image_payload_counts_as_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(model_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "cannot comply" }] }
                }]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let client = ImageClient::new("test-key")
            .with_base_url(server.uri())
            .with_retry(no_backoff());
        let err = client.generate("flat-lay jacket", None).await.unwrap_err();
        assert_eq!(err.message, "No image data in API response");
    }
}
