use crate::shopify::client::{AdminClient, ShopifyError, user_errors};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const STAGED_UPLOADS_CREATE: &str = r#"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      url
      resourceUrl
      parameters { name value }
    }
    userErrors { field message }
  }
}
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct StagedParameter {
    pub name: String,
    pub value: String,
}

/// One pre-signed upload slot. The `parameters` must be replayed as form
/// fields ahead of the file part, and `resource_url` is what product
/// mutations reference once the binary lands.
#[derive(Debug, Clone, Deserialize)]
pub struct StagedTarget {
    pub url: String,
    #[serde(rename = "resourceUrl")]
    pub resource_url: String,
    #[serde(default)]
    pub parameters: Vec<StagedParameter>,
}

impl AdminClient {
    /// Reserves a staged upload slot for one image file.
    pub async fn staged_upload(
        &self,
        filename: &str,
        mime_type: &str,
        size: usize,
    ) -> Result<StagedTarget, ShopifyError> {
        let variables = json!({
            "input": [{
                "resource": "IMAGE",
                "filename": filename,
                "mimeType": mime_type,
                "httpMethod": "POST",
                "fileSize": size.to_string(),
            }]
        });
        let data = self.graphql(STAGED_UPLOADS_CREATE, variables).await?;

        if let Some(message) = user_errors(&data, "stagedUploadsCreate") {
            return Err(ShopifyError::UserError(format!(
                "Staged upload error: {message}"
            )));
        }

        let target = data["stagedUploadsCreate"]["stagedTargets"]
            .as_array()
            .and_then(|targets| targets.first())
            .cloned()
            .ok_or(ShopifyError::MissingTarget)?;
        serde_json::from_value(target).map_err(|err| ShopifyError::Request(err.to_string()))
    }

    /// Uploads the bytes to a staged target and returns its resource URL.
    pub async fn upload_binary(
        &self,
        target: &StagedTarget,
        filename: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ShopifyError> {
        let mut form = Form::new();
        for parameter in &target.parameters {
            form = form.text(parameter.name.clone(), parameter.value.clone());
        }
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|err| ShopifyError::Request(err.to_string()))?;
        form = form.part("file", part);

        let response = self
            .http
            .post(&target.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ShopifyError::Request(format!("HTTP {}", response.status())));
        }
        debug!(target = "flatlay.shopify", filename, "staged upload complete");
        Ok(target.resource_url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shopify::config::API_VERSION;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graphql_path() -> String {
        format!("/admin/api/{}/graphql.json", *API_VERSION)
    }

    #[tokio::test]
    async fn staged_upload_parses_first_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(graphql_path()))
            .and(body_string_contains("stagedUploadsCreate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"stagedUploadsCreate": {
                    "stagedTargets": [{
                        "url": "https://upload.example/bucket",
                        "resourceUrl": "https://cdn.example/CNCP001MBLK.jpg",
                        "parameters": [{"name": "key", "value": "tmp/abc"}]
                    }],
                    "userErrors": []
                }}
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let target = client
            .staged_upload("CNCP001MBLK.jpg", "image/jpeg", 1234)
            .await
            .unwrap();
        assert_eq!(target.resource_url, "https://cdn.example/CNCP001MBLK.jpg");
        assert_eq!(target.parameters[0].name, "key");
    }

    #[tokio::test]
    async fn staged_upload_user_errors_are_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(graphql_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"stagedUploadsCreate": {
                    "stagedTargets": [],
                    "userErrors": [{"message": "file size too large"}]
                }}
            })))
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let err = client
            .staged_upload("CNCP001MBLK.jpg", "image/jpeg", 1234)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("file size too large"), "got: {err}");
    }

    #[tokio::test]
    async fn upload_binary_replays_parameters_and_returns_resource_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bucket"))
            .and(body_string_contains("tmp/abc"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = AdminClient::new(server.uri(), "shpat_abc");
        let target = StagedTarget {
            url: format!("{}/bucket", server.uri()),
            resource_url: "https://cdn.example/CNCP001MBLK.jpg".to_string(),
            parameters: vec![StagedParameter {
                name: "key".to_string(),
                value: "tmp/abc".to_string(),
            }],
        };
        let resource_url = client
            .upload_binary(&target, "CNCP001MBLK.jpg", "image/jpeg", b"jpeg".to_vec())
            .await
            .unwrap();
        assert_eq!(resource_url, "https://cdn.example/CNCP001MBLK.jpg");
    }
}
