use crate::shopify::client::ShopifyError;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

/// Strips scheme and trailing slashes from a user-entered store URL,
/// leaving the bare `*.myshopify.com` host.
pub fn normalize_store_url(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Exchanges client credentials for an Admin API access token.
///
/// `base` is the store origin (scheme included); the shop host form is
/// `https://{store_url}`. Any failure here is fatal to the caller, there
/// is nothing to push without a token.
pub async fn exchange_credentials(
    http: &Client,
    base: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<String, ShopifyError> {
    let url = format!("{base}/admin/oauth/access_token");
    let response = http
        .post(&url)
        .form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .await
        .map_err(|err| ShopifyError::Auth(err.to_string()))?;

    if !response.status().is_success() {
        return Err(ShopifyError::Auth(format!("HTTP {}", response.status())));
    }

    let payload: TokenResponse = response
        .json()
        .await
        .map_err(|err| ShopifyError::Auth(err.to_string()))?;

    let token = payload
        .access_token
        .ok_or_else(|| ShopifyError::Auth("token exchange returned no access_token".to_string()))?;
    info!(target = "flatlay.shopify", "access token obtained");
    Ok(token)
}
