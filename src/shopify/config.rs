use once_cell::sync::Lazy;

/// Admin GraphQL API version, pinned so mutation shapes stay stable.
pub static API_VERSION: Lazy<String> =
    Lazy::new(|| std::env::var("SHOPIFY_API_VERSION").unwrap_or_else(|_| "2025-01".to_string()));
