pub mod auth;
pub mod client;
pub mod config;
pub mod inventory;
pub mod products;
pub mod publish;
pub mod uploads;

pub use auth::{exchange_credentials, normalize_store_url};
pub use client::{AdminClient, ShopifyError};
pub use products::{MediaDraft, VariantDraft};
