use crate::catalog::{derive_filename, derive_sku};
use crate::events::{StreamEvent, emit};
use crate::http::build_client;
use crate::models::{RawProductRow, ShopifyPushRequest};
use crate::shopify::{
    AdminClient, MediaDraft, VariantDraft, exchange_credentials, normalize_store_url,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Pause between product creations, respecting the Admin API rate
    /// limit. Not applied after the last product.
    pub inter_group_delay: Duration,
    /// Overrides the `https://{store_url}` origin; used by tests to
    /// point at a local server.
    pub base_url: Option<String>,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            inter_group_delay: Duration::from_secs(1),
            base_url: None,
        }
    }
}

/// Pushes the catalog to a Shopify store, writing events into `tx`.
///
/// Authentication failure is fatal; everything after that degrades per
/// product: a missing or unuploadable image costs the variant its photo,
/// a failed `productSet` skips that product, and inventory or publish
/// trouble leaves the product created but under-configured. The run
/// always ends with a complete event carrying the created count.
pub async fn run_push(
    request: &ShopifyPushRequest,
    tx: &mpsc::Sender<StreamEvent>,
    opts: &PushOptions,
) {
    let groups = group_rows(&request.products);
    let total = groups.len();
    if total == 0 {
        let _ = emit(tx, StreamEvent::error("No valid products to push")).await;
        return;
    }

    let store_url = normalize_store_url(&request.store_url);
    let base = opts
        .base_url
        .clone()
        .unwrap_or_else(|| format!("https://{store_url}"));
    info!(
        target = "flatlay.push",
        store = %store_url,
        products = total,
        "push run started"
    );

    if !emit(
        tx,
        StreamEvent::push_progress(0, total, "Connecting to Shopify..."),
    )
    .await
    {
        return;
    }

    let http = build_client();
    let token =
        match exchange_credentials(&http, &base, &request.client_id, &request.client_secret).await {
            Ok(token) => token,
            Err(err) => {
                let _ = emit(tx, StreamEvent::error(format!("Authentication failed: {err}"))).await;
                return;
            }
        };
    let client = AdminClient::new(base, token);

    let location_id = resolve_location(&client, request.location_id.as_deref()).await;
    if location_id.is_none() {
        warn!(
            target = "flatlay.push",
            "no location available, inventory quantities will not be set"
        );
    }

    let vendor = request
        .brand
        .as_ref()
        .map(|brand| brand.name.clone())
        .unwrap_or_default();

    let mut created_count = 0usize;
    for (idx, group) in groups.iter().enumerate() {
        let first = group[0];
        let title = if first.product_name.is_empty() {
            "Untitled".to_string()
        } else {
            first.product_name.clone()
        };

        if !emit(
            tx,
            StreamEvent::push_progress(
                idx + 1,
                total,
                format!("Creating {title}... Uploading images..."),
            ),
        )
        .await
        {
            return;
        }

        let mut media = Vec::new();
        let mut drafts = Vec::new();
        for row in group {
            drafts.push(VariantDraft {
                color_name: if row.color_name.is_empty() {
                    "Default".to_string()
                } else {
                    row.color_name.clone()
                },
                price: if row.price.trim().is_empty() {
                    "0.00".to_string()
                } else {
                    row.price.clone()
                },
                sku: derive_sku(&row.product_number, &row.color_code),
                inventory: row.inventory_quantity(),
            });

            let filename = variant_filename(row);
            let Some(encoded) = request.images.get(&filename) else {
                let sent = emit(
                    tx,
                    StreamEvent::error(format!(
                        "No image found for variant {filename}, skipping image."
                    )),
                )
                .await;
                if !sent {
                    return;
                }
                continue;
            };

            match upload_variant_image(&client, &filename, encoded).await {
                Ok(resource_url) => media.push(MediaDraft {
                    resource_url,
                    alt: format!("{} - {}", row.product_name, row.color_name),
                }),
                Err(message) => {
                    let sent = emit(
                        tx,
                        StreamEvent::error(format!("Image upload failed for {filename}: {message}")),
                    )
                    .await;
                    if !sent {
                        return;
                    }
                }
            }
        }

        if !emit(
            tx,
            StreamEvent::push_progress(idx + 1, total, format!("Creating {title}...")),
        )
        .await
        {
            return;
        }

        let description_html = if first.description.is_empty() {
            String::new()
        } else {
            format!("<p>{}</p>", first.description)
        };
        let created = match client
            .create_product(
                &title,
                &description_html,
                &vendor,
                &first.product_type,
                &drafts,
                &media,
            )
            .await
        {
            Ok(created) => created,
            Err(err) => {
                let sent = emit(
                    tx,
                    StreamEvent::error(format!("Failed to create {title}: {err}")),
                )
                .await;
                if !sent {
                    return;
                }
                if idx + 1 < total && !opts.inter_group_delay.is_zero() {
                    sleep(opts.inter_group_delay).await;
                }
                continue;
            }
        };

        if let Some(location_id) = &location_id {
            for (variant_idx, variant) in created.variants.iter().enumerate() {
                let Some(inventory_item_id) = &variant.inventory_item_id else {
                    continue;
                };
                // Quantities come from the draft with the matching SKU;
                // position only breaks the tie when Shopify returns a
                // variant with no SKU at all.
                let draft = drafts
                    .iter()
                    .find(|draft| !variant.sku.is_empty() && draft.sku == variant.sku)
                    .or_else(|| drafts.get(variant_idx));
                let Some(draft) = draft else {
                    continue;
                };
                if let Err(err) = client
                    .activate_inventory(inventory_item_id, location_id, draft.inventory)
                    .await
                {
                    warn!(
                        target = "flatlay.push",
                        sku = %draft.sku,
                        error = %err,
                        "inventory activation failed"
                    );
                }
            }
        }

        if let Err(err) = client.publish_product(&created.id).await {
            warn!(
                target = "flatlay.push",
                product = %created.title,
                error = %err,
                "publish failed"
            );
        }

        created_count += 1;
        let sent = emit(
            tx,
            StreamEvent::ProductCreated {
                title: created.title,
                handle: created.handle,
                current: idx + 1,
                total,
            },
        )
        .await;
        if !sent {
            return;
        }

        if idx + 1 < total && !opts.inter_group_delay.is_zero() {
            sleep(opts.inter_group_delay).await;
        }
    }

    info!(
        target = "flatlay.push",
        created = created_count,
        total,
        "push run finished"
    );
    let _ = emit(tx, StreamEvent::push_complete(created_count, total)).await;
}

/// Partitions rows into variant groups by product number, preserving
/// first-seen order. Rows with a blank product number are dropped.
fn group_rows(rows: &[RawProductRow]) -> Vec<Vec<&RawProductRow>> {
    let mut groups: Vec<(&str, Vec<&RawProductRow>)> = Vec::new();
    for row in rows {
        let number = row.product_number.trim();
        if number.is_empty() {
            continue;
        }
        match groups.iter_mut().find(|(key, _)| *key == number) {
            Some((_, members)) => members.push(row),
            None => groups.push((number, vec![row])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

fn variant_filename(row: &RawProductRow) -> String {
    let gender = if row.gender_code.trim().is_empty() {
        "U"
    } else {
        row.gender_code.trim()
    };
    derive_filename(&row.product_number, gender, &row.color_code)
}

/// Picks the location used for inventory activation: the store's first
/// location when one exists, otherwise a caller-supplied numeric id.
async fn resolve_location(client: &AdminClient, override_id: Option<&str>) -> Option<String> {
    match client.primary_location().await {
        Ok(Some(location)) => {
            info!(
                target = "flatlay.push",
                location = %location.name,
                "using store location"
            );
            return Some(location.id);
        }
        Ok(None) => {}
        Err(err) => warn!(target = "flatlay.push", error = %err, "location lookup failed"),
    }
    override_id
        .filter(|id| !id.trim().is_empty())
        .map(|id| format!("gid://shopify/Location/{}", id.trim()))
}

async fn upload_variant_image(
    client: &AdminClient,
    filename: &str,
    encoded: &str,
) -> Result<String, String> {
    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|err| err.to_string())?;
    let file_name = format!("{filename}.jpg");
    let target = client
        .staged_upload(&file_name, "image/jpeg", bytes.len())
        .await
        .map_err(|err| err.to_string())?;
    client
        .upload_binary(&target, &file_name, "image/jpeg", bytes)
        .await
        .map_err(|err| err.to_string())
}
