mod archive;
mod catalog;
mod events;
mod genai;
mod generate;
mod http;
mod metrics;
mod models;
mod push;
mod shopify;
mod store;
mod transcode;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use catalog::{CsvValidation, derive_filename, validate_csv_bytes};
use chrono::Utc;
use events::{StreamEvent, channel, emit, sse_response};
use genai::{ConceptClient, ConceptPart, ImageClient};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{
    ApiError, PreviewRow, Product, ProductsRequest, RegenerateSingleRequest,
    RegenerateSingleResponse, ShopifyPushRequest, ShopifyValidateRequest, ShopifyValidateResponse,
    ValidateCsvResponse,
};
use std::net::SocketAddr;
use store::{ImageStore, StoredImage};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

const SUPPORTED_IMAGE_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
];
const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const MAX_FILES: usize = 5;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "flatlay.api", "server crashed: {err}");
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("prom recorder");
    let state = AppState {
        store: ImageStore::new(),
        prometheus_handle,
    };

    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/validate-csv", post(validate_csv))
        .route("/api/generate", post(generate_images))
        .route("/api/download-all", get(download_all))
        .route("/api/download/{filename}", get(download_single))
        .route("/api/generate-store", post(generate_store))
        .route("/api/generate-from-products", post(generate_from_products))
        .route("/api/regenerate-single", post(regenerate_single))
        .route("/api/validate-shopify", post(validate_shopify))
        .route("/api/push-to-shopify", post(push_to_shopify))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit_from_env())),
        );

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "flatlay.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    store: ImageStore,
    prometheus_handle: PrometheusHandle,
}

fn body_limit_from_env() -> usize {
    std::env::var("REQUEST_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64 * 1024 * 1024)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "flatlay-api-rs",
    }))
}

async fn metrics_endpoint(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
) -> axum::http::Response<String> {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return axum::http::Response::builder()
                .status(StatusCode::UNAUTHORIZED)
                .body("unauthorized".into())
                .unwrap();
        }
    }
    let body = state.prometheus_handle.render();
    axum::http::Response::builder()
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .unwrap()
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, detail) = match self {
            AppError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "bad_request", detail),
            AppError::Unauthorized(detail) => (StatusCode::UNAUTHORIZED, "unauthorized", detail),
            AppError::NotFound(detail) => (StatusCode::NOT_FOUND, "not_found", detail),
            AppError::Internal(detail) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", detail),
        };
        let payload = ApiError {
            error: error.to_string(),
            detail: Some(detail),
        };
        (status, Json(payload)).into_response()
    }
}

async fn multipart_field_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Vec<u8>, AppError> {
    field
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|err| AppError::BadRequest(format!("Failed to read upload: {err}")))
}

/// Validate an uploaded CSV without generating anything.
///
/// - Method: `POST`
/// - Path: `/api/validate-csv`
/// - Body: multipart with a `file` part
async fn validate_csv(mut multipart: Multipart) -> Result<Json<ValidateCsvResponse>, AppError> {
    crate::metrics::inc_requests("/api/validate-csv");
    let mut csv_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let name = field.name().map(str::to_string);
        if name.as_deref() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            if !filename.ends_with(".csv") {
                return Err(AppError::BadRequest("File must be a CSV".to_string()));
            }
            csv_bytes = Some(multipart_field_bytes(field).await?);
        }
    }

    let bytes = csv_bytes.ok_or_else(|| AppError::BadRequest("File must be a CSV".to_string()))?;
    let report = validate_csv_bytes(&bytes)
        .map_err(|err| AppError::BadRequest(format!("Failed to parse CSV: {err}")))?;

    Ok(Json(validation_response(report)))
}

fn validation_response(report: CsvValidation) -> ValidateCsvResponse {
    let preview = if report.valid {
        report
            .products
            .iter()
            .take(3)
            .map(|product| PreviewRow {
                product_number: product.product_number.clone(),
                product_name: product.product_name.clone(),
                gender_code: product.gender_code.clone(),
                color_name: product.color_name.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };
    ValidateCsvResponse {
        valid: report.valid,
        errors: report.errors,
        warnings: report.warnings,
        row_count: report.products.len(),
        preview,
    }
}

/// Generate images from an uploaded CSV, streaming progress over SSE.
///
/// - Method: `POST`
/// - Path: `/api/generate`
/// - Body: multipart with `api_key` and `file` parts
async fn generate_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/generate");
    let mut api_key = String::new();
    let mut csv_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("api_key") => {
                api_key = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
            }
            Some("file") => csv_bytes = Some(multipart_field_bytes(field).await?),
            _ => {}
        }
    }

    let bytes =
        csv_bytes.ok_or_else(|| AppError::BadRequest("CSV file is required".to_string()))?;
    let report = validate_csv_bytes(&bytes)
        .map_err(|err| AppError::BadRequest(format!("Failed to parse CSV: {err}")))?;
    if !report.valid {
        let first = report
            .errors
            .first()
            .cloned()
            .unwrap_or_else(|| "Invalid CSV".to_string());
        return Err(AppError::BadRequest(first));
    }

    Ok(spawn_generation(state.store, api_key, report.products).into_response())
}

fn spawn_generation(
    store: ImageStore,
    api_key: String,
    products: Vec<Product>,
) -> impl IntoResponse {
    let (tx, rx) = channel();
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        let client = ImageClient::new(api_key);
        generate::run_generation(
            &client,
            &store,
            &products,
            &tx,
            &generate::GenerateOptions::default(),
        )
        .await;
        crate::metrics::run_elapsed("generation", started.elapsed().as_millis());
    });
    sse_response(rx)
}

/// Download every generated image of the current session as a zip.
///
/// - Method: `GET`
/// - Path: `/api/download-all`
async fn download_all(State(state): State<AppState>) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/download-all");
    let images = state.store.snapshot().await;
    if images.is_empty() {
        return Err(AppError::NotFound("No images to download".to_string()));
    }
    let bytes =
        archive::bundle_images(&images).map_err(|err| AppError::Internal(err.to_string()))?;
    Response::builder()
        .header("Content-Type", "application/zip")
        .header(
            "Content-Disposition",
            "attachment; filename=generated_images.zip",
        )
        .body(axum::body::Body::from(bytes))
        .map_err(|err| AppError::Internal(err.to_string()))
}

/// Download one generated image by its derived filename.
///
/// - Method: `GET`
/// - Path: `/api/download/{filename}`
async fn download_single(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/download");
    let image = state
        .store
        .get(&filename)
        .await
        .ok_or_else(|| AppError::NotFound("Image not found".to_string()))?;
    Response::builder()
        .header("Content-Type", image.mime_type)
        .header("Last-Modified", image.generated_at.to_rfc2822())
        .header(
            "Content-Disposition",
            format!("attachment; filename={filename}.jpg"),
        )
        .body(axum::body::Body::from(image.data))
        .map_err(|err| AppError::Internal(err.to_string()))
}

/// Generate a brand concept and product catalog from a free-text store
/// description, streaming stages over SSE.
///
/// - Method: `POST`
/// - Path: `/api/generate-store`
/// - Body: multipart with `api_key`, `description`, optional
///   `product_count` and up to five reference `files`
async fn generate_store(mut multipart: Multipart) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/generate-store");
    let mut api_key = String::new();
    let mut description = String::new();
    let mut product_count: usize = 10;
    let mut parts: Vec<ConceptPart> = Vec::new();
    let mut files_seen = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(err.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("api_key") => {
                api_key = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
            }
            Some("description") => {
                description = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
            }
            Some("product_count") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|err| AppError::BadRequest(err.to_string()))?;
                product_count = raw
                    .trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest("Invalid product count".to_string()))?;
            }
            Some("files") => {
                if files_seen >= MAX_FILES {
                    continue;
                }
                files_seen += 1;
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let content = multipart_field_bytes(field).await?;
                if let Some(part) = reference_part(&filename, &content_type, content) {
                    parts.push(part);
                }
            }
            _ => {}
        }
    }

    if !(5..=100).contains(&product_count) {
        return Err(AppError::BadRequest(
            "Product count must be between 5 and 100".to_string(),
        ));
    }
    if description.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Store description is required".to_string(),
        ));
    }

    let (tx, rx) = channel();
    tokio::spawn(async move {
        run_store_builder(api_key, description, product_count, parts, tx).await;
    });
    Ok(sse_response(rx).into_response())
}

/// Converts one uploaded reference file into a prompt part. Oversized or
/// unsupported files are skipped, matching the lenient upload contract.
fn reference_part(filename: &str, content_type: &str, content: Vec<u8>) -> Option<ConceptPart> {
    if content.len() > MAX_FILE_SIZE {
        return None;
    }
    if SUPPORTED_IMAGE_TYPES.contains(&content_type) || content_type == "application/pdf" {
        return Some(ConceptPart::Inline {
            mime_type: content_type.to_string(),
            data: content,
        });
    }
    if content_type == "text/plain" || filename.ends_with(".txt") {
        let text = String::from_utf8(content).ok()?;
        return Some(ConceptPart::Text(format!(
            "Reference document ({filename}):\n{text}"
        )));
    }
    None
}

async fn run_store_builder(
    api_key: String,
    description: String,
    product_count: usize,
    parts: Vec<ConceptPart>,
    tx: tokio::sync::mpsc::Sender<StreamEvent>,
) {
    if !emit(
        &tx,
        StreamEvent::stage_progress("analyzing", "Analyzing your store description..."),
    )
    .await
    {
        return;
    }
    if !parts.is_empty() {
        let message = format!("Processing {} reference file(s)...", parts.len());
        if !emit(&tx, StreamEvent::stage_progress("analyzing", message)).await {
            return;
        }
    }
    if !emit(
        &tx,
        StreamEvent::stage_progress("generating", "Creating brand concept and product catalog..."),
    )
    .await
    {
        return;
    }

    let client = ConceptClient::new(api_key);
    match client
        .generate_store_concept(&description, product_count, &parts)
        .await
    {
        Ok(concept) => {
            if !emit(&tx, StreamEvent::Brand { data: concept.brand }).await {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            if !emit(
                &tx,
                StreamEvent::Products {
                    data: concept.products,
                },
            )
            .await
            {
                return;
            }
            let _ = emit(&tx, StreamEvent::bare_complete()).await;
        }
        Err(err) => {
            let _ = emit(
                &tx,
                StreamEvent::error(format!("Failed to generate store: {err}")),
            )
            .await;
        }
    }
}

/// Generate images from an already-built product array (the store-builder
/// output), streaming progress over SSE.
///
/// - Method: `POST`
/// - Path: `/api/generate-from-products`
async fn generate_from_products(
    State(state): State<AppState>,
    Json(request): Json<ProductsRequest>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/generate-from-products");
    if request.products.is_empty() {
        return Err(AppError::BadRequest(
            "Products array is required".to_string(),
        ));
    }
    if request.photo_style.trim().is_empty() {
        return Err(AppError::BadRequest("Photo style is required".to_string()));
    }

    let products: Vec<Product> = request
        .products
        .iter()
        .map(|row| {
            let gender_code = if row.gender_code.trim().is_empty() {
                "U".to_string()
            } else {
                row.gender_code.trim().to_string()
            };
            let mut product = Product {
                product_number: row.product_number.trim().to_string(),
                gender_code,
                color_code: row.color_code.trim().to_string(),
                product_name: row.product_name.trim().to_string(),
                color_name: row.color_name.trim().to_string(),
                prompt: String::new(),
            };
            product.prompt = build_product_prompt(&product, &request.photo_style);
            product
        })
        .filter(|product| !product.product_number.is_empty() && !product.product_name.is_empty())
        .collect();

    if products.is_empty() {
        return Err(AppError::BadRequest("No valid products found".to_string()));
    }

    Ok(spawn_generation(state.store, request.api_key, products).into_response())
}

/// Combines the shared photo style with per-product details into one
/// image prompt.
fn build_product_prompt(product: &Product, photo_style: &str) -> String {
    let gender = match product.gender_code.as_str() {
        "M" => "men's",
        "W" => "women's",
        "U" => "unisex",
        _ => "",
    };
    let name = if product.product_name.is_empty() {
        "product"
    } else {
        product.product_name.as_str()
    };
    let description = if product.color_name.is_empty() {
        format!("{gender} {name}")
    } else {
        format!("{} {gender} {name}", product.color_name)
    };
    format!("{photo_style}, {}", description.trim())
}

/// Regenerate one product image and return it directly as JSON.
///
/// - Method: `POST`
/// - Path: `/api/regenerate-single`
async fn regenerate_single(
    State(state): State<AppState>,
    Json(request): Json<RegenerateSingleRequest>,
) -> Result<Json<RegenerateSingleResponse>, AppError> {
    crate::metrics::inc_requests("/api/regenerate-single");
    if request.prompt.trim().is_empty() {
        return Err(AppError::BadRequest("Prompt is required".to_string()));
    }

    let client = ImageClient::new(request.api_key.clone());
    let image = client
        .generate(&request.prompt, None)
        .await
        .map_err(|err| AppError::Internal(err.message))?;

    let filename = derive_filename(
        &request.product_number,
        &request.gender_code,
        &request.color_code,
    );
    let encoded = BASE64.encode(&image.data);
    state
        .store
        .put(StoredImage {
            filename: filename.clone(),
            data: image.data,
            mime_type: image.mime_type,
            product_name: request.product_name.clone(),
            color_name: request.color_name.clone(),
            generated_at: Utc::now(),
        })
        .await;

    Ok(Json(RegenerateSingleResponse {
        filename,
        product_name: request.product_name,
        color_name: request.color_name,
        prompt: request.prompt,
        data: encoded,
    }))
}

/// Validate Shopify credentials by exchanging them for a token and
/// querying the shop.
///
/// - Method: `POST`
/// - Path: `/api/validate-shopify`
async fn validate_shopify(
    Json(request): Json<ShopifyValidateRequest>,
) -> Result<Json<ShopifyValidateResponse>, AppError> {
    crate::metrics::inc_requests("/api/validate-shopify");
    let store_url = shopify::normalize_store_url(&request.store_url.to_lowercase());
    if store_url.is_empty()
        || request.client_id.trim().is_empty()
        || request.client_secret.trim().is_empty()
    {
        return Err(AppError::BadRequest(
            "Store URL, Client ID, and Client Secret are required".to_string(),
        ));
    }

    let http = http::build_client();
    let base = format!("https://{store_url}");
    let token = shopify::exchange_credentials(
        &http,
        &base,
        request.client_id.trim(),
        request.client_secret.trim(),
    )
    .await
    .map_err(|err| map_auth_error(&err))?;

    let client = shopify::AdminClient::new(base, token);
    let shop_name = client
        .shop_name()
        .await
        .map_err(|err| AppError::BadRequest(format!("Connection failed: {err}")))?;

    Ok(Json(ShopifyValidateResponse {
        ok: true,
        shop_name,
        store_url,
    }))
}

fn map_auth_error(err: &shopify::ShopifyError) -> AppError {
    let message = err.to_string();
    if message.contains("HTTP 401") || message.contains("HTTP 403") {
        return AppError::Unauthorized(
            "Invalid credentials. Check your Client ID and Client Secret, and ensure the app has write_products scope."
                .to_string(),
        );
    }
    if message.contains("no access_token") {
        return AppError::Unauthorized(
            "Token exchange failed. Check your Client ID and Client Secret.".to_string(),
        );
    }
    AppError::BadRequest(format!("Connection failed: {message}"))
}

/// Push generated products and images to a Shopify store, streaming
/// progress over SSE.
///
/// - Method: `POST`
/// - Path: `/api/push-to-shopify`
async fn push_to_shopify(Json(request): Json<ShopifyPushRequest>) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/api/push-to-shopify");
    if request.store_url.trim().is_empty() {
        return Err(AppError::BadRequest("Store URL is required".to_string()));
    }
    if request.client_id.trim().is_empty() || request.client_secret.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Client ID and Client Secret are required".to_string(),
        ));
    }
    if request.products.is_empty() {
        return Err(AppError::BadRequest(
            "Products array is required".to_string(),
        ));
    }

    let (tx, rx) = channel();
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        push::run_push(&request, &tx, &push::PushOptions::default()).await;
        crate::metrics::run_elapsed("shopify_push", started.elapsed().as_millis());
    });
    Ok(sse_response(rx).into_response())
}
