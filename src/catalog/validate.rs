use crate::models::Product;
use once_cell::sync::Lazy;
use std::env;
use thiserror::Error;

pub const REQUIRED_COLUMNS: [&str; 6] = [
    "ProductNumber",
    "GenderCode",
    "ColorCode",
    "ProductName",
    "ColorName",
    "FlatLayPrompt",
];

/// Identifier convention for rows that count as products. Rows whose
/// ProductNumber does not start with this prefix are dropped silently.
pub static PRODUCT_NUMBER_PREFIX: Lazy<String> =
    Lazy::new(|| env::var("PRODUCT_NUMBER_PREFIX").unwrap_or_else(|_| "CNC-P".to_string()));

#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to parse CSV: {0}")]
    Parse(String),
}

#[derive(Debug)]
pub struct CsvValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub products: Vec<Product>,
}

/// Validates raw CSV bytes and extracts the normalized product list.
///
/// Pure transform over the input: identical bytes always produce an
/// identical report. Missing columns fail fast with a single error naming
/// all of them; rows failing the prompt check are dropped with a warning;
/// zero surviving rows makes the whole result invalid.
pub fn validate_csv_bytes(bytes: &[u8]) -> Result<CsvValidation, CsvError> {
    validate_with_prefix(bytes, &PRODUCT_NUMBER_PREFIX)
}

fn validate_with_prefix(bytes: &[u8], prefix: &str) -> Result<CsvValidation, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|err| CsvError::Parse(err.to_string()))?
        .clone();

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|col| !headers.iter().any(|h| h.trim() == *col))
        .collect();
    if !missing.is_empty() {
        errors.push(format!("Missing required columns: {}", missing.join(", ")));
        return Ok(CsvValidation {
            valid: false,
            errors,
            warnings,
            products: Vec::new(),
        });
    }

    let column = |name: &str| -> usize {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .expect("required column checked above")
    };
    let (pn_idx, gc_idx, cc_idx, name_idx, cn_idx, prompt_idx) = (
        column("ProductNumber"),
        column("GenderCode"),
        column("ColorCode"),
        column("ProductName"),
        column("ColorName"),
        column("FlatLayPrompt"),
    );

    let mut products = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| CsvError::Parse(err.to_string()))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim().to_string();

        let product_number = field(pn_idx);
        if !product_number.starts_with(prefix) {
            continue;
        }

        let prompt = field(prompt_idx);
        if prompt.is_empty() {
            warnings.push(format!(
                "Row {}: Missing FlatLayPrompt for {product_number}",
                row_idx + 1
            ));
            continue;
        }

        let gender_code = {
            let raw = field(gc_idx);
            if raw.is_empty() { "U".to_string() } else { raw }
        };

        products.push(Product {
            product_number,
            gender_code,
            color_code: field(cc_idx),
            product_name: field(name_idx),
            color_name: field(cn_idx),
            prompt,
        });
    }

    if products.is_empty() {
        errors.push(format!(
            "No valid products found. ProductNumber must start with '{prefix}' and have a FlatLayPrompt."
        ));
    }

    Ok(CsvValidation {
        valid: errors.is_empty(),
        errors,
        warnings,
        products,
    })
}
