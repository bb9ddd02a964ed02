/// Derives the stable output filename for one variant:
/// product number with dashes stripped, then gender code, then color code.
///
/// This is the only join key between generation output and the later store
/// push, so both paths must go through here. Total by construction; bad
/// input yields a bad filename, validation happens upstream.
pub fn derive_filename(product_number: &str, gender_code: &str, color_code: &str) -> String {
    let clean = product_number.replace('-', "");
    format!("{clean}{gender_code}{color_code}")
}

/// Variant SKU for the store push: `{product_number}-{color_code}`, with
/// `DEF` standing in for a missing color code.
pub fn derive_sku(product_number: &str, color_code: &str) -> String {
    let code = if color_code.trim().is_empty() {
        "DEF"
    } else {
        color_code
    };
    format!("{product_number}-{code}")
}
