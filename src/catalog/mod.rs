pub mod grouping;
pub mod naming;
pub mod validate;

pub use grouping::group_by_product_number;
pub use naming::{derive_filename, derive_sku};
pub use validate::{CsvValidation, validate_csv_bytes};
