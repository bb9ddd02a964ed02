pub mod concept;
pub mod config;
pub mod images;
pub mod types;

pub use concept::{ConceptClient, ConceptError, ConceptPart, StoreConcept};
pub use images::{GenError, GeneratedImage, ImageClient, Reference, RetryPolicy};
