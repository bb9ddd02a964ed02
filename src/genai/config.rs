use once_cell::sync::Lazy;
use std::env;

pub static API_ROOT: Lazy<String> = Lazy::new(|| {
    env::var("GENAI_API_ROOT")
        .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string())
});

pub static IMAGE_MODEL: Lazy<String> =
    Lazy::new(|| env::var("GENAI_IMAGE_MODEL").unwrap_or_else(|_| "gemini-2.5-flash-image".to_string()));

pub static TEXT_MODEL: Lazy<String> =
    Lazy::new(|| env::var("GENAI_TEXT_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string()));
