//! Built-in backend definitions.
//!
//! These seed `[[backends]]` when the config file does not list any.

use crate::BackendConfig;

pub const GEMINI_FLASH_LITE: &str = "Gemini 2.5 Flash Lite";
pub const GEMINI_FLASH: &str = "Gemini 2.5 Flash";
pub const GEMINI_PRO: &str = "Gemini 2.5 Pro";
pub const GPT5: &str = "GPT-5";
pub const LLAMA_CPP: &str = "llama.cpp";

pub const GOOGLE_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const LLAMA_CPP_BASE_URL: &str = "http://127.0.0.1:8080/v1";

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const LLAMA_CPP_API_KEY_ENV: &str = "LLAMA_CPP_API_KEY";

pub fn gemini_2_5_flash_lite() -> BackendConfig {
    BackendConfig::new(GEMINI_FLASH_LITE, GOOGLE_OPENAI_BASE_URL, "gemini-2.5-flash-lite")
        .with_api_key_env(GOOGLE_API_KEY_ENV)
        .with_rate_limit(15.0)
        .free()
}

pub fn gemini_2_5_flash() -> BackendConfig {
    BackendConfig::new(GEMINI_FLASH, GOOGLE_OPENAI_BASE_URL, "gemini-2.5-flash")
        .with_api_key_env(GOOGLE_API_KEY_ENV)
        .with_rate_limit(10.0)
}

pub fn gemini_2_5_pro() -> BackendConfig {
    BackendConfig::new(GEMINI_PRO, GOOGLE_OPENAI_BASE_URL, "gemini-2.5-pro")
        .with_api_key_env(GOOGLE_API_KEY_ENV)
        .with_rate_limit(2.0)
}

pub fn gpt5() -> BackendConfig {
    BackendConfig::new(GPT5, OPENAI_BASE_URL, "gpt-5").with_api_key_env(OPENAI_API_KEY_ENV)
}

/// A local llama.cpp server; it ignores the key but the client must send one.
pub fn llama_cpp() -> BackendConfig {
    BackendConfig::new(LLAMA_CPP, LLAMA_CPP_BASE_URL, "model")
        .with_api_key("sk-")
        .with_api_key_env(LLAMA_CPP_API_KEY_ENV)
}

/// Every built-in backend.
pub fn all() -> Vec<BackendConfig> {
    vec![
        gemini_2_5_flash_lite(),
        gemini_2_5_flash(),
        gemini_2_5_pro(),
        gpt5(),
        llama_cpp(),
    ]
}
