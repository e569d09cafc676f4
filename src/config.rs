use anyhow::{Context, Result};

pub const DEFAULT_DEEPL_API_URL: &str = "https://api-free.deepl.com/v2/translate";
pub const DEFAULT_GROQ_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Server
    pub port: u16,
    pub request_timeout_secs: u64,

    // DeepL (free and paid accounts use different hosts)
    pub deepl_api_key: Option<String>,
    pub deepl_api_url: String,

    // Groq (OpenAI-compatible chat completions)
    pub groq_api_key: Option<String>,
    pub groq_api_url: String,
    pub groq_model: String,

    // Analysis cache
    pub analysis_cache_capacity: usize,

    // Admin access to full feedback records
    pub api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL not set")?,

            port: parse_env("PORT")?.unwrap_or(8080),
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS")?.unwrap_or(30),

            deepl_api_key: non_empty_env("DEEPL_API_KEY"),
            deepl_api_url: std::env::var("DEEPL_API_URL")
                .unwrap_or_else(|_| DEFAULT_DEEPL_API_URL.to_string()),

            groq_api_key: non_empty_env("GROQ_API_KEY"),
            groq_api_url: std::env::var("GROQ_API_URL")
                .unwrap_or_else(|_| DEFAULT_GROQ_API_URL.to_string()),
            groq_model: std::env::var("GROQ_MODEL")
                .unwrap_or_else(|_| DEFAULT_GROQ_MODEL.to_string()),

            analysis_cache_capacity: parse_env("ANALYSIS_CACHE_CAPACITY")?.unwrap_or(100),

            api_key: non_empty_env("API_KEY"),
        })
    }
}

/// Read an optional variable, treating an empty value as unset.
fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional numeric variable; a present but malformed value is an error.
fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_env(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("{} must be a number, got '{}'", name, raw)),
        None => Ok(None),
    }
}
