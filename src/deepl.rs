use crate::config::Config;
use crate::retry::{is_transient, with_retry_if, ProviderStatus, RetryConfig};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Target languages the service translates into (ISO 639-1, lowercase)
pub const SUPPORTED_TARGET_LANGUAGES: &[&str] = &["de"];

pub const DEFAULT_TARGET_LANGUAGE: &str = "de";

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// Resolve the requested target language, defaulting to German.
///
/// Returns `None` for languages the service does not offer.
pub fn resolve_target_language(requested: Option<&str>) -> Option<&'static str> {
    let requested = requested
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .unwrap_or(DEFAULT_TARGET_LANGUAGE)
        .to_lowercase();

    SUPPORTED_TARGET_LANGUAGES
        .iter()
        .copied()
        .find(|lang| *lang == requested)
}

/// DeepL REST client. Free (`api-free.deepl.com`) and paid (`api.deepl.com`)
/// accounts differ only in the endpoint URL.
#[derive(Debug, Clone)]
pub struct DeepLClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl DeepLClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_url: config.deepl_api_url.clone(),
            api_key: config.deepl_api_key.clone(),
            retry: RetryConfig::provider_call(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Translate `text` into `target_lang`; the source language is auto-detected.
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .context("DEEPL_API_KEY is not configured")?;

        let target = target_lang.to_uppercase();
        let params = [("text", text), ("target_lang", target.as_str())];

        let response: TranslateResponse = with_retry_if(
            &self.retry,
            "DeepL translation",
            || async {
                let response = self
                    .http
                    .post(&self.api_url)
                    .header("Authorization", format!("DeepL-Auth-Key {}", api_key))
                    .form(&params)
                    .send()
                    .await
                    .context("Failed to send request to DeepL API")?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                    return Err(ProviderStatus {
                        provider: "DeepL",
                        status,
                        body,
                    }
                    .into());
                }

                response
                    .json::<TranslateResponse>()
                    .await
                    .context("Failed to parse DeepL response")
            },
            is_transient,
        )
        .await?;

        response
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .context("No translation received from DeepL API")
    }
}
