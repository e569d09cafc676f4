use crate::config::Config;
use crate::retry::{is_transient, with_retry_if, ProviderStatus, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

const SYSTEM_PROMPT: &str =
    "You are a German language tutor. Provide grammatical analysis and translations in JSON format only.";

/// Models a client may ask for.
///
/// Only Groq is served; the OpenAI path is disabled in demo mode and the
/// request handler refuses it before any provider is contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnalysisModel {
    #[default]
    Groq,
    OpenAi,
}

impl AnalysisModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisModel::Groq => "groq",
            AnalysisModel::OpenAi => "openai",
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AnalysisModel::Groq)
    }
}

impl fmt::Display for AnalysisModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisModel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "groq" => Ok(AnalysisModel::Groq),
            "openai" => Ok(AnalysisModel::OpenAi),
            other => anyhow::bail!("Unsupported model: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VocabularyItem {
    #[serde(default)]
    pub german: String,
    #[serde(default)]
    pub english: String,
}

/// Translation, grammar notes and vocabulary for one German sentence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceAnalysis {
    pub translation: String,
    pub grammar: String,
    pub vocabulary: Vec<VocabularyItem>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Groq chat-completions client for sentence analysis
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    retry: RetryConfig,
}

impl AnalysisClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            api_url: config.groq_api_url.clone(),
            api_key: config.groq_api_key.clone(),
            model: config.groq_model.clone(),
            retry: RetryConfig::provider_call(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Ask the model for a translation, grammar analysis and vocabulary list.
    pub async fn analyze(&self, sentence: &str) -> Result<SentenceAnalysis> {
        let api_key = self
            .api_key
            .as_deref()
            .context("GROQ_API_KEY is not configured")?;

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                Message {
                    role: "user".to_string(),
                    content: Some(build_analysis_prompt(sentence)),
                },
            ],
            temperature: 0.3,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let content = with_retry_if(
            &self.retry,
            "Groq analysis",
            || async {
                let response = self
                    .http
                    .post(&self.api_url)
                    .bearer_auth(api_key)
                    .json(&request)
                    .send()
                    .await
                    .context("Failed to send request to Groq API")?;

                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
                    return Err(ProviderStatus {
                        provider: "Groq",
                        status,
                        body,
                    }
                    .into());
                }

                let chat: ChatResponse = response
                    .json()
                    .await
                    .context("Failed to parse Groq response")?;

                Ok::<_, anyhow::Error>(
                    chat.choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content),
                )
            },
            is_transient,
        )
        .await?;

        let content = content
            .filter(|c| !c.trim().is_empty())
            .context("No response content from Groq API")?;

        parse_analysis(&content)
    }
}

fn build_analysis_prompt(sentence: &str) -> String {
    format!(
        r#"Analyze the following German sentence and provide:
1. English translation
2. Detailed grammatical analysis (cases, tenses, word order, sentence structure)
3. Vocabulary breakdown with German words and their English meanings

German sentence: "{}"

Please format your response as JSON with the following structure:
{{
  "translation": "English translation here",
  "grammar": "Detailed grammatical analysis here",
  "vocabulary": [
    {{"german": "word1", "english": "meaning1"}},
    {{"german": "word2", "english": "meaning2"}}
  ]
}}

Return only valid JSON, no additional text."#,
        sentence
    )
}

/// Remove a surrounding ```` ```json ```` or ```` ``` ```` fence, if any.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };

    let inner = inner.trim_start();
    match inner.strip_suffix("```") {
        Some(body) => body.trim_end(),
        None => inner,
    }
}

/// Turn the model's reply into a [`SentenceAnalysis`].
///
/// Missing fields default to empty; a structured `grammar` object is
/// flattened into readable text.
pub fn parse_analysis(content: &str) -> Result<SentenceAnalysis> {
    let json = strip_code_fences(content);
    let value: Value =
        serde_json::from_str(json).context("Failed to parse analysis JSON from Groq response")?;

    let translation = value
        .get("translation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let grammar = match value.get("grammar") {
        Some(Value::String(text)) => text.clone(),
        Some(structured @ (Value::Object(_) | Value::Array(_))) => format_grammar(structured),
        _ => String::new(),
    };

    let vocabulary = match value.get("vocabulary") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
        _ => Vec::new(),
    };

    Ok(SentenceAnalysis {
        translation,
        grammar,
        vocabulary,
    })
}

/// Render structured grammar as `"Key:\nvalue"` blocks separated by blank lines.
fn format_grammar(grammar: &Value) -> String {
    let entries: Vec<(String, &Value)> = match grammar {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => return String::new(),
    };

    entries
        .into_iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Object(_) | Value::Array(_) | Value::Null => {
                    serde_json::to_string_pretty(value).unwrap_or_default()
                }
                other => other.to_string(),
            };
            format!("{}:\n{}", humanize_key(&key), rendered)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `word_order` -> `Word Order`: underscores become spaces and every ASCII
/// word character that starts a word is capitalized.
fn humanize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut in_word = false;
    for c in key.replace('_', " ").chars() {
        let is_word = c.is_ascii_alphanumeric() || c == '_';
        if is_word && !in_word {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        in_word = is_word;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    // ==================== Helper Functions ====================

    fn create_client(server_uri: &str, api_key: Option<&str>) -> AnalysisClient {
        AnalysisClient {
            http: reqwest::Client::new(),
            api_url: format!("{}/openai/v1/chat/completions", server_uri),
            api_key: api_key.map(str::to_string),
            model: "llama-3.1-8b-instant".to_string(),
            retry: RetryConfig::new(2, std::time::Duration::from_millis(1)),
        }
    }

    fn chat_completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": "llama-3.1-8b-instant",
            "choices": [
                {
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }
            ]
        })
    }

    // ==================== Model Tests ====================

    #[test]
    fn test_model_from_str() {
        assert_eq!("groq".parse::<AnalysisModel>().unwrap(), AnalysisModel::Groq);
        assert_eq!(
            "openai".parse::<AnalysisModel>().unwrap(),
            AnalysisModel::OpenAi
        );
        let err = "claude".parse::<AnalysisModel>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported model: claude");
    }

    #[test]
    fn test_model_defaults_to_groq_and_only_groq_available() {
        assert_eq!(AnalysisModel::default(), AnalysisModel::Groq);
        assert!(AnalysisModel::Groq.is_available());
        assert!(!AnalysisModel::OpenAi.is_available());
        assert_eq!(AnalysisModel::OpenAi.to_string(), "openai");
    }

    // ==================== Prompt Tests ====================

    #[test]
    fn test_prompt_contains_sentence_and_schema() {
        let prompt = build_analysis_prompt("Ich lerne Deutsch.");
        assert!(prompt.contains("German sentence: \"Ich lerne Deutsch.\""));
        assert!(prompt.contains("\"translation\""));
        assert!(prompt.contains("{\"german\": \"word1\", \"english\": \"meaning1\"}"));
        assert!(prompt.ends_with("Return only valid JSON, no additional text."));
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "llama-3.1-8b-instant".to_string(),
            messages: vec![Message {
                role: "system".to_string(),
                content: Some(SYSTEM_PROMPT.to_string()),
            }],
            temperature: 0.3,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let json = serde_json::to_value(&request).expect("Should serialize");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["model"], "llama-3.1-8b-instant");
        assert_eq!(json["messages"][0]["role"], "system");
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json {\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_plain_analysis() {
        let analysis = parse_analysis(
            r#"{"translation": "I learn German.", "grammar": "Present tense.",
                "vocabulary": [{"german": "lernen", "english": "to learn"}]}"#,
        )
        .unwrap();

        assert_eq!(analysis.translation, "I learn German.");
        assert_eq!(analysis.grammar, "Present tense.");
        assert_eq!(
            analysis.vocabulary,
            vec![VocabularyItem {
                german: "lernen".to_string(),
                english: "to learn".to_string(),
            }]
        );
    }

    #[test]
    fn test_parse_fenced_analysis() {
        let content = "```json\n{\"translation\": \"Hello\", \"grammar\": \"x\", \"vocabulary\": []}\n```";
        let analysis = parse_analysis(content).unwrap();
        assert_eq!(analysis.translation, "Hello");
    }

    #[test]
    fn test_parse_missing_fields_default_to_empty() {
        let analysis = parse_analysis("{}").unwrap();
        assert_eq!(analysis.translation, "");
        assert_eq!(analysis.grammar, "");
        assert!(analysis.vocabulary.is_empty());

        let analysis = parse_analysis(r#"{"grammar": null, "vocabulary": "none"}"#).unwrap();
        assert_eq!(analysis.grammar, "");
        assert!(analysis.vocabulary.is_empty());
    }

    #[test]
    fn test_parse_structured_grammar() {
        let content = r#"{
            "translation": "The dog sleeps.",
            "grammar": {
                "tense": "Present",
                "word_order": "Subject-verb",
                "cases": {"der Hund": "nominative"},
                "clause_count": 1
            },
            "vocabulary": []
        }"#;

        let analysis = parse_analysis(content).unwrap();
        assert_eq!(
            analysis.grammar,
            "Tense:\nPresent\n\n\
             Word Order:\nSubject-verb\n\n\
             Cases:\n{\n  \"der Hund\": \"nominative\"\n}\n\n\
             Clause Count:\n1"
        );
    }

    #[test]
    fn test_structured_grammar_keeps_model_order() {
        let analysis =
            parse_analysis(r#"{"grammar": {"word_order": "V2", "tense": "Present"}}"#).unwrap();
        assert_eq!(analysis.grammar, "Word Order:\nV2\n\nTense:\nPresent");
    }

    #[test]
    fn test_parse_invalid_json_is_error() {
        let err = parse_analysis("not json at all").unwrap_err();
        assert!(err.to_string().contains("Failed to parse analysis JSON"));
    }

    #[test]
    fn test_vocabulary_items_with_missing_fields() {
        let analysis =
            parse_analysis(r#"{"vocabulary": [{"german": "Haus"}, 42, {"english": "tree"}]}"#)
                .unwrap();
        assert_eq!(analysis.vocabulary.len(), 2);
        assert_eq!(analysis.vocabulary[0].german, "Haus");
        assert_eq!(analysis.vocabulary[0].english, "");
        assert_eq!(analysis.vocabulary[1].english, "tree");
    }

    #[test]
    fn test_humanize_key() {
        assert_eq!(humanize_key("word_order"), "Word Order");
        assert_eq!(humanize_key("tense"), "Tense");
        assert_eq!(humanize_key("verb-position"), "Verb-Position");
        assert_eq!(humanize_key("case_2"), "Case 2");
    }

    // ==================== HTTP Tests ====================

    #[tokio::test]
    async fn test_analyze_success() {
        let mock_server = MockServer::start().await;
        let content = r#"{"translation": "I am tired.", "grammar": "Copula sein.", "vocabulary": [{"german": "müde", "english": "tired"}]}"#;

        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-groq-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama-3.1-8b-instant",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion(content)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_client(&mock_server.uri(), Some("test-groq-key"));
        let analysis = client.analyze("Ich bin müde.").await.unwrap();

        assert_eq!(analysis.translation, "I am tired.");
        assert_eq!(analysis.vocabulary[0].german, "müde");
    }

    #[tokio::test]
    async fn test_analyze_without_api_key() {
        let client = create_client("http://127.0.0.1:9", None);
        let err = client.analyze("Hallo.").await.unwrap_err();
        assert_eq!(err.to_string(), "GROQ_API_KEY is not configured");
    }

    #[tokio::test]
    async fn test_analyze_client_error_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_client(&mock_server.uri(), Some("bad-key"));
        let err = client.analyze("Hallo.").await.unwrap_err();
        assert_eq!(err.to_string(), "Groq API error: 401 - invalid api key");
    }

    #[tokio::test]
    async fn test_analyze_server_error_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = create_client(&mock_server.uri(), Some("key"));
        let err = client.analyze("Hallo.").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_analyze_empty_choices() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
            )
            .mount(&mock_server)
            .await;

        let client = create_client(&mock_server.uri(), Some("key"));
        let err = client.analyze("Hallo.").await.unwrap_err();
        assert_eq!(err.to_string(), "No response content from Groq API");
    }
}
