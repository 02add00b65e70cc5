//! [`Normalizer`] backed by an OpenAI-compatible chat-completions endpoint.

use crate::error::{ErrorKind, Result};
use crate::normalizer::Normalizer;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::instrument;
use upon::{Engine, Template};

/// Prompt sent when no template file is configured.
///
/// Available variables: `names` (JSON array of the raw names) and `count`.
pub const DEFAULT_PROMPT: &str = r#"You normalize book publisher names.

For each of the {{ count }} raw publisher names below, give the canonical name of the publishing house: drop legal suffixes ("Inc.", "Ltd", "GmbH"), imprint noise and typesetting software, and fix obvious misspellings. If a name is not a publisher at all, or you cannot tell, leave it out.

Answer with a single JSON object mapping every raw name you recognize, exactly as given, to its canonical name. No other text.

Names:
{{ names }}"#;

const SYSTEM_PROMPT: &str = "You are a meticulous bibliographic data librarian. You answer only with JSON.";

pub struct OpenAiNormalizer {
    client: Client,
    endpoint: String,
    model: String,
    engine: Engine<'static>,
    prompt: Template<'static>,
}
impl OpenAiNormalizer {
    /// Builds a client for `base_url` (e.g. `https://api.openai.com/v1`)
    /// using the built-in prompt.
    pub fn new(base_url: &str, api_key: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).or_raise(|| ErrorKind::Client)?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .or_raise(|| ErrorKind::Client)?;
        let engine = Engine::new();
        let prompt = engine.compile(DEFAULT_PROMPT.to_string()).or_raise(|| ErrorKind::Prompt)?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            engine,
            prompt,
        })
    }

    /// Replaces the prompt with `template`.
    pub fn with_prompt(mut self, template: impl Into<String>) -> Result<Self> {
        self.prompt = self.engine.compile(template.into()).or_raise(|| ErrorKind::Prompt)?;
        Ok(self)
    }

    /// Replaces the prompt with the template stored in `path`.
    pub fn with_prompt_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let template = std::fs::read_to_string(path).or_raise(|| ErrorKind::Prompt)?;
        self.with_prompt(template)
    }

    fn render(&self, names: &[String]) -> Result<String> {
        let count = names.len() as u64;
        let names = serde_json::to_string(names).or_raise(|| ErrorKind::Prompt)?;
        self.prompt
            .render(&self.engine, upon::value! { names: names, count: count })
            .to_string()
            .or_raise(|| ErrorKind::Prompt)
    }
}

#[async_trait]
impl Normalizer for OpenAiNormalizer {
    #[instrument(skip_all, fields(names = names.len(), model = %self.model))]
    async fn normalize(&self, names: &[String]) -> Result<HashMap<String, String>> {
        if names.is_empty() {
            return Ok(HashMap::new());
        }
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: self.render(names)? },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await.or_raise(|| ErrorKind::Request)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        let response: ChatResponse = response.json().await.or_raise(|| ErrorKind::Response)?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_raise(|| ErrorKind::Response)?;
        parse_mapping(&content)
    }
}

/// Reads the name mapping out of the model's answer, which may be wrapped in
/// a Markdown code fence. Non-string values are dropped.
fn parse_mapping(content: &str) -> Result<HashMap<String, String>> {
    let mut json = content.trim();
    if let Some(fenced) = json.strip_prefix("```") {
        let fenced = fenced.strip_suffix("```").unwrap_or(fenced);
        // Skip the info string ("json") on the opening line.
        json = fenced.split_once('\n').map_or(fenced, |(_, body)| body).trim();
    }
    let object: HashMap<String, Value> = serde_json::from_str(json).or_raise(|| ErrorKind::Response)?;
    Ok(object
        .into_iter()
        .filter_map(|(raw, canonical)| match canonical {
            Value::String(canonical) => Some((raw, canonical)),
            _ => None,
        })
        .collect())
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
