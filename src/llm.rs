//! Client for an OpenAI-compatible text generation server (LM Studio and
//! friends).
//!
//! Every request goes to `/chat/completions` first. When the server answers
//! with a non-success status the same conversation is flattened into a
//! prompt and sent once to the legacy `/completions` endpoint. Both
//! protocols are cached independently.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::cache::ContentAddressedCache;
use crate::error::CompletionError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_API_KEY: &str = "lm-studio";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Messages injected into every request of a run, fixed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StandingInstructions {
    messages: Vec<Message>,
}

impl StandingInstructions {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Request system messages, then standing system messages, then standing
    /// non-system messages, then request non-system messages. Relative order
    /// inside each group is kept. Without standing messages the request is
    /// returned untouched.
    pub fn merge(&self, request: &[Message]) -> Vec<Message> {
        if self.messages.is_empty() {
            return request.to_vec();
        }
        let (request_system, request_other): (Vec<&Message>, Vec<&Message>) =
            request.iter().partition(|m| m.is_system());
        let (standing_system, standing_other): (Vec<&Message>, Vec<&Message>) =
            self.messages.iter().partition(|m| m.is_system());

        request_system
            .into_iter()
            .chain(standing_system)
            .chain(standing_other)
            .chain(request_other)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// Wire protocol for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Chat,
    Completions,
}

impl Protocol {
    /// Cache discriminator stored under the `endpoint` key.
    pub fn endpoint(self) -> &'static str {
        match self {
            Protocol::Chat => "chat",
            Protocol::Completions => "completions",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Protocol::Chat => "chat/completions",
            Protocol::Completions => "completions",
        }
    }

    /// Protocol to try after `error`, if any. Only a chat rejection moves on;
    /// transport failures and completions failures end the call.
    pub fn after_failure(self, error: &CompletionError) -> Option<Protocol> {
        match self {
            Protocol::Chat if error.is_rejection() => Some(Protocol::Completions),
            _ => None,
        }
    }
}

/// Renders the conversation for the prompt-only endpoint, leaving an open
/// assistant turn at the end.
pub fn messages_to_prompt(messages: &[Message]) -> String {
    let mut lines: Vec<String> = messages
        .iter()
        .map(|m| {
            let marker = match m.role {
                Role::System => "[System]",
                Role::User => "[User]",
                Role::Assistant => "[Assistant]",
            };
            format!("{marker}\n{}\n", m.content)
        })
        .collect();
    lines.push("[Assistant]\n".to_string());
    lines.join("\n")
}

/// Raw HTTP answer: status plus body text.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait Transport {
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, CompletionError>;
}

/// Blocking reqwest transport with a fixed bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_key: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .user_agent(concat!("paper-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| CompletionError::Transport {
                url: String::new(),
                message: format!("build http client: {err}"),
            })?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            timeout,
        })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, CompletionError> {
        let map_err = |err: reqwest::Error| {
            if err.is_timeout() {
                CompletionError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                CompletionError::Transport {
                    url: url.to_string(),
                    message: err.to_string(),
                }
            }
        };
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(map_err)?;
        Ok(HttpReply { status, body })
    }
}

/// Anything that can turn a conversation into one completion.
pub trait Completer {
    fn chat_complete(
        &mut self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, CompletionError>;
}

impl<C: Completer + ?Sized> Completer for &mut C {
    fn chat_complete(
        &mut self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        (**self).chat_complete(messages, options)
    }
}

pub struct CompletionClient<T = HttpTransport> {
    model: String,
    base_url: String,
    transport: T,
    cache: Option<ContentAddressedCache>,
    standing: StandingInstructions,
}

impl<T: Transport> CompletionClient<T> {
    pub fn new(model: impl Into<String>, base_url: impl Into<String>, transport: T) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            transport,
            cache: None,
            standing: StandingInstructions::default(),
        }
    }

    pub fn with_cache(mut self, cache: ContentAddressedCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_standing_instructions(mut self, standing: StandingInstructions) -> Self {
        self.standing = standing;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cache(&self) -> Option<&ContentAddressedCache> {
        self.cache.as_ref()
    }

    fn url(&self, protocol: Protocol) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), protocol.path())
    }

    fn request_body(
        &self,
        protocol: Protocol,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Map<String, Value>, CompletionError> {
        let mut body = Map::new();
        body.insert("model".into(), Value::String(self.model.clone()));
        match protocol {
            Protocol::Chat => {
                body.insert("messages".into(), serde_json::to_value(messages)?);
            }
            Protocol::Completions => {
                body.insert("prompt".into(), Value::String(messages_to_prompt(messages)));
            }
        }
        body.insert("temperature".into(), json!(options.temperature));
        if let Some(max_tokens) = options.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        Ok(body)
    }

    /// One attempt over one protocol: cache lookup, POST, parse, cache store.
    fn attempt(
        &mut self,
        protocol: Protocol,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let body = self.request_body(protocol, messages, options)?;
        let mut cache_payload = body.clone();
        cache_payload.insert("endpoint".into(), Value::String(protocol.endpoint().into()));
        let cache_payload = Value::Object(cache_payload);

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(&cache_payload)) {
            debug!(endpoint = protocol.endpoint(), "completion cache hit");
            return Ok(cached.to_string());
        }

        let url = self.url(protocol);
        let reply = self.transport.post_json(&url, &Value::Object(body))?;
        if !reply.is_success() {
            return Err(CompletionError::Status {
                url,
                status: reply.status,
                body: truncate_preview(&reply.body, 500),
            });
        }
        let data: Value = serde_json::from_str(&reply.body).map_err(|err| CompletionError::Parse {
            url: url.clone(),
            message: err.to_string(),
        })?;
        let content = match protocol {
            Protocol::Chat => chat_content(&data).ok_or_else(|| CompletionError::Parse {
                url: url.clone(),
                message: "missing choices[0].message.content".to_string(),
            })?,
            Protocol::Completions => completion_content(&data),
        };

        if let Some(cache) = self.cache.as_mut() {
            if let Err(err) = cache.put(&cache_payload, &content) {
                warn!(
                    path = %cache.path().display(),
                    error = %err,
                    "failed to persist cache record"
                );
            }
        }
        Ok(content)
    }
}

impl<T: Transport> Completer for CompletionClient<T> {
    fn chat_complete(
        &mut self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, CompletionError> {
        let merged = self.standing.merge(messages);
        let mut protocol = Protocol::Chat;
        loop {
            match self.attempt(protocol, &merged, options) {
                Ok(content) => return Ok(content),
                Err(err) => match protocol.after_failure(&err) {
                    Some(next) => {
                        warn!(
                            error = %err,
                            fallback = next.endpoint(),
                            "chat endpoint rejected request"
                        );
                        protocol = next;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

fn chat_content(data: &Value) -> Option<String> {
    data.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.trim().to_string())
}

/// Accepts `choices[0].text` or `choices[0].message.content`; anything else is
/// an empty completion.
fn completion_content(data: &Value) -> String {
    let Some(choice) = data.get("choices").and_then(|c| c.get(0)) else {
        return String::new();
    };
    let text = choice
        .get("text")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default();
    text.trim().to_string()
}

fn truncate_preview(input: &str, max: usize) -> String {
    if input.len() <= max {
        return input.to_string();
    }
    let mut end = max;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = input[..end].to_string();
    out.push_str("...");
    out
}
