//! Query expansion: paraphrased variants and keywords for a question.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RetrievalError};

const VARIANTS_PROMPT: &str = "You rewrite questions for document search. \
Write alternative phrasings of the user's question that keep its meaning. \
Output one phrasing per line and nothing else.";

const KEYWORDS_PROMPT: &str = "You extract search keywords. \
List the key terms, names and article numbers in the user's question. \
Output them separated by commas and nothing else.";

/// Variants and keywords derived from one question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub variants: Vec<String>,
    pub keywords: Vec<String>,
}

/// Trait for query expanders.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    fn name(&self) -> &str;

    async fn expand(&self, question: &str) -> Result<Expansion>;
}

/// Expander that adds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

#[async_trait]
impl QueryExpander for NoExpansion {
    fn name(&self) -> &str {
        "none"
    }

    async fn expand(&self, _question: &str) -> Result<Expansion> {
        Ok(Expansion::default())
    }
}

/// Expander backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatExpander {
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_variants: usize,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

impl ChatExpander {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            max_variants: 3,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_max_variants(mut self, max_variants: usize) -> Self {
        self.max_variants = max_variants;
        self
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
        };

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }
        let response = request.send().await.map_err(expansion_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Expansion(format!("{status}: {error_text}")));
        }

        let reply: ChatResponse = response.json().await.map_err(expansion_error)?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RetrievalError::Expansion("no choices in response".to_string()))
    }
}

#[async_trait]
impl QueryExpander for ChatExpander {
    fn name(&self) -> &str {
        "chat"
    }

    async fn expand(&self, question: &str) -> Result<Expansion> {
        let variants = if self.max_variants > 0 {
            let user = format!(
                "Write {} alternative phrasings of: {question}",
                self.max_variants
            );
            let reply = self.complete(VARIANTS_PROMPT, &user).await?;
            parse_variants(&reply, question, self.max_variants)
        } else {
            Vec::new()
        };

        let reply = self.complete(KEYWORDS_PROMPT, question).await?;
        let keywords = parse_keywords(&reply);

        debug!(
            "Expanded question into {} variants and {} keywords",
            variants.len(),
            keywords.len()
        );
        Ok(Expansion { variants, keywords })
    }
}

fn expansion_error(e: reqwest::Error) -> RetrievalError {
    RetrievalError::Expansion(e.to_string())
}

/// One paraphrase per line, without list markup, blanks, repeats or copies
/// of the question itself.
pub fn parse_variants(reply: &str, question: &str, max_variants: usize) -> Vec<String> {
    let mut seen = HashSet::from([question.trim().to_lowercase()]);
    reply
        .lines()
        .map(strip_markup)
        .filter(|line| !line.is_empty() && seen.insert(line.to_lowercase()))
        .take(max_variants)
        .map(str::to_string)
        .collect()
}

/// Comma- or line-separated keywords, without list markup, quotes, blanks
/// or repeats.
pub fn parse_keywords(reply: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    reply
        .split([',', '\n'])
        .map(|item| strip_markup(item).trim_matches(['"', '\'', '`']).trim())
        .filter(|item| !item.is_empty() && seen.insert(item.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Drop a leading bullet (`-`, `*`, `•`) or ordinal (`1.`, `2)`).
fn strip_markup(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();

    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(['.', ')']) {
            return rest.trim();
        }
    }
    line.trim()
}
