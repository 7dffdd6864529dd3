//! Answer synthesis: turns retrieved context plus a question into text.
//!
//! The orchestrator only depends on the [`Synthesizer`] trait. The OpenAI
//! adapter fills a [`PromptTemplate`] and sends it as a single user message
//! to the chat completions endpoint.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::SynthesisConfig;
use crate::error::{Error, Result};
use crate::openai;

/// Grounding prompt used when `synthesis.prompt_template` is not set.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a careful document assistant.
Use ONLY the provided context to answer the user's question.
- If the context lacks an answer, say you cannot find it in the uploaded documents.
- Keep answers evidence-driven and neutral; avoid speculative claims.
- Answer concisely.

Context:
{context}

Question:
{question}

Answer:";

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self> {
        for placeholder in ["{context}", "{question}"] {
            if !template.contains(placeholder) {
                return Err(Error::Configuration(format!(
                    "prompt template is missing {}",
                    placeholder
                )));
            }
        }
        Ok(Self {
            template: template.to_string(),
        })
    }

    /// Substitute placeholders in one pass; braces inside the substituted
    /// text are never expanded.
    pub fn render(&self, context: &str, question: &str) -> String {
        let slots = [("{context}", context), ("{question}", question)];
        let mut out = String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        loop {
            let next = slots
                .iter()
                .filter_map(|(p, v)| rest.find(p).map(|i| (i, *p, *v)))
                .min_by_key(|(i, _, _)| *i);
            match next {
                Some((i, placeholder, value)) => {
                    out.push_str(&rest[..i]);
                    out.push_str(value);
                    rest = &rest[i + placeholder.len()..];
                }
                None => {
                    out.push_str(rest);
                    break;
                }
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

/// Produces an answer from retrieved context.
///
/// `Ok(None)` (or an empty string) means the model produced nothing usable;
/// the orchestrator substitutes its fallback sentence.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, context: &str, question: &str) -> Result<Option<String>>;
}

/// Synthesizer used when `synthesis.provider = "disabled"`.
pub struct DisabledSynthesizer;

#[async_trait]
impl Synthesizer for DisabledSynthesizer {
    async fn synthesize(&self, _context: &str, _question: &str) -> Result<Option<String>> {
        Err(Error::Configuration(
            "answer synthesis is disabled; set [synthesis] provider in config".to_string(),
        ))
    }
}

/// Chat-completions synthesizer.
pub struct OpenAISynthesizer {
    model: String,
    temperature: f32,
    max_retries: u32,
    url: String,
    api_key: String,
    template: PromptTemplate,
    client: reqwest::Client,
}

impl OpenAISynthesizer {
    /// Fails with [`Error::Authentication`] when `OPENAI_API_KEY` is unset.
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let template = match &config.prompt_template {
            Some(t) => PromptTemplate::new(t)?,
            None => PromptTemplate::default(),
        };
        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            url: openai::endpoint(&config.api_base, "chat/completions"),
            api_key: openai::api_key_from_env()?,
            template,
            client: openai::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Synthesizer for OpenAISynthesizer {
    async fn synthesize(&self, context: &str, question: &str) -> Result<Option<String>> {
        let prompt = self.template.render(context, question);
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });
        let json = openai::post_json(
            &self.client,
            &self.url,
            &self.api_key,
            &body,
            self.max_retries,
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &Value) -> Result<Option<String>> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::Synthesis("invalid chat response: missing choices".to_string()))?;
    Ok(choices
        .first()
        .and_then(|c| c.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string()))
}

pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Box<dyn Synthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSynthesizer)),
        "openai" => Ok(Box::new(OpenAISynthesizer::new(config)?)),
        other => Err(Error::Configuration(format!(
            "unknown synthesis provider: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_renders_both_parts() {
        let prompt = PromptTemplate::default().render("LDL is 130 mg/dL.", "What is the LDL?");
        assert!(prompt.contains("Context:\nLDL is 130 mg/dL."));
        assert!(prompt.contains("Question:\nWhat is the LDL?"));
        assert!(!prompt.contains("{context}"));
    }

    #[test]
    fn placeholders_in_values_are_not_expanded() {
        let template = PromptTemplate::new("C={context} Q={question}").unwrap();
        assert_eq!(
            template.render("see {question}", "why {context}?"),
            "C=see {question} Q=why {context}?"
        );
    }

    #[test]
    fn template_requires_placeholders() {
        assert!(matches!(
            PromptTemplate::new("only {context}"),
            Err(Error::Configuration(_))
        ));
        assert!(PromptTemplate::new("{question} about {context}").is_ok());
    }

    #[test]
    fn parse_chat_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hi" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), Some("Hi".to_string()));
    }

    #[test]
    fn parse_chat_null_content_is_none() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), None);
        let json = serde_json::json!({ "choices": [] });
        assert_eq!(parse_chat_response(&json).unwrap(), None);
    }

    #[test]
    fn parse_chat_missing_choices_is_error() {
        let json = serde_json::json!({ "id": "x" });
        assert!(matches!(
            parse_chat_response(&json),
            Err(Error::Synthesis(_))
        ));
    }
}
