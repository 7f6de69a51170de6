//! Text generation service client and answer synthesis.
//!
//! The generation service is an external collaborator: given a prompt it
//! returns free text. The [`Generator`] trait keeps the augmenter and the
//! answer synthesizer testable without a live model server.
//!
//! Failure policy differs by caller: the augmenter degrades a failed call
//! to an empty summary (see `augment`), while answer synthesis propagates
//! the error so the user can tell a broken pipeline from an empty answer.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::ScoredChunk;

/// Trait for text-generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemma3:latest"`).
    fn model_name(&self) -> &str;
    /// Run one prompt to completion and return the generated text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generation client backed by a local Ollama server.
///
/// Calls `POST {base_url}/api/generate` with `{"model", "prompt",
/// "stream": false}` and reads the `response` field. The request carries a
/// fixed timeout; a slow model surfaces as an error to the caller rather
/// than hanging the pipeline.
pub struct OllamaGenerator {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Generation API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid generation response: missing response field"))?;

        Ok(text.to_string())
    }
}

/// Prompt asking for a short situating summary of one chunk, used by the
/// contextual augmenter.
pub fn context_prompt(title: &str, chunk_text: &str) -> String {
    format!(
        "Write one or two sentences situating the following passage from the \
         document \"{}\" so it can be understood on its own. Reply with the \
         summary only.\n\nPassage:\n{}",
        title, chunk_text
    )
}

/// Build the answer-synthesis prompt from the query and retrieved chunks.
pub fn answer_prompt(query: &str, chunks: &[ScoredChunk]) -> String {
    let context_text = chunks
        .iter()
        .map(|c| clean_text(&c.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Answer the following question using the context below.\n\n\
         Question:\n{}\n\nContext:\n{}\n\nAnswer:",
        query, context_text
    )
}

/// Synthesize an answer for `query` from the retrieved chunks.
///
/// Generation failures propagate; an empty retrieval set is the caller's
/// condition to report, not this function's.
pub async fn generate_answer(
    generator: &dyn Generator,
    query: &str,
    chunks: &[ScoredChunk],
) -> Result<String> {
    let prompt = answer_prompt(query, chunks);
    let answer = generator.generate(&prompt).await?;
    Ok(answer.trim().to_string())
}

/// Strip markup tags and collapse whitespace before text reaches a prompt.
fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            id: "1".into(),
            chunk_id: 0,
            text: text.into(),
            tags: None,
            label: None,
            source: None,
            distance: 0.0,
        }
    }

    #[test]
    fn test_answer_prompt_contains_query_and_context() {
        let prompt = answer_prompt("why quicksort?", &[scored("pivot choice matters")]);
        assert!(prompt.contains("why quicksort?"));
        assert!(prompt.contains("pivot choice matters"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_clean_text_strips_tags() {
        assert_eq!(clean_text("<p>hello <b>world</b></p>"), "hello world");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("a\n\n  b\tc"), "a b c");
    }

    #[test]
    fn test_context_prompt_embeds_chunk() {
        let prompt = context_prompt("Sorting", "the passage text");
        assert!(prompt.contains("\"Sorting\""));
        assert!(prompt.contains("the passage text"));
    }
}
