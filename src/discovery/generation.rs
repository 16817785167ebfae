//! LLM generation calls and strict-JSON response parsing.
//!
//! Models occasionally wrap JSON in code fences or prose; `extract_json`
//! carves out the first JSON value before deserializing. Anything that still
//! fails to parse is an `LlmError::InvalidResponse` handled by the caller's
//! fallback path.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::discovery::prompts::{self, ProbeContext};
use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::session::model::{DialogueStep, RecipientProfile};

/// Raw per-topic plan as produced by the model (bulk or per-topic calls).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrackPlan {
    #[serde(default)]
    pub is_wide: bool,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default)]
    pub hypotheses: Vec<RawHypothesis>,
}

/// Raw hypothesis before preview products are attached.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHypothesis {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub angle: String,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawProbe {
    question: String,
    #[serde(default)]
    options: Vec<String>,
}

/// Thin wrapper around the LLM provider for all discovery calls.
pub struct GenerationClient {
    llm: Arc<dyn LlmProvider>,
    config: DiscoveryConfig,
}

impl GenerationClient {
    pub fn new(llm: Arc<dyn LlmProvider>, config: DiscoveryConfig) -> Self {
        Self { llm, config }
    }

    async fn complete(
        &self,
        system: &str,
        user: String,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(user),
        ])
        .with_temperature(self.config.generation_temperature)
        .with_max_tokens(max_tokens);
        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }

    fn invalid(&self, reason: String) -> LlmError {
        LlmError::InvalidResponse {
            provider: self.llm.model_name().to_string(),
            reason,
        }
    }

    /// Normalize raw interest strings into deduplicated topic names.
    pub async fn normalize_topics(&self, interests: &[String]) -> Result<Vec<String>, LlmError> {
        if interests.iter().all(|i| i.trim().is_empty()) {
            return Ok(Vec::new());
        }
        let raw = self
            .complete(
                prompts::NORMALIZE_SYSTEM,
                prompts::normalize_prompt(interests, self.config.max_topics),
                self.config.topic_max_tokens,
            )
            .await?;
        let topics: Vec<String> = parse_json(&raw).map_err(|e| self.invalid(e))?;
        Ok(dedup_topics(topics, self.config.max_topics))
    }

    /// One call that classifies and proposes hypotheses for all topics.
    pub async fn bulk_plan(
        &self,
        topics: &[String],
        profile: &RecipientProfile,
    ) -> Result<HashMap<String, RawTrackPlan>, LlmError> {
        let raw = self
            .complete(
                prompts::BULK_SYSTEM,
                prompts::bulk_prompt(topics, profile),
                self.config.bulk_max_tokens,
            )
            .await?;
        let plans: HashMap<String, RawTrackPlan> =
            parse_json(&raw).map_err(|e| self.invalid(e))?;
        debug!(topics = topics.len(), planned = plans.len(), "Bulk plan parsed");
        Ok(plans)
    }

    /// Classify one topic as wide (question) or specific.
    pub async fn classify_topic(
        &self,
        topic: &str,
        profile: &RecipientProfile,
    ) -> Result<RawTrackPlan, LlmError> {
        let raw = self
            .complete(
                prompts::CLASSIFY_SYSTEM,
                prompts::classify_prompt(topic, profile),
                self.config.topic_max_tokens,
            )
            .await?;
        parse_json(&raw).map_err(|e| self.invalid(e))
    }

    /// Generate hypotheses for one (possibly refined) topic.
    pub async fn topic_hypotheses(
        &self,
        topic: &str,
        profile: &RecipientProfile,
        exclude_titles: &[String],
    ) -> Result<Vec<RawHypothesis>, LlmError> {
        let raw = self
            .complete(
                prompts::HYPOTHESES_SYSTEM,
                prompts::hypotheses_prompt(topic, profile, exclude_titles),
                self.config.topic_max_tokens,
            )
            .await?;
        parse_json(&raw).map_err(|e| self.invalid(e))
    }

    /// Ask for a clarifying probe question.
    pub async fn probe_question(
        &self,
        context: ProbeContext<'_>,
        profile: &RecipientProfile,
    ) -> Result<DialogueStep, LlmError> {
        let raw = self
            .complete(
                prompts::PROBE_SYSTEM,
                prompts::probe_prompt(context, profile),
                self.config.topic_max_tokens,
            )
            .await?;
        let probe: RawProbe = parse_json(&raw).map_err(|e| self.invalid(e))?;
        Ok(DialogueStep::new(probe.question, probe.options))
    }
}

/// Trim, dedupe (case-insensitive), and cap a topic list.
pub fn dedup_topics(topics: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for topic in topics {
        let trimmed = topic.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        out.push(trimmed.to_string());
        if out.len() == cap {
            break;
        }
    }
    out
}

/// Deserialize the first JSON value found in a model response.
fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, String> {
    let carved = extract_json(raw).ok_or_else(|| "no JSON value in response".to_string())?;
    serde_json::from_str(carved).map_err(|e| e.to_string())
}

/// Carve the first JSON object or array out of surrounding prose/fences.
fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find(['{', '['])?;
    let open = raw.as_bytes()[start];
    let close = if open == b'{' { '}' } else { ']' };
    let end = raw.rfind(close)?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_strips_code_fences() {
        let raw = "```json\n{\"is_wide\": true}\n```";
        assert_eq!(extract_json(raw), Some("{\"is_wide\": true}"));
    }

    #[test]
    fn extract_json_handles_leading_prose() {
        let raw = "Here you go:\n[\"Coffee\", \"Hiking\"]";
        assert_eq!(extract_json(raw), Some("[\"Coffee\", \"Hiking\"]"));
    }

    #[test]
    fn extract_json_none_without_json() {
        assert_eq!(extract_json("sorry, I can't"), None);
    }

    #[test]
    fn parse_bulk_plan_shape() {
        let raw = r#"{
            "Coffee": {
                "is_wide": false,
                "hypotheses": [{
                    "title": "AeroPress Kit",
                    "description": "Compact brewer",
                    "reasoning": "Daily ritual upgrade",
                    "angle": "the_optimizer",
                    "search_queries": ["aeropress"]
                }]
            },
            "Sport": {"is_wide": true, "question": "Which sport?", "branches": ["Running", "Gym"]}
        }"#;
        let plans: HashMap<String, RawTrackPlan> = parse_json(raw).unwrap();
        assert!(!plans["Coffee"].is_wide);
        assert_eq!(plans["Coffee"].hypotheses[0].title, "AeroPress Kit");
        assert!(plans["Sport"].is_wide);
        assert_eq!(plans["Sport"].branches.len(), 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let raw = r#"[{"title": "Bare"}]"#;
        let hypotheses: Vec<RawHypothesis> = parse_json(raw).unwrap();
        assert_eq!(hypotheses[0].title, "Bare");
        assert!(hypotheses[0].search_queries.is_empty());
    }

    #[test]
    fn dedup_topics_is_case_insensitive_and_capped() {
        let topics = vec![
            "Coffee".to_string(),
            " coffee ".to_string(),
            "".to_string(),
            "Hiking".to_string(),
            "Books".to_string(),
        ];
        assert_eq!(dedup_topics(topics, 2), vec!["Coffee", "Hiking"]);
    }
}
