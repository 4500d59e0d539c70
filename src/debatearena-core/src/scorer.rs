//! Judge model that rates each utterance.

use std::sync::LazyLock;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::capability::Scorer;
use crate::config::Config;
use crate::error::DebateError;
use crate::generator::{build_client, complete};
use crate::rules::Score;

pub struct OpenAiScorer {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    judge_prompt: String,
}

impl OpenAiScorer {
    pub fn new(config: &Config) -> Result<Self, DebateError> {
        Ok(Self {
            client: build_client(&config.llm)?,
            model: config.llm.scorer_model.clone(),
            max_tokens: config.llm.scorer_max_tokens,
            judge_prompt: config.prompts.judge_prompt.clone(),
        })
    }
}

#[async_trait]
impl Scorer for OpenAiScorer {
    async fn score(&self, text: &str, topic: &str) -> Result<Score, DebateError> {
        let system = self.judge_prompt.replace("{topic}", topic);
        let user = format!("STATEMENT:\n{}", text);

        let reply = complete(&self.client, &self.model, self.max_tokens, system, user)
            .await
            .map_err(|e| DebateError::Scoring(e.to_string()))?;

        let score = parse_judgement(&reply)?;
        debug!(average = score.average, "scored turn");
        Ok(score)
    }
}

/// Ratings as the judge returns them. Any `average` it sends is ignored.
#[derive(Debug, Deserialize)]
struct Judgement {
    strength: f64,
    relevance: f64,
    logic: f64,
    truth: f64,
    humor: f64,
}

static JSON_OBJECT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)\{.*?\}").ok());

/// Extract the first JSON object from a judge reply.
fn parse_judgement(reply: &str) -> Result<Score, DebateError> {
    let body = JSON_OBJECT_RE
        .as_ref()
        .and_then(|re| re.find(reply))
        .map(|m| m.as_str())
        .ok_or_else(|| DebateError::Scoring(format!("no JSON object in judge reply: {:?}", reply)))?;

    let j: Judgement = serde_json::from_str(body)
        .map_err(|e| DebateError::Scoring(format!("malformed judgement {}: {}", body, e)))?;

    Ok(Score::new(j.strength, j.relevance, j.logic, j.truth, j.humor))
}
