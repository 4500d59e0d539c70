//! Debater text generation over an OpenAI-compatible chat API.

use std::sync::LazyLock;
use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::capability::Generator;
use crate::config::{Config, LlmConfig};
use crate::error::DebateError;

/// Replies at or below this many characters count as empty.
const MIN_REPLY_CHARS: usize = 10;

/// Build the chat client shared by the generator and the scorer.
pub(crate) fn build_client(llm: &LlmConfig) -> Result<Client<OpenAIConfig>, DebateError> {
    let http_client = reqwest::Client::builder()
        .danger_accept_invalid_certs(llm.accept_invalid_certs)
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

    let config = OpenAIConfig::new()
        .with_api_key(&llm.api_key)
        .with_api_base(&llm.api_base);

    Ok(Client::with_config(config).with_http_client(http_client))
}

/// Send one system + user exchange and return the first choice's text.
pub(crate) async fn complete(
    client: &Client<OpenAIConfig>,
    model: &str,
    max_tokens: u32,
    system: String,
    user: String,
) -> Result<String, DebateError> {
    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .max_completion_tokens(max_tokens)
        .messages(vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: system.into(),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: user.into(),
                name: None,
            }),
        ])
        .build()?;

    let response = client.chat().create(request).await?;
    Ok(response
        .choices
        .first()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default())
}

/// Generates debater turns, resolving speakers against the configured roster.
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    config: Config,
}

impl OpenAiGenerator {
    pub fn new(config: Config) -> Result<Self, DebateError> {
        let client = build_client(&config.llm)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, context: &str, topic: &str, speaker: &str) -> Result<String, DebateError> {
        let participant = self
            .config
            .participant(speaker)
            .ok_or_else(|| DebateError::UnknownParticipant(speaker.to_string()))?;

        let opponent = opponent_in_context(context, speaker).unwrap_or("your opponent");
        let system = self.config.get_prompt(participant, topic, opponent);
        let user = turn_prompt(context, topic, speaker);

        let raw = complete(
            &self.client,
            &participant.model,
            self.config.llm.max_tokens,
            system,
            user,
        )
        .await
        .map_err(|e| DebateError::generation(speaker, e.to_string()))?;

        let reply = sanitize_response(&raw);
        if reply.len() <= MIN_REPLY_CHARS {
            return Err(DebateError::generation(
                speaker,
                format!("empty response ({} chars after sanitizing)", reply.len()),
            ));
        }

        debug!(speaker, chars = reply.len(), "generated turn");
        Ok(reply)
    }
}

/// User message for one turn.
fn turn_prompt(context: &str, topic: &str, speaker: &str) -> String {
    if context.trim().is_empty() {
        format!(
            "[Opening]\nThe debate on \"{}\" begins now. {}, state your position.",
            topic, speaker
        )
    } else {
        format!(
            "[Recent exchange]\n{}\n\n{}, it is your turn. Respond to the latest point.",
            context, speaker
        )
    }
}

/// The most recent other speaker in a `speaker: text` context block.
fn opponent_in_context<'a>(context: &'a str, speaker: &str) -> Option<&'a str> {
    context
        .lines()
        .rev()
        .filter_map(|line| line.split_once(": ").map(|(name, _)| name))
        .find(|name| *name != speaker)
}

/// Known reasoning/internal tags, stripped together with their content.
const REASONING_TAGS: [&str; 15] = [
    "thinking",
    "think",
    "reflection",
    "reflect",
    "internal",
    "reasoning",
    "thought",
    "scratch",
    "scratchpad",
    "plan",
    "analysis",
    "analyze",
    "consider",
    "pondering",
    "deliberation",
];

static REASONING_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REASONING_TAGS
        .iter()
        .filter_map(|tag| Regex::new(&format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag)).ok())
        .collect()
});

static ORPHAN_TAG_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"</?[\w]+[^>]*>").ok());

static WHITESPACE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Sanitize AI response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
pub fn sanitize_response(response: &str) -> String {
    let mut result = response.to_string();

    for re in REASONING_RES.iter() {
        result = re.replace_all(&result, "").to_string();
    }

    if let Some(re) = ORPHAN_TAG_RE.as_ref() {
        result = re.replace_all(&result, "").to_string();
    }

    // Markdown emphasis would be read aloud by the synthesizer.
    result = result.replace('*', "");

    if let Some(re) = WHITESPACE_RE.as_ref() {
        result = re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}
