use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ClinicalNote;
use crate::error::PipelineError;
use crate::transcript::PARSE_ERROR_SENTINEL;

/// Placeholder written into any SOAP field the model failed to produce.
pub const SUMMARY_FAILED: &str = "AI summary unavailable";

const SOAP_SYSTEM_PROMPT: &str = "\
You are an assistant that charts dental consultations for an EMR.

Input: a dental consultation transcript whose lines are attributed to \
diarized speakers such as [spk_0] and [spk_1].

Task:
1. From context (who asks, who answers, who uses clinical terminology), \
identify which speaker is the patient and which is the practitioner.
2. Summarize the conversation as a SOAP note in the language of the \
transcript, ready to paste into the chart.

Rules:
- S (Subjective): symptoms the patient reports (chief complaint, history).
- O (Objective): findings the practitioner observes (examination, oral state).
- A (Assessment): the practitioner's diagnosis or evaluation.
- P (Plan): the treatment plan the practitioner proposes.
- Patient statements belong only in S; practitioner statements only in O, A, P.

Respond with a single valid JSON object and nothing else:
{\"s\": \"...\", \"o\": \"...\", \"a\": \"...\", \"p\": \"...\"}";

/// Trait for pluggable chat-completion backends.
#[async_trait]
pub trait ChatBackend: Send + Sync + 'static {
    /// Sends one system + user message pair and returns the raw reply text.
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Splits a consultation transcript into a SOAP note.
pub struct SoapSummarizer {
    chat: Arc<dyn ChatBackend>,
}

/// The model's expected reply shape. Missing fields fall back to the
/// failure placeholder instead of rejecting the whole note.
#[derive(Debug, Deserialize)]
struct SoapReply {
    #[serde(default = "summary_failed")]
    s: String,
    #[serde(default = "summary_failed")]
    o: String,
    #[serde(default = "summary_failed")]
    a: String,
    #[serde(default = "summary_failed")]
    p: String,
}

fn summary_failed() -> String {
    SUMMARY_FAILED.to_string()
}

impl SoapSummarizer {
    pub fn new(chat: Arc<dyn ChatBackend>) -> Self {
        Self { chat }
    }

    /// Produces a clinical note for the transcript.
    ///
    /// The only propagated failure is an unusable transcript (empty or
    /// the parse-error sentinel) — there is nothing to summarize then.
    /// Backend or parse failures degrade to a note whose four fields
    /// carry [`SUMMARY_FAILED`] and whose transcript field preserves the
    /// evidence; the transcript is never lost to a broken model call.
    pub async fn summarize(
        &self,
        job_id: &str,
        transcript: &str,
    ) -> Result<ClinicalNote, PipelineError> {
        if transcript.trim().is_empty() || transcript == PARSE_ERROR_SENTINEL {
            return Err(PipelineError::InvalidTranscript(
                "transcript is empty or failed to parse".to_string(),
            ));
        }

        info!(job_id, backend = %self.chat.name(), "requesting SOAP summary");

        let note = match self.chat.complete(SOAP_SYSTEM_PROMPT, transcript).await {
            Ok(raw) => match serde_json::from_str::<SoapReply>(&raw) {
                Ok(reply) => ClinicalNote {
                    s: reply.s,
                    o: reply.o,
                    a: reply.a,
                    p: reply.p,
                    transcript: transcript.to_string(),
                },
                Err(err) => {
                    warn!(job_id, error = %err, "model reply was not the expected JSON");
                    degraded_note(transcript, &format!("reply was not valid JSON: {err}"))
                }
            },
            Err(err) => {
                warn!(job_id, error = %err, "chat backend call failed");
                degraded_note(transcript, &err.to_string())
            }
        };

        info!(job_id, "SOAP summary ready");
        Ok(note)
    }
}

fn degraded_note(transcript: &str, reason: &str) -> ClinicalNote {
    ClinicalNote {
        s: SUMMARY_FAILED.to_string(),
        o: SUMMARY_FAILED.to_string(),
        a: SUMMARY_FAILED.to_string(),
        p: SUMMARY_FAILED.to_string(),
        transcript: format!("Transcript:\n{transcript}\n\n[error: summarization failed: {reason}]"),
    }
}

// ── OpenAI-compatible backend ───────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// Chat backend speaking the OpenAI chat-completions wire format.
pub struct OpenAiChatBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatBackend {
    pub fn new(settings: &dentascribe_config::LlmSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatBackend {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: ChatCompletionResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("chat response carried no choices"))?;

        Ok(content)
    }

    fn name(&self) -> &str {
        "openai_chat"
    }
}
