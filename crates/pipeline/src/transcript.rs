use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sentinel returned when the transcription artifact is valid JSON but
/// does not have the expected `results.items` shape. The summarizer
/// rejects this value instead of sending it to the model.
pub const PARSE_ERROR_SENTINEL: &str = "transcript parse error";

/// Token kind as emitted by the transcription engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Pronunciation,
    Punctuation,
}

/// One token of the engine output: a spoken word or a punctuation mark,
/// optionally tagged with a diarized speaker id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionToken {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: TokenType,
    #[serde(default)]
    pub speaker_label: Option<String>,
}

impl TranscriptionToken {
    pub fn pronunciation(content: &str, speaker: Option<&str>) -> Self {
        Self {
            content: content.to_string(),
            kind: TokenType::Pronunciation,
            speaker_label: speaker.map(str::to_string),
        }
    }

    pub fn punctuation(content: &str) -> Self {
        Self {
            content: content.to_string(),
            kind: TokenType::Punctuation,
            speaker_label: None,
        }
    }
}

/// One reconstructed utterance line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub speaker_id: String,
    pub text: String,
}

/// Rebuilds per-speaker utterance lines from the flat token stream.
///
/// Word tokens without a speaker label inherit the running speaker
/// (diarization leaves words between turns unlabeled). Punctuation
/// attaches to the last buffered word without a space and never starts a
/// line. A turn is flushed when a labeled word arrives for a different
/// speaker, and once more at end of input.
///
/// A stream with no speaker labels at all never flushes: the buffered
/// words are dropped with a warning rather than attributed to an invented
/// speaker (unlabeled audio is treated as unusable for role assignment).
pub fn reconstruct(tokens: &[TranscriptionToken]) -> Vec<TranscriptLine> {
    let mut lines = Vec::new();
    let mut current_speaker: Option<String> = None;
    let mut words: Vec<String> = Vec::new();

    for token in tokens {
        let mut speaker = token.speaker_label.clone();
        if speaker.is_none() && token.kind != TokenType::Punctuation {
            speaker = current_speaker.clone();
        }
        if current_speaker.is_none() {
            current_speaker = speaker.clone();
        }

        match token.kind {
            TokenType::Pronunciation => {
                if speaker != current_speaker && current_speaker.is_some() && !words.is_empty() {
                    lines.push(TranscriptLine {
                        speaker_id: current_speaker.take().unwrap_or_default(),
                        text: words.join(" "),
                    });
                    words = vec![token.content.clone()];
                    current_speaker = speaker;
                } else {
                    words.push(token.content.clone());
                }
            }
            TokenType::Punctuation => {
                // Punctuation with an empty buffer should not occur in
                // well-formed output; drop it rather than fail the job.
                if let Some(last) = words.last_mut() {
                    last.push_str(&token.content);
                }
            }
        }
    }

    if !words.is_empty() {
        match current_speaker {
            Some(speaker_id) => lines.push(TranscriptLine {
                speaker_id,
                text: words.join(" "),
            }),
            None => warn!(
                dropped_words = words.len(),
                "token stream carried no speaker labels; dropping unattributed words"
            ),
        }
    }

    lines
}

/// Renders reconstructed lines in the `[speaker]: text` form the
/// summarization prompt expects.
pub fn render_lines(lines: &[TranscriptLine]) -> String {
    lines
        .iter()
        .map(|line| format!("[{}]: {}", line.speaker_id, line.text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Engine artifact shape ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EngineOutput {
    results: EngineResults,
}

#[derive(Debug, Deserialize)]
struct EngineResults {
    items: Vec<EngineItem>,
}

#[derive(Debug, Deserialize)]
struct EngineItem {
    #[serde(rename = "type", default = "default_item_type")]
    kind: String,
    #[serde(default)]
    alternatives: Vec<EngineAlternative>,
    #[serde(default)]
    speaker_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EngineAlternative {
    content: String,
}

fn default_item_type() -> String {
    "pronunciation".to_string()
}

/// Parses the engine's JSON artifact and renders the speaker-attributed
/// transcript text.
///
/// Malformed JSON is a fatal error (the artifact is expected to exist and
/// be valid once the engine reports completion). Valid JSON without the
/// expected shape degrades to [`PARSE_ERROR_SENTINEL`] so the job can
/// still fail gracefully downstream.
pub fn transcript_from_artifact(raw: &[u8]) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(raw)?;

    let output: EngineOutput = match serde_json::from_value(value) {
        Ok(output) => output,
        Err(err) => {
            warn!(error = %err, "transcription artifact missing results/items");
            return Ok(PARSE_ERROR_SENTINEL.to_string());
        }
    };

    let tokens: Vec<TranscriptionToken> = output
        .results
        .items
        .into_iter()
        .filter_map(|item| {
            let content = item.alternatives.into_iter().next()?.content;
            let kind = match item.kind.as_str() {
                "punctuation" => TokenType::Punctuation,
                _ => TokenType::Pronunciation,
            };
            Some(TranscriptionToken {
                content,
                kind,
                speaker_label: item.speaker_label,
            })
        })
        .collect();

    Ok(render_lines(&reconstruct(&tokens)))
}
