use serde::{Deserialize, Serialize};

/// Top-level application settings.
///
/// Loaded from `config/default.toml` (optional), an environment-specific
/// file named by `DENTA_ENV` (optional), and finally `DENTA__`-prefixed
/// environment variables (e.g. `DENTA__AWS__BUCKET`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub aws: AwsSettings,
    pub transcribe: TranscribeSettings,
    pub llm: LlmSettings,
    pub worker: WorkerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    pub region: String,
    /// Bucket holding both uploaded audio and transcription artifacts.
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeSettings {
    /// BCP-47 language code passed to the transcription engine.
    pub language_code: String,
    /// Speaker diarization cap. Dental consultations are two-party.
    pub max_speakers: i32,
    /// Seconds between status polls while the engine job is running.
    pub poll_interval_secs: u64,
    /// Backoff in seconds when the job is not yet queryable.
    pub transient_backoff_secs: u64,
    /// Ceiling on the whole poll loop; expiry fails the job.
    pub max_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL, e.g. "https://api.openai.com/v1".
    pub api_base: String,
    /// API key. Usually injected via `DENTA__LLM__API_KEY`.
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Number of concurrent pipeline workers.
    pub count: usize,
    /// Bounded queue depth before enqueue backpressures.
    pub queue_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http: HttpSettings::default(),
            aws: AwsSettings::default(),
            transcribe: TranscribeSettings::default(),
            llm: LlmSettings::default(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for AwsSettings {
    fn default() -> Self {
        Self {
            region: "ap-northeast-2".to_string(),
            bucket: "dental-ai-recordings".to_string(),
        }
    }
}

impl Default for TranscribeSettings {
    fn default() -> Self {
        Self {
            language_code: "ko-KR".to_string(),
            max_speakers: 2,
            poll_interval_secs: 10,
            transient_backoff_secs: 5,
            max_wait_secs: 30 * 60,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            queue_depth: 64,
        }
    }
}

impl Settings {
    /// Loads settings with file + environment layering.
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("DENTA_ENV").unwrap_or_else(|_| "default".to_string());

        config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DENTA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
