use std::path::PathBuf;
use std::time::Duration;

/// Which model backend the conversation endpoint talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// OpenAI assistants v2 thread/run API.
    OpenAiAssistants,
    /// Plain chat-completions API wrapped behind the same interface.
    Completions,
}

impl BackendKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("completions") => BackendKind::Completions,
            _ => BackendKind::OpenAiAssistants,
        }
    }
}

/// Server configuration loaded from environment variables.
pub struct Config {
    pub port: u16,
    pub environment: String,
    pub sentry_dsn: Option<String>,
    /// HS256 secret for verifying caller bearer tokens. Requests to /api
    /// fail closed with 401 when the presented token doesn't verify.
    pub jwt_secret: Option<String>,
    pub backend: BackendKind,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Model used by the completions backend when the agent doesn't name one.
    pub completions_model: String,
    /// Fixed delay between run status polls.
    pub poll_interval: Duration,
    /// Wall-clock budget for one run; exceeding it fails the turn.
    pub poll_deadline: Duration,
    /// Hard cap on status fetches per run, independent of the deadline.
    pub max_polls: u32,
    /// Overrides the default ~/.agentdeck data directory.
    pub data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(RawConfig {
            port: std::env::var("PORT").ok(),
            environment: std::env::var("ENVIRONMENT").ok(),
            sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            jwt_secret: std::env::var("JWT_SECRET").ok(),
            backend: std::env::var("MODEL_BACKEND").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            completions_model: std::env::var("COMPLETIONS_MODEL").ok(),
            poll_interval_ms: std::env::var("RUN_POLL_INTERVAL_MS").ok(),
            poll_deadline_secs: std::env::var("RUN_POLL_DEADLINE_SECS").ok(),
            max_polls: std::env::var("RUN_MAX_POLLS").ok(),
            data_dir: std::env::var("AGENTDECK_DATA_DIR").ok(),
        })
    }

    /// Build a Config from raw string values (as they would come from env
    /// vars). Used directly in tests to avoid mutating process-global
    /// environment.
    pub fn from_raw_values(raw: RawConfig) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        Config {
            port: raw.port.and_then(|v| v.parse().ok()).unwrap_or(8090),
            environment: non_empty(raw.environment).unwrap_or_else(|| "local".to_string()),
            sentry_dsn: non_empty(raw.sentry_dsn),
            jwt_secret: non_empty(raw.jwt_secret),
            backend: BackendKind::parse(raw.backend.as_deref()),
            openai_api_key: non_empty(raw.openai_api_key),
            openai_base_url: non_empty(raw.openai_base_url)
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            completions_model: non_empty(raw.completions_model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            poll_interval: Duration::from_millis(
                raw.poll_interval_ms
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2_000),
            ),
            poll_deadline: Duration::from_secs(
                raw.poll_deadline_secs
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
            max_polls: raw.max_polls.and_then(|v| v.parse().ok()).unwrap_or(60),
            data_dir: non_empty(raw.data_dir).map(PathBuf::from),
        }
    }
}

/// Raw env var values, prior to parsing and defaulting.
#[derive(Default)]
pub struct RawConfig {
    pub port: Option<String>,
    pub environment: Option<String>,
    pub sentry_dsn: Option<String>,
    pub jwt_secret: Option<String>,
    pub backend: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub completions_model: Option<String>,
    pub poll_interval_ms: Option<String>,
    pub poll_deadline_secs: Option<String>,
    pub max_polls: Option<String>,
    pub data_dir: Option<String>,
}
