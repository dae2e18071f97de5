use std::env;

#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub chat_model: String,
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub chat_max_tokens: usize,
    pub summary_max_tokens: usize,
    pub transcript_max_tokens: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 600,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub openai_base_url: String,
    pub api_key: Option<String>,
    pub models: ModelConfig,
    pub tokens: TokenConfig,
    pub retry: RetryConfig,
    pub summary_turns: usize,
    pub always_summarize: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("TUTORBOT_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            models: ModelConfig {
                chat_model: env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            },
            tokens: TokenConfig {
                chat_max_tokens: env::var("CHAT_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(280),
                summary_max_tokens: env::var("SUMMARY_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(160),
                transcript_max_tokens: env::var("TRANSCRIPT_MAX_TOKENS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            },
            retry: RetryConfig {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                initial_delay_ms: env::var("RETRY_INITIAL_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            },
            summary_turns: env::var("SUMMARY_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            always_summarize: env::var("TUTORBOT_ALWAYS_SUMMARIZE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
