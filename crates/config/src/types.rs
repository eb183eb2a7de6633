use serde::Deserialize;

fn default_llm_temperature() -> f32 {
    0.7
}

fn default_llm_max_tokens() -> u32 {
    512
}

fn default_grpc_port() -> u16 {
    50060
}

fn default_grpc_max_workers() -> usize {
    64
}

fn default_shutdown_grace_period() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_db() -> u8 {
    0
}

fn default_asr_pool_size() -> usize {
    10
}

fn default_tts_pool_size() -> usize {
    10
}

fn default_audio_sample_rate() -> u32 {
    16000
}

fn default_tts_sample_rate() -> u32 {
    22050
}

fn default_session_timeout_seconds() -> u64 {
    3600
}

fn default_default_language() -> String {
    "hi-IN".to_string()
}

fn default_supported_languages() -> String {
    "hi-IN,en-US".to_string()
}

/// Environment-driven configuration for the voice gateway.
///
/// Every field is sourced from a single flat environment namespace (no
/// nested YAML, no file watch) via `envy::from_env`. Field names map to
/// the upper-cased environment variable of the same name.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Riva gRPC endpoint serving both ASR and TTS, e.g. `riva-server:50051`.
    pub riva_uri: String,
    pub riva_use_ssl: Option<bool>,

    pub llm_service_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    pub llm_system_prompt: Option<String>,

    /// Bind port for the gateway's own transport endpoint.
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    /// Upper bound on concurrently active turn-pipelines.
    #[serde(default = "default_grpc_max_workers")]
    pub grpc_max_workers: usize,
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_redis_host")]
    pub redis_host: String,
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,
    #[serde(default = "default_redis_db")]
    pub redis_db: u8,
    pub redis_password: Option<String>,

    #[serde(default = "default_asr_pool_size")]
    pub asr_pool_size: usize,
    #[serde(default = "default_tts_pool_size")]
    pub tts_pool_size: usize,

    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
    #[serde(default = "default_tts_sample_rate")]
    pub tts_sample_rate: u32,

    #[serde(default = "default_session_timeout_seconds")]
    pub session_timeout_seconds: u64,
    #[serde(default = "default_default_language")]
    pub default_language: String,
    /// Comma-separated BCP-47 language codes, e.g. `hi-IN,en-US`.
    #[serde(default = "default_supported_languages")]
    pub supported_languages: String,
}

impl GatewayConfig {
    pub fn supported_language_codes(&self) -> Vec<String> {
        self.supported_languages
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn is_language_supported(&self, code: &str) -> bool {
        self.supported_language_codes().iter().any(|c| c == code)
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{password}@{host}:{port}/{db}",
                password = password,
                host = self.redis_host,
                port = self.redis_port,
                db = self.redis_db
            ),
            None => format!(
                "redis://{host}:{port}/{db}",
                host = self.redis_host,
                port = self.redis_port,
                db = self.redis_db
            ),
        }
    }
}
