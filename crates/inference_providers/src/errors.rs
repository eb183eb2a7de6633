use thiserror::Error;

/// Common failure kinds shared by every provider adapter.
///
/// Mirrors the taxonomy a caller needs to decide whether to retry, drop the
/// turn, or surface an error frame: transport-level RPC failures, timeouts,
/// and "the provider isn't reachable at all" are distinguished because the
/// turn pipeline reacts to each differently (see `services::turn`).
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    #[error("provider rpc error: {0}")]
    ProviderRpcError(String),
    #[error("provider call timed out after {0:?}")]
    ProviderTimeout(std::time::Duration),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

#[derive(Debug, Error)]
pub enum AsrError {
    #[error(transparent)]
    Kind(#[from] ProviderErrorKind),
    #[error("invalid audio data: {0}")]
    InvalidAudio(String),
    #[error("pool exhausted: no channel available")]
    PoolExhausted,
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Kind(#[from] ProviderErrorKind),
    #[error("malformed response from provider: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error(transparent)]
    Kind(#[from] ProviderErrorKind),
    #[error("pool exhausted: no channel available")]
    PoolExhausted,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}
