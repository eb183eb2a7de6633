//! LLM response cache (spec.md §4.1): keyed by the first 16 hex chars of the
//! SHA-256 digest of the canonical-JSON-serialized message list, TTL 3600s
//! by default. Cache failures (read or write) degrade silently to a miss.

use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use crate::types::{ChatMessage, GenerateOnceResult};

const KEY_PREFIX: &str = "llm_cache:";

/// Canonical-JSON-serialize the message list and return the first 16 hex
/// chars of its SHA-256 digest.
pub fn cache_key(messages: &[ChatMessage]) -> String {
    let canonical = serde_json::to_string(messages).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub struct LlmCache {
    client: redis::Client,
    ttl_seconds: u64,
}

impl LlmCache {
    pub fn new(redis_url: &str, ttl_seconds: u64) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            ttl_seconds,
        })
    }

    /// Returns `Some(result)` with `finish_reason = "cached"` and zero
    /// generated-token count on a hit. Any connection or decode error
    /// degrades to `None`, logged at `warn`, never surfaced to the caller.
    pub async fn get(&self, messages: &[ChatMessage]) -> Option<GenerateOnceResult> {
        let key = format!("{KEY_PREFIX}{}", cache_key(messages));
        let result: Result<Option<String>, redis::RedisError> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.get(&key).await
        }
        .await;

        match result {
            Ok(Some(raw)) => match serde_json::from_str::<String>(&raw) {
                Ok(text) => Some(GenerateOnceResult {
                    text,
                    token_count: 0,
                    finish_reason: "cached".to_string(),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "llm cache decode failed, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "llm cache read failed, degrading to miss");
                None
            }
        }
    }

    pub async fn set(&self, messages: &[ChatMessage], text: &str) {
        let key = format!("{KEY_PREFIX}{}", cache_key(messages));
        let payload = serde_json::to_string(text).unwrap_or_default();
        let result: Result<(), redis::RedisError> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            conn.set_ex(&key, payload, self.ttl_seconds).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, "llm cache write failed, degrading silently");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_identical_message_lists() {
        let messages = vec![
            ChatMessage { role: "system".to_string(), content: "hi".to_string() },
            ChatMessage { role: "user".to_string(), content: "hello".to_string() },
        ];
        assert_eq!(cache_key(&messages), cache_key(&messages.clone()));
        assert_eq!(cache_key(&messages).len(), 16);
    }

    #[test]
    fn cache_key_differs_for_different_messages() {
        let a = vec![ChatMessage { role: "user".to_string(), content: "hello".to_string() }];
        let b = vec![ChatMessage { role: "user".to_string(), content: "goodbye".to_string() }];
        assert_ne!(cache_key(&a), cache_key(&b));
    }
}
