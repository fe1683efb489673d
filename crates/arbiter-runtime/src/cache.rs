//! Response cache for routed generations.
//!
//! Keyed by a hash of the backend, the normalized prompt and the generation
//! options, so repeated prompts to the same backend skip dispatch. Bounded by entry count with LRU
//! eviction and a time-to-live. Staleness within the TTL is accepted.

use moka::future::Cache;
use moka::policy::EvictionPolicy;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use arbiter_core::config::CacheConfig;

use crate::providers::{GenerateOptions, TokenUsage};

/// Cache key for routed responses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Hash the backend, the normalized prompt, and the model, token limit
    /// and temperature.
    ///
    /// An entry is only ever a hit for the backend that produced it.
    pub fn new(backend: &str, prompt: &str, options: &GenerateOptions) -> Self {
        let mut hasher = DefaultHasher::new();
        backend.hash(&mut hasher);
        normalize_prompt(prompt).hash(&mut hasher);
        options.model.hash(&mut hasher);
        options.system.hash(&mut hasher);
        options.max_tokens.hash(&mut hasher);
        options.temperature.to_bits().hash(&mut hasher);
        Self(hasher.finish())
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Trim, collapse internal whitespace and lower-case.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A cached generation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub text: String,

    /// Backend that produced the text
    pub provider: String,

    pub model: String,
    pub usage: TokenUsage,
}

/// Response cache using moka.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Cache<CacheKey, CachedResponse>,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a new cache with the given configuration.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();

        Self { cache, ttl }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.ttl)
    }

    /// Get a cached response.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedResponse> {
        self.cache.get(key).await
    }

    /// Store a response. Writing the same key twice is harmless.
    pub async fn insert(&self, key: CacheKey, value: CachedResponse) {
        self.cache.insert(key, value).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate entry count (moka updates it lazily).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entry_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> CachedResponse {
        CachedResponse {
            text: text.to_string(),
            provider: "echo".to_string(),
            model: "echo".to_string(),
            usage: TokenUsage::default(),
        }
    }

    #[test]
    fn test_key_normalizes_prompt() {
        let options = GenerateOptions::default();
        let a = CacheKey::new("echo", "  Hello   World\n", &options);
        let b = CacheKey::new("echo", "hello world", &options);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_options() {
        let base = GenerateOptions::default();
        let hotter = GenerateOptions {
            temperature: 0.9,
            ..GenerateOptions::default()
        };
        let longer = GenerateOptions {
            max_tokens: 4096,
            ..GenerateOptions::default()
        };
        let key = CacheKey::new("echo", "prompt", &base);
        assert_ne!(key, CacheKey::new("echo", "prompt", &hotter));
        assert_ne!(key, CacheKey::new("echo", "prompt", &longer));
        assert_ne!(key, CacheKey::new("claude", "prompt", &base));
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let cache = ResponseCache::default();
        let key = CacheKey::new("echo", "Hello", &GenerateOptions::default());

        assert!(cache.get(&key).await.is_none());

        cache.insert(key, response("hi")).await;

        let cached = cache.get(&key).await;
        assert_eq!(cached.map(|c| c.text), Some("hi".to_string()));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = ResponseCache::new(100, Duration::from_millis(50));
        let key = CacheKey::new("echo", "expiring", &GenerateOptions::default());

        cache.insert(key, response("soon gone")).await;
        assert!(cache.get(&key).await.is_some());

        // moka reads wall-clock time, so this sleeps for real
        std::thread::sleep(Duration::from_millis(120));
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_size_bound_evicts_least_recently_used() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        let options = GenerateOptions::default();
        let keys: Vec<CacheKey> = ["first", "second", "third"]
            .iter()
            .map(|prompt| CacheKey::new("echo", prompt, &options))
            .collect();

        cache.insert(keys[0], response("1")).await;
        cache.insert(keys[1], response("2")).await;
        cache.cache.run_pending_tasks().await;

        cache.insert(keys[2], response("3")).await;
        cache.cache.run_pending_tasks().await;

        assert!(cache.entry_count() <= 2);
        assert!(cache.get(&keys[0]).await.is_none());
        assert_eq!(cache.get(&keys[2]).await.map(|c| c.text), Some("3".to_string()));
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let cache = ResponseCache::default();
        let key = CacheKey::new("echo", "x", &GenerateOptions::default());
        cache.insert(key, response("y")).await;
        cache.invalidate_all();
        assert!(cache.get(&key).await.is_none());
    }
}
