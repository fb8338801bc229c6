//! Generation Cache
//!
//! In-memory cache of generator responses keyed by prompt and sampling options.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{GenerationOptions, TextGenerator};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    prompt_hash: [u8; 32],
    temperature_bits: u32,
    max_tokens: u32,
}

impl CacheKey {
    fn new(prompt: &str, options: &GenerationOptions) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        Self {
            prompt_hash: hasher.finalize().into(),
            temperature_bits: options.temperature.to_bits(),
            max_tokens: options.max_tokens,
        }
    }
}

const DEFAULT_CACHE_CAPACITY: usize = 512;

#[derive(Default)]
struct Entries {
    responses: HashMap<CacheKey, String>,
    /// Insertion order, oldest first.
    order: VecDeque<CacheKey>,
}

/// Bounded response cache. The oldest entry is evicted once `capacity` is reached.
pub struct GenerationCache {
    entries: Arc<RwLock<Entries>>,
    capacity: usize,
}

impl GenerationCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            capacity: capacity.max(1),
        }
    }

    pub async fn get(&self, prompt: &str, options: &GenerationOptions) -> Option<String> {
        let entries = self.entries.read().await;
        entries.responses.get(&CacheKey::new(prompt, options)).cloned()
    }

    pub async fn set(&self, prompt: &str, options: &GenerationOptions, response: String) {
        let key = CacheKey::new(prompt, options);
        let mut entries = self.entries.write().await;
        if entries.responses.insert(key.clone(), response).is_some() {
            return;
        }
        entries.order.push_back(key);
        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.responses.remove(&oldest);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.responses.len()
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.responses.clear();
        entries.order.clear();
    }
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Generator wrapper that serves repeated prompts from a cache.
pub struct CachedProvider {
    inner: Arc<dyn TextGenerator>,
    cache: Arc<GenerationCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn TextGenerator>, cache: Arc<GenerationCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl TextGenerator for CachedProvider {
    async fn generate(&self, prompt: String, options: GenerationOptions) -> anyhow::Result<String> {
        if let Some(cached) = self.cache.get(&prompt, &options).await {
            tracing::debug!("Generation cache hit");
            return Ok(cached);
        }

        let response = self.inner.generate(prompt.clone(), options).await?;
        self.cache.set(&prompt, &options, response.clone()).await;
        Ok(response)
    }
}
