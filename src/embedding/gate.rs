//! Embedding gate: content-addressed cache plus single-flight coalescing
//!
//! Concurrent misses for the same text share one upstream call. The first
//! caller installs a pending flight in the in-flight table; everyone else
//! waits on that flight. The call runs on its own task, so it settles and
//! fills the cache even when every waiter has gone away. The entry is removed
//! once the call settles, whatever the outcome. Failures are handed to every
//! waiter of that flight and never cached.

use super::{EmbeddingError, EmbeddingProvider};
use ahash::{HashMap, HashMapExt};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared embedding vector
pub type Embedding = Arc<Vec<f32>>;

type FlightResult = Result<Embedding, EmbeddingError>;
/// Outcome of one upstream call, `None` until it settles
type Flight = watch::Receiver<Option<FlightResult>>;

/// Content address of a normalized text
type CacheKey = [u8; 32];

/// Gate counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub cache_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub upstream_calls: u64,
    pub coalesced: u64,
}

/// Caching, stampede-proof front for an [`EmbeddingProvider`]
pub struct EmbeddingGate {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<Mutex<LruCache<CacheKey, Embedding>>>,
    in_flight: Arc<Mutex<HashMap<CacheKey, Flight>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_calls: AtomicU64,
    coalesced: AtomicU64,
}

/// Normalization applied before hashing and before the upstream call
pub fn normalize_for_embedding(text: &str) -> String {
    crate::text::collapse_whitespace(text)
}

fn content_key(normalized: &str) -> CacheKey {
    *blake3::hash(normalized.as_bytes()).as_bytes()
}

impl EmbeddingGate {
    /// Create a gate holding at most `capacity` cached vectors
    pub fn new(provider: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            upstream_calls: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Embedding dimension of the wrapped provider
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Model name of the wrapped provider
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed one text, serving from cache or joining an in-flight call
    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let normalized = normalize_for_embedding(text);
        if normalized.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let key = content_key(&normalized);

        if let Some(hit) = self.cache.lock().get(&key).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }

        let (mut flight, leader) = {
            let mut in_flight = self.in_flight.lock();
            // Re-check under the table lock: a flight that just finished has
            // already written the cache before leaving the table.
            if let Some(hit) = self.cache.lock().get(&key).cloned() {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
            match in_flight.get(&key) {
                Some(existing) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    (existing.clone(), None)
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let (sender, flight) = watch::channel(None);
                    in_flight.insert(key, flight.clone());
                    (flight, Some(sender))
                }
            }
        };

        if let Some(sender) = leader {
            self.start_upstream(key, normalized, sender);
        }

        let settled = match flight.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| {
            Err(EmbeddingError::GenerationError(
                "Embedding task ended without a result".to_string(),
            ))
        })
    }

    /// Run the upstream call on its own task and publish the outcome
    ///
    /// Only the task that installed the in-flight entry removes it, after the
    /// cache write.
    fn start_upstream(
        &self,
        key: CacheKey,
        normalized: String,
        sender: watch::Sender<Option<FlightResult>>,
    ) {
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        let provider = self.provider.clone();
        let cache = self.cache.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || provider.embed(&normalized))
                .await
                .map_err(|e| EmbeddingError::GenerationError(format!("Embedding task failed: {}", e)))
                .and_then(|inner| inner);

            let result = match outcome {
                Ok(vector) => {
                    let vector: Embedding = Arc::new(vector);
                    cache.lock().put(key, vector.clone());
                    Ok(vector)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Upstream embedding call failed");
                    Err(e)
                }
            };

            in_flight.lock().remove(&key);
            sender.send_replace(Some(result));
        });
    }

    /// Embed many texts, sending only the cache misses upstream in one batch
    ///
    /// Used for ingestion. Bypasses single-flight; concurrent ingestion of the
    /// same text at worst embeds it twice.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let normalized: Vec<String> = texts.iter().map(|t| normalize_for_embedding(t)).collect();
        if normalized.iter().any(String::is_empty) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains empty text".to_string(),
            ));
        }

        let keys: Vec<CacheKey> = normalized.iter().map(|t| content_key(t)).collect();
        let mut results: Vec<Option<Embedding>> = {
            let mut cache = self.cache.lock();
            keys.iter().map(|k| cache.get(k).cloned()).collect()
        };

        let missing: Vec<usize> = (0..results.len()).filter(|&i| results[i].is_none()).collect();
        self.hits
            .fetch_add((results.len() - missing.len()) as u64, Ordering::Relaxed);

        if !missing.is_empty() {
            self.misses
                .fetch_add(missing.len() as u64, Ordering::Relaxed);
            self.upstream_calls.fetch_add(1, Ordering::Relaxed);

            let provider = self.provider.clone();
            let batch: Vec<String> = missing.iter().map(|&i| normalized[i].clone()).collect();
            let expected = batch.len();

            let vectors = tokio::task::spawn_blocking(move || provider.embed_batch(&batch))
                .await
                .map_err(|e| {
                    EmbeddingError::GenerationError(format!("Embedding task failed: {}", e))
                })??;

            if vectors.len() != expected {
                return Err(EmbeddingError::GenerationError(format!(
                    "Embedding count mismatch: expected {}, got {}",
                    expected,
                    vectors.len()
                )));
            }

            let mut cache = self.cache.lock();
            for (&i, vector) in missing.iter().zip(vectors) {
                let vector: Embedding = Arc::new(vector);
                cache.put(keys[i], vector.clone());
                results[i] = Some(vector);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Current counters
    pub fn stats(&self) -> GateStats {
        GateStats {
            cache_size: self.cache.lock().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            upstream_calls: self.upstream_calls.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}
