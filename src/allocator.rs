//! Monotonic identifier allocation.
//!
//! Every namespace owns one counter. The counter is seeded lazily on the
//! first allocation after process start from the highest numeric identifier
//! found in storage, then advanced atomically. Seeding happens at most once
//! per namespace: concurrent first callers wait on the same seeding step
//! instead of scanning storage themselves.
//!
//! Identifiers are never handed back. A caller that allocates and then fails
//! to persist leaves a gap in the sequence.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::store::{IdSource, StoreError};
use crate::types::Namespace;

/// Allocation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// Seeding could not read the namespace's existing identifiers.
    Unavailable { namespace: String, source: StoreError },
    /// The namespace sequence reached `u64::MAX`.
    Exhausted(String),
}

impl fmt::Display for AllocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { namespace, source } => {
                write!(f, "Identifier allocator unavailable for '{}': {}", namespace, source)
            }
            Self::Exhausted(namespace) => {
                write!(f, "Identifier space exhausted for '{}'", namespace)
            }
        }
    }
}

impl std::error::Error for AllocatorError {}

/// Per-namespace high-water mark. Unset until seeded.
#[derive(Default)]
struct Sequence {
    high_water: OnceCell<AtomicU64>,
}

/// Hands out unique, strictly increasing identifiers per namespace.
pub struct IdAllocator {
    source: Arc<dyn IdSource>,
    sequences: Mutex<HashMap<Namespace, Arc<Sequence>>>,
}

impl IdAllocator {
    pub fn new(source: Arc<dyn IdSource>) -> Self {
        Self {
            source,
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate the next identifier in `namespace`.
    pub async fn next(&self, namespace: &Namespace) -> Result<u64, AllocatorError> {
        let sequence = self.sequence(namespace).await;

        let counter = sequence
            .high_water
            .get_or_try_init(|| self.seed(namespace))
            .await?;

        // fetch_update keeps the counter from wrapping at u64::MAX.
        let previous = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_add(1))
            .map_err(|_| AllocatorError::Exhausted(namespace.to_string()))?;

        Ok(previous + 1)
    }

    /// Allocate the next identifier formatted as a decimal string.
    pub async fn next_id(&self, namespace: &Namespace) -> Result<String, AllocatorError> {
        self.next(namespace).await.map(|id| id.to_string())
    }

    /// Current high-water mark, or `None` if the namespace is not seeded yet.
    pub async fn peek(&self, namespace: &Namespace) -> Option<u64> {
        let sequences = self.sequences.lock().await;
        sequences
            .get(namespace)
            .and_then(|s| s.high_water.get())
            .map(|counter| counter.load(Ordering::SeqCst))
    }

    async fn sequence(&self, namespace: &Namespace) -> Arc<Sequence> {
        let mut sequences = self.sequences.lock().await;
        sequences
            .entry(namespace.clone())
            .or_insert_with(|| Arc::new(Sequence::default()))
            .clone()
    }

    async fn seed(&self, namespace: &Namespace) -> Result<AtomicU64, AllocatorError> {
        debug!(namespace = %namespace, "Seeding identifier sequence from storage");

        let ids = self.source.scan_ids(namespace).await.map_err(|e| {
            error!(namespace = %namespace, error = %e, "Identifier seeding scan failed");
            AllocatorError::Unavailable {
                namespace: namespace.to_string(),
                source: e,
            }
        })?;

        let scanned = ids.len();
        let seed = max_numeric_id(ids.iter().map(String::as_str));

        info!(namespace = %namespace, scanned, seed, "Identifier sequence seeded");
        Ok(AtomicU64::new(seed))
    }
}

/// Largest identifier that parses as a non-negative integer, or 0.
///
/// Legacy identifiers that are not numeric do not take part. An all-digit
/// identifier beyond `u64::MAX` pins the result at `u64::MAX`, so the
/// namespace reports exhaustion instead of reissuing lower numbers.
pub fn max_numeric_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> u64 {
    ids.into_iter()
        .filter_map(|id| {
            let id = id.trim();
            match id.parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) => {
                    warn!(id, "Stored identifier exceeds u64, sequence is exhausted");
                    Some(u64::MAX)
                }
                Err(_) => None,
            }
        })
        .max()
        .unwrap_or(0)
}
