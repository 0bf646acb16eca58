//! Memoizing classifier adapter.
//!
//! Appends run inside the store's mutation lane and must finish before the
//! next keystroke, so repeated questions about the same message text are
//! answered from memory. Only answers that depend solely on message content
//! are cached (`detect_domain`, `relevance`); history-dependent and
//! time-dependent answers always reach the inner classifier. Errors are never
//! cached.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use contextrank_core::{Classifier, ClassifierError, Detection, Message, MessageId};
use parking_lot::Mutex;

/// Identity of a message version: its id plus a hash of its content.
type VersionKey = (MessageId, u64);

/// A bounded FIFO map.
#[derive(Debug)]
struct Bounded<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Clone + Eq + Hash, V: Clone> Bounded<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Hit/miss counters for a [`CachedClassifier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// A [`Classifier`] that memoizes content-only answers of an inner classifier.
pub struct CachedClassifier {
    inner: Arc<dyn Classifier>,
    domains: Mutex<Bounded<VersionKey, Detection>>,
    relevance: Mutex<Bounded<(VersionKey, VersionKey), f32>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedClassifier {
    /// Wrap `inner`, keeping at most `capacity` answers per kind.
    pub fn new(inner: Arc<dyn Classifier>, capacity: usize) -> Self {
        Self {
            inner,
            domains: Mutex::new(Bounded::new(capacity)),
            relevance: Mutex::new(Bounded::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.domains.lock().len() + self.relevance.lock().len(),
        }
    }

    /// Forget every memoized answer. Counters are kept.
    pub fn invalidate(&self) {
        self.domains.lock().clear();
        self.relevance.lock().clear();
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

fn version_key(message: &Message) -> VersionKey {
    let mut hasher = DefaultHasher::new();
    message.content.hash(&mut hasher);
    message.author.hash(&mut hasher);
    (message.id.clone(), hasher.finish())
}

impl Classifier for CachedClassifier {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn detect_domain(&self, message: &Message) -> Result<Detection, ClassifierError> {
        let key = version_key(message);
        if let Some(hit) = self.domains.lock().get(&key) {
            self.record(true);
            return Ok(hit);
        }
        self.record(false);
        let detection = self.inner.detect_domain(message)?;
        self.domains.lock().put(key, detection.clone());
        Ok(detection)
    }

    fn relevance(&self, a: &Message, b: &Message) -> Result<f32, ClassifierError> {
        let key = (version_key(a), version_key(b));
        if let Some(hit) = self.relevance.lock().get(&key) {
            self.record(true);
            return Ok(hit);
        }
        self.record(false);
        let score = self.inner.relevance(a, b)?;
        self.relevance.lock().put(key, score);
        Ok(score)
    }

    fn should_exclude(
        &self,
        message: &Message,
        current_instruction: Option<&MessageId>,
    ) -> Result<bool, ClassifierError> {
        self.inner.should_exclude(message, current_instruction)
    }

    fn is_error_resolved(
        &self,
        message: &Message,
        history: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        self.inner.is_error_resolved(message, history)
    }

    fn detects_closure(
        &self,
        message: &Message,
        prior: &[Arc<Message>],
    ) -> Result<bool, ClassifierError> {
        self.inner.detects_closure(message, prior)
    }
}
