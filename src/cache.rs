//! Bounded least-recently-used cache for sentence analyses.
//!
//! Recency is a monotonically increasing tick. Entries live in a `HashMap`
//! alongside their tick, and a `BTreeMap` orders ticks so the oldest entry is
//! always the first key.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Mutex;

use crate::analysis::{AnalysisModel, SentenceAnalysis};

#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// A capacity of 0 stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `key` and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let next = self.next_tick();
        let (value, tick) = self.entries.get_mut(key)?;
        self.order.remove(&*tick);
        *tick = next;
        self.order.insert(next, key.clone());
        Some(value.clone())
    }

    /// Insert or replace `key`, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        if let Some((_, old_tick)) = self.entries.remove(&key) {
            self.order.remove(&old_tick);
        } else if self.entries.len() >= self.capacity {
            if let Some((_, oldest)) = self.order.pop_first() {
                self.entries.remove(&oldest);
            }
        }

        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Cache key: the model that produced the analysis and the exact sentence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    pub model: AnalysisModel,
    pub sentence: String,
}

impl AnalysisKey {
    pub fn new(model: AnalysisModel, sentence: &str) -> Self {
        Self {
            model,
            sentence: sentence.to_string(),
        }
    }
}

/// Thread-safe analysis cache shared by request handlers.
///
/// The lock is only held for the map operation itself, never across a
/// provider call.
#[derive(Debug)]
pub struct AnalysisCache {
    inner: Mutex<LruCache<AnalysisKey, SentenceAnalysis>>,
}

impl AnalysisCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, model: AnalysisModel, sentence: &str) -> Option<SentenceAnalysis> {
        self.lock().get(&AnalysisKey::new(model, sentence))
    }

    pub fn insert(&self, model: AnalysisModel, sentence: &str, analysis: SentenceAnalysis) {
        self.lock()
            .insert(AnalysisKey::new(model, sentence), analysis);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Entries stay usable after a panic in another lock holder.
    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<AnalysisKey, SentenceAnalysis>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
