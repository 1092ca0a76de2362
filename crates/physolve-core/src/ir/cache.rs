//! Conversion cache with LRU eviction
//!
//! Keys are blake3 digests of the canonical JSON of the problem model plus
//! the builder options, so two structurally identical inputs share an entry.

use crate::config::IrOptions;
use crate::ir::model::ProblemModel;
use crate::ir::types::SystemIr;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// A cached successful conversion
#[derive(Debug, Clone, PartialEq)]
pub struct CachedConversion {
    pub ir: SystemIr,
    pub warnings: Vec<String>,
}

/// IR cache with LRU eviction
#[derive(Debug)]
pub struct IrCache {
    capacity: usize,
    entries: HashMap<String, CachedConversion>,
    /// Most recent at back
    lru_queue: VecDeque<String>,
}

impl IrCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
        }
    }

    /// Cache key for a model under the given options
    ///
    /// Falls back to `None` when the model cannot be serialized, in which
    /// case the conversion is simply not cached.
    pub fn key(model: &ProblemModel, options: &IrOptions) -> Option<String> {
        let canonical = serde_json::to_string(&(model, options)).ok()?;
        Some(blake3::hash(canonical.as_bytes()).to_hex().to_string())
    }

    /// Store an entry, returning the evicted one if the cache was full
    pub fn store(&mut self, key: String, entry: CachedConversion) -> Option<CachedConversion> {
        if self.capacity == 0 {
            return None;
        }

        if self.entries.contains_key(&key) {
            self.touch(&key);
            self.entries.insert(key, entry);
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.lru_queue
                .pop_front()
                .and_then(|oldest| self.entries.remove(&oldest))
        } else {
            None
        };

        self.entries.insert(key.clone(), entry);
        self.lru_queue.push_back(key);

        evicted
    }

    /// Look up an entry, marking it most recently used
    pub fn get(&mut self, key: &str) -> Option<&CachedConversion> {
        if self.entries.contains_key(key) {
            self.touch(key);
            return self.entries.get(key);
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_queue.clear();
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

impl Default for IrCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrBuilder;
    use crate::ir::model::{ParameterSpec, SystemSpec};

    async fn sample_entry() -> CachedConversion {
        let model = ProblemModel {
            system: Some(SystemSpec {
                system_type: "free_fall".to_string(),
                parameters: vec![ParameterSpec::given("h", 5.0, "m")],
                ..Default::default()
            }),
            ..Default::default()
        };
        let result = IrBuilder::new().convert(&model).await;
        CachedConversion {
            ir: result.ir.unwrap(),
            warnings: result.warnings,
        }
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let entry = sample_entry().await;
        let mut cache = IrCache::with_capacity(2);

        cache.store("a".into(), entry.clone());
        cache.store("b".into(), entry.clone());
        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        let evicted = cache.store("c".into(), entry.clone());

        assert!(evicted.is_some());
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_storage() {
        let entry = sample_entry().await;
        let mut cache = IrCache::with_capacity(0);
        cache.store("a".into(), entry);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_is_structural() {
        let options = IrOptions::default();
        let a = ProblemModel::default();
        let b = ProblemModel::default();
        assert_eq!(IrCache::key(&a, &options), IrCache::key(&b, &options));

        let c = ProblemModel {
            system: Some(SystemSpec {
                system_type: "orbit".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_ne!(IrCache::key(&a, &options), IrCache::key(&c, &options));

        let other_options = IrOptions {
            max_modules: 3,
            ..IrOptions::default()
        };
        assert_ne!(IrCache::key(&a, &options), IrCache::key(&a, &other_options));
    }
}
