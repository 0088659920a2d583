//! Module result cache
//!
//! TTL cache keyed by module name plus a sha256 fingerprint of the input
//! ports. Only successful outcomes are stored; expired entries are dropped
//! on lookup.

use crate::value::Value;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct CacheEntry {
    outputs: HashMap<String, Value>,
    context: Option<String>,
    inserted_at: Instant,
    ttl: Duration,
}

/// In-memory module result cache
pub struct ModuleCache {
    entries: DashMap<String, CacheEntry>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Content-addressed key from module identity and input values.
    ///
    /// Ports are visited in sorted order so the fingerprint is independent
    /// of map iteration order.
    pub fn fingerprint(module_name: &str, inputs: &HashMap<String, Value>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(module_name.as_bytes());
        let mut ports: Vec<&String> = inputs.keys().collect();
        ports.sort();
        for port in ports {
            hasher.update(port.as_bytes());
            if let Some(value) = inputs.get(port) {
                hasher.update(serde_json::to_string(value).unwrap_or_default().as_bytes());
            }
        }
        format!("{}:{}", module_name, hex::encode(hasher.finalize()))
    }

    /// Stored outcome for a key, if present and not expired
    pub fn get(&self, key: &str) -> Option<(HashMap<String, Value>, Option<String>)> {
        let hit = {
            let entry = self.entries.get(key)?;
            if entry.inserted_at.elapsed() <= entry.ttl {
                Some((entry.outputs.clone(), entry.context.clone()))
            } else {
                None
            }
        };
        if hit.is_none() {
            self.entries.remove(key);
        }
        hit
    }

    pub fn put(
        &self,
        key: String,
        outputs: HashMap<String, Value>,
        context: Option<String>,
        ttl: Duration,
    ) {
        self.entries.insert(
            key,
            CacheEntry {
                outputs,
                context,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}
