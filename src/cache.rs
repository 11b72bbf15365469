use std::collections::{HashMap, VecDeque};

use crate::graph::Tensor;
use crate::utils::to_csv_str;

/// How a single op runs within an executable.
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    Host,
    Shader {
        source: String,
        workgroups: [u32; 3],
    },
}

/// Everything needed to run one fetch for one set of fed shapes.
#[derive(Debug, Clone)]
pub struct Executable {
    pub order: Vec<String>,
    pub kernels: HashMap<String, Kernel>,
}

/// Cache key: the fetch plus the shape of every fed value, ordered by name.
pub fn signature(fetch: &str, feeds: &HashMap<String, Tensor>) -> String {
    let mut names = feeds.keys().collect::<Vec<&String>>();
    names.sort();
    let mut sig = format!("{}/", fetch);
    for name in names {
        sig.push_str(&format!("{}:{};", name, to_csv_str(&feeds[name].shape())));
    }
    sig
}

/// Compiled executables keyed by signature, least recently used evicted
/// first once `depth` entries are held.
pub struct ExecutableCache {
    depth: usize,
    entries: HashMap<String, Executable>,
    lru: VecDeque<String>,
    hits: usize,
    misses: usize,
}

impl ExecutableCache {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            entries: HashMap::new(),
            lru: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, signature: &str) -> Option<&Executable> {
        if !self.entries.contains_key(signature) {
            self.misses += 1;
            log::debug!("compilation cache miss: {}", signature);
            return None;
        }
        self.hits += 1;
        if self.lru.front().map(|s| s.as_str()) != Some(signature) {
            self.lru.retain(|s| s != signature);
            self.lru.push_front(signature.to_string());
        }
        self.entries.get(signature)
    }

    pub fn insert(&mut self, signature: String, executable: Executable) {
        if self.entries.contains_key(&signature) {
            self.lru.retain(|s| *s != signature);
        } else if self.entries.len() >= self.depth {
            if let Some(evicted) = self.lru.pop_back() {
                log::debug!("evicting cached executable: {}", evicted);
                self.entries.remove(&evicted);
            }
        }
        self.lru.push_front(signature.clone());
        self.entries.insert(signature, executable);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.entries.contains_key(signature)
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
