//! In-process [`LogStore`] for tests and local development.

use crate::error::StoreError;
use crate::metadata::{container, fragment_url, meta_url, LogMetadata};
use crate::rdf::{Triple, UpdateRequest};
use crate::store::LogStore;
use async_trait::async_trait;
use pulse_types::Resource;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    /// Container URI → member URIs, in append order.
    containers: BTreeMap<String, Vec<String>>,
    /// Member URI → body.
    bodies: HashMap<String, String>,
    /// Document URI (container or `.meta` sidecar) → triples.
    graphs: HashMap<String, Vec<Triple>>,
    failing_fragments: HashSet<String>,
    failing_patches: HashSet<String>,
    patches: Vec<(String, UpdateRequest)>,
    next_member: u64,
}

/// Log store kept entirely in memory.
///
/// Patches are applied structurally; failures can be injected per fragment
/// or per patch target.
#[derive(Default)]
pub struct MemoryLogStore {
    state: Mutex<State>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding an empty log at `root`.
    pub fn with_root(root: &str) -> Self {
        let store = Self::new();
        store.lock().containers.insert(container(root), Vec::new());
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Makes `new_fragment` fail for this fragment URI.
    pub fn fail_fragment(&self, fragment: &str) {
        self.lock().failing_fragments.insert(fragment.to_string());
    }

    /// Makes `patch` fail for this target URI.
    pub fn fail_patches(&self, target: &str) {
        self.lock().failing_patches.insert(target.to_string());
    }

    /// Creates a container without touching any descriptor.
    pub fn create_container(&self, uri: &str) {
        self.lock()
            .containers
            .entry(container(uri))
            .or_default();
    }

    /// Adds triples to a document without recording a patch.
    pub fn seed(&self, document: &str, triples: Vec<Triple>) {
        self.lock()
            .graphs
            .entry(document.to_string())
            .or_default()
            .extend(triples);
    }

    /// Bodies appended to `fragment`, in order.
    pub fn members(&self, fragment: &str) -> Vec<String> {
        let state = self.lock();
        state
            .containers
            .get(fragment)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| state.bodies.get(m).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every container URI, sorted.
    pub fn containers(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// Current triples of a document.
    pub fn triples(&self, document: &str) -> Vec<Triple> {
        self.lock().graphs.get(document).cloned().unwrap_or_default()
    }

    /// Applied patches as `(target, update)`, in order.
    pub fn patches(&self) -> Vec<(String, UpdateRequest)> {
        self.lock().patches.clone()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn read_metadata(&self, root: &str) -> Result<LogMetadata, StoreError> {
        let root = container(root);
        let state = self.lock();
        if !state.containers.contains_key(&root) {
            return Err(StoreError::NotFound(root));
        }
        let triples = state.graphs.get(&root).cloned().unwrap_or_default();
        Ok(LogMetadata::from_triples(&root, &triples))
    }

    async fn exists(&self, uri: &str) -> Result<bool, StoreError> {
        let state = self.lock();
        Ok(state.containers.contains_key(uri) || state.bodies.contains_key(uri))
    }

    async fn new_fragment(&self, root: &str, timestamp: i64) -> Result<String, StoreError> {
        let fragment = fragment_url(root, timestamp);
        let mut state = self.lock();
        if state.failing_fragments.contains(&fragment) {
            return Err(StoreError::Status {
                uri: fragment,
                status: 500,
            });
        }
        state.containers.entry(fragment.clone()).or_default();
        Ok(fragment)
    }

    async fn patch(&self, target: &str, update: &UpdateRequest) -> Result<u16, StoreError> {
        let mut state = self.lock();
        if state.failing_patches.contains(target) {
            return Err(StoreError::Status {
                uri: target.to_string(),
                status: 500,
            });
        }
        let known = state.containers.contains_key(target)
            || state
                .containers
                .keys()
                .any(|c| meta_url(c) == target);
        if !known {
            return Err(StoreError::NotFound(target.to_string()));
        }

        let graph = state.graphs.entry(target.to_string()).or_default();
        graph.retain(|t| !update.delete.contains(t));
        for triple in &update.insert {
            if !graph.contains(triple) {
                graph.push(triple.clone());
            }
        }
        state.patches.push((target.to_string(), update.clone()));
        Ok(205)
    }

    async fn append(&self, fragment: &str, resource: &Resource) -> Result<String, StoreError> {
        let mut state = self.lock();
        if !state.containers.contains_key(fragment) {
            return Err(StoreError::NotFound(fragment.to_string()));
        }
        state.next_member += 1;
        let location = format!("{}{}", fragment, state.next_member);
        state.bodies.insert(location.clone(), resource.body.clone());
        if let Some(members) = state.containers.get_mut(fragment) {
            members.push(location.clone());
        }
        Ok(location)
    }
}
