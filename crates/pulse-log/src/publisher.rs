//! Publishing produced resources into the fragmented log.
//!
//! A publish reads the root metadata, plans buckets, materializes and links
//! the fragments the plan needs, commits every bucket, and finally points the
//! root at the newest fragment. Provenance annotations of new fragments run
//! on the background task queue.

use crate::assign::{plan_buckets, NewFragment};
use crate::error::{PublishError, StoreError};
use crate::metadata::{
    container, meta_url, pointer_triple, relation_triples, LogMetadata, Relation,
};
use crate::provenance::ProvenanceRecord;
use crate::rdf::UpdateRequest;
use crate::store::LogStore;
use crate::tasks::BackgroundTasks;
use chrono::Utc;
use pulse_types::Resource;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Patch statuses that count as a successful annotation.
const ANNOTATION_OK: [u16; 3] = [200, 201, 205];

/// How the current-fragment pointer is swapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerUpdate {
    /// One patch carrying both the delete and the insert.
    #[default]
    Combined,
    /// A delete patch followed by an insert patch.
    Split,
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// The log root container.
    pub root: String,
    /// Temporal property fragments are ordered by.
    pub tree_path: String,
    pub pointer_update: PointerUpdate,
}

/// What a publish did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Fragments materialized and linked by this publish.
    pub created: Vec<String>,
    /// Fragments that could not be materialized.
    pub failed_fragments: Vec<String>,
    /// Fragment → number of resources written.
    pub committed: BTreeMap<String, usize>,
    /// Resources that were not written.
    pub dropped: usize,
    /// The current-fragment pointer after the publish, if it was updated.
    pub current_fragment: Option<String>,
}

/// Result of writing buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: BTreeMap<String, usize>,
    pub failed: usize,
}

/// Publishes batches into one log.
///
/// Commits are serialized per publisher; a single publisher per log is
/// assumed across processes.
pub struct LogPublisher {
    store: Arc<dyn LogStore>,
    tasks: BackgroundTasks,
    config: PublisherConfig,
    commit_lock: Mutex<()>,
}

impl LogPublisher {
    pub fn new(store: Arc<dyn LogStore>, tasks: BackgroundTasks, mut config: PublisherConfig) -> Self {
        config.root = container(&config.root);
        Self {
            store,
            tasks,
            config,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &str {
        &self.config.root
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    /// Publishes one batch of produced resources.
    ///
    /// Only an empty batch or an unreadable root aborts the publish. Every
    /// other failure is logged and shows up in the report.
    pub async fn publish(
        &self,
        batch: Vec<Resource>,
        provenance: &ProvenanceRecord,
    ) -> Result<PublishReport, PublishError> {
        if batch.is_empty() {
            return Err(PublishError::EmptyBatch);
        }
        let _guard = self.commit_lock.lock().await;

        let metadata = self.store.read_metadata(&self.config.root).await?;
        let mut plan = plan_buckets(&metadata, batch)?;
        let mut report = PublishReport::default();

        for fragment in &plan.new_fragments {
            match self.materialize(&metadata, fragment).await {
                Ok(()) => {
                    tracing::info!(
                        fragment = %fragment.fragment_id,
                        lower_bound = fragment.lower_bound,
                        "fragment created"
                    );
                    report.created.push(fragment.fragment_id.clone());
                    if fragment.annotate {
                        self.annotate(&fragment.fragment_id, provenance);
                    }
                }
                Err(e) => {
                    let lost = plan
                        .buckets
                        .remove(&fragment.fragment_id)
                        .map_or(0, |b| b.len());
                    tracing::error!(
                        fragment = %fragment.fragment_id,
                        resources = lost,
                        "fragment materialization failed, resources unpublished: {}",
                        e
                    );
                    report.dropped += lost;
                    report.failed_fragments.push(fragment.fragment_id.clone());
                }
            }
        }

        let outcome = self.commit_buckets(plan.buckets).await;
        report.committed = outcome.committed;
        report.dropped += outcome.failed;

        match self.update_current_pointer().await {
            Ok(pointer) => report.current_fragment = pointer,
            Err(e) => {
                tracing::error!(root = %self.config.root, "current fragment pointer update failed: {}", e);
            }
        }

        Ok(report)
    }

    /// Creates the fragment container if needed and links it into the root.
    async fn materialize(
        &self,
        metadata: &LogMetadata,
        fragment: &NewFragment,
    ) -> Result<(), StoreError> {
        if !self.store.exists(&fragment.fragment_id).await? {
            self.store
                .new_fragment(&self.config.root, fragment.timestamp)
                .await?;
        }
        if !metadata.contains(&fragment.fragment_id) {
            let relation = Relation::new(fragment.fragment_id.clone(), fragment.lower_bound);
            let update = UpdateRequest::insert(relation_triples(
                &self.config.root,
                &relation,
                &self.config.tree_path,
            ));
            self.store.patch(&self.config.root, &update).await?;
        }
        Ok(())
    }

    /// Queues an insert-only patch of the provenance description against the
    /// fragment's metadata sidecar. Never blocks the caller.
    pub fn annotate(&self, fragment: &str, record: &ProvenanceRecord) {
        let target = meta_url(fragment);
        let update = UpdateRequest::insert(record.to_triples(Utc::now()));
        let store = self.store.clone();
        let task = format!("annotate {fragment}");

        self.tasks.submit(task, async move {
            match store.patch(&target, &update).await {
                Ok(status) if ANNOTATION_OK.contains(&status) => {
                    tracing::debug!(document = %target, "fragment metadata annotated");
                    Ok(())
                }
                Ok(status) => {
                    tracing::warn!(document = %target, status, "fragment metadata patch returned unexpected status");
                    Ok(())
                }
                Err(e) => Err(format!("metadata patch of {target} failed: {e}")),
            }
        });
    }

    /// Writes every bucket's resources into its fragment.
    pub async fn commit_buckets(&self, buckets: BTreeMap<String, Vec<Resource>>) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();
        for (fragment, resources) in buckets {
            let mut written = 0;
            for resource in &resources {
                match self.store.append(&fragment, resource).await {
                    Ok(location) => {
                        tracing::debug!(fragment = %fragment, location = %location, "resource committed");
                        written += 1;
                    }
                    Err(e) => {
                        tracing::error!(fragment = %fragment, "failed to commit resource: {}", e);
                        outcome.failed += 1;
                    }
                }
            }
            if written > 0 {
                outcome.committed.insert(fragment, written);
            }
        }
        outcome
    }

    /// Points the root at the fragment with the greatest timestamp suffix.
    ///
    /// Every existing pointer is retracted before the new one is inserted.
    /// Returns the pointer in place afterwards, or `None` for an empty log.
    pub async fn update_current_pointer(&self) -> Result<Option<String>, StoreError> {
        let root = &self.config.root;
        let metadata = self.store.read_metadata(root).await?;
        let Some(latest) = metadata.latest_fragment().map(str::to_string) else {
            return Ok(None);
        };
        if metadata.current_fragment() == Some(latest.as_str()) {
            return Ok(Some(latest));
        }

        let delete = metadata
            .current_pointers
            .iter()
            .map(|pointer| pointer_triple(root, pointer))
            .collect::<Vec<_>>();
        let insert = vec![pointer_triple(root, &latest)];

        match self.config.pointer_update {
            PointerUpdate::Combined => {
                self.store
                    .patch(root, &UpdateRequest { delete, insert })
                    .await?;
            }
            PointerUpdate::Split => {
                if !delete.is_empty() {
                    self.store.patch(root, &UpdateRequest::delete(delete)).await?;
                }
                self.store.patch(root, &UpdateRequest::insert(insert)).await?;
            }
        }

        tracing::info!(root = %root, fragment = %latest, "current fragment pointer updated");
        Ok(Some(latest))
    }
}
