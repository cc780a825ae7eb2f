//! Bucketing of produced resources into time-partitioned fragments.
//!
//! Planning is pure: it reads a metadata snapshot and decides which
//! fragment every resource belongs to and which fragments must be created.
//! Materializing those fragments is the publisher's job.

use crate::error::PublishError;
use crate::metadata::{fragment_url, LogMetadata};
use pulse_types::Resource;
use std::collections::BTreeMap;

/// A fragment the plan needs that is not linked in the metadata yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFragment {
    pub fragment_id: String,
    /// Timestamp the fragment is named after.
    pub timestamp: i64,
    pub lower_bound: i64,
    /// Whether the fragment gets a provenance annotation once created.
    pub annotate: bool,
}

/// Outcome of bucketing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketPlan {
    /// Fragment URI → resources, non-empty buckets only.
    pub buckets: BTreeMap<String, Vec<Resource>>,
    /// Fragments to materialize and link before committing, in order.
    pub new_fragments: Vec<NewFragment>,
    /// Earliest timestamp among resources no existing fragment covered.
    pub watermark: Option<i64>,
}

/// Buckets `batch` against `metadata`.
///
/// The batch is sorted by timestamp first, so its last element is the
/// newest. That element names the representative fragment
/// `<root><timestamp>/`. When that fragment is not linked yet, it takes every
/// resource newer than anything a linked fragment may hold (see
/// [`LogMetadata::newest_linked_time`]) and is minted with
/// the earliest of their timestamps as its lower bound. All other resources
/// go to the linked fragment with the greatest lower bound at or before their
/// timestamp. Resources older than every fragment are unplaced; they get a
/// fragment of their own at the watermark, annotated only when it is the
/// representative fragment.
pub fn plan_buckets(
    metadata: &LogMetadata,
    mut batch: Vec<Resource>,
) -> Result<BucketPlan, PublishError> {
    batch.sort_by_key(|r| r.timestamp);
    let representative = batch.last().ok_or(PublishError::EmptyBatch)?.timestamp;
    let target = fragment_url(&metadata.root, representative);
    let target_is_new = !metadata.contains(&target);
    let newest_linked = metadata.newest_linked_time();

    let mut plan = BucketPlan::default();
    let mut fresh = Vec::new();
    let mut unplaced = Vec::new();

    for resource in batch {
        if target_is_new && newest_linked.map_or(true, |newest| resource.timestamp > newest) {
            fresh.push(resource);
            continue;
        }
        match metadata.fragment_for(resource.timestamp) {
            Some(relation) => plan
                .buckets
                .entry(relation.fragment_id.clone())
                .or_default()
                .push(resource),
            None => unplaced.push(resource),
        }
    }

    if let Some(lower_bound) = fresh.iter().map(|r| r.timestamp).min() {
        plan.new_fragments.push(NewFragment {
            fragment_id: target.clone(),
            timestamp: representative,
            lower_bound,
            annotate: true,
        });
        plan.buckets.insert(target.clone(), fresh);
    }

    if let Some(watermark) = unplaced.iter().map(|r| r.timestamp).min() {
        let fragment_id = fragment_url(&metadata.root, watermark);
        if !plan.new_fragments.iter().any(|f| f.fragment_id == fragment_id) {
            plan.new_fragments.push(NewFragment {
                fragment_id: fragment_id.clone(),
                timestamp: watermark,
                lower_bound: watermark,
                annotate: fragment_id == target,
            });
        }
        plan.buckets.entry(fragment_id).or_default().extend(unplaced);
        plan.watermark = Some(watermark);
    }

    Ok(plan)
}
