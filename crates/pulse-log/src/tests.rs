//! Unit tests for fragment bucketing.

use pulse_types::Resource;

use crate::assign::plan_buckets;
use crate::error::PublishError;
use crate::metadata::{fragment_url, LogMetadata, Relation};

const ROOT: &str = "https://ex/aggregates/";

fn metadata_with(bounds: &[i64]) -> LogMetadata {
    let mut metadata = LogMetadata::new(ROOT);
    for bound in bounds {
        metadata.insert_relation(Relation::new(fragment_url(ROOT, *bound), *bound));
    }
    metadata
}

fn batch(timestamps: &[i64]) -> Vec<Resource> {
    timestamps
        .iter()
        .map(|ts| Resource::new(format!("event-{ts}"), *ts))
        .collect()
}

fn bodies(resources: &[Resource]) -> Vec<&str> {
    resources.iter().map(|r| r.body.as_str()).collect()
}

// ── Empty log ────────────────────────────────────────────────────────

#[test]
fn empty_batch_is_rejected() {
    let err = plan_buckets(&metadata_with(&[]), Vec::new()).unwrap_err();
    assert!(matches!(err, PublishError::EmptyBatch));
}

#[test]
fn first_batch_mints_fragment_named_after_last_resource() {
    let plan = plan_buckets(&metadata_with(&[]), batch(&[100, 200, 300])).unwrap();

    let target = fragment_url(ROOT, 300);
    assert_eq!(plan.new_fragments.len(), 1);
    assert_eq!(plan.new_fragments[0].fragment_id, target);
    assert_eq!(plan.new_fragments[0].lower_bound, 100);
    assert!(plan.new_fragments[0].annotate);
    assert_eq!(plan.buckets.len(), 1);
    assert_eq!(bodies(&plan.buckets[&target]), vec!["event-100", "event-200", "event-300"]);
    assert_eq!(plan.watermark, None);
}

// ── Existing fragments ───────────────────────────────────────────────

#[test]
fn newer_batch_gets_its_own_fragment() {
    let plan = plan_buckets(&metadata_with(&[100]), batch(&[400, 500])).unwrap();

    let target = fragment_url(ROOT, 500);
    assert_eq!(plan.new_fragments.len(), 1);
    assert_eq!(plan.new_fragments[0].lower_bound, 400);
    assert_eq!(bodies(&plan.buckets[&target]), vec!["event-400", "event-500"]);
}

#[test]
fn late_resources_go_to_best_fitting_fragment() {
    let plan = plan_buckets(&metadata_with(&[100, 300]), batch(&[150, 320, 900])).unwrap();

    assert_eq!(bodies(&plan.buckets[&fragment_url(ROOT, 100)]), vec!["event-150"]);
    assert_eq!(bodies(&plan.buckets[&fragment_url(ROOT, 900)]), vec!["event-320", "event-900"]);
    assert!(!plan.buckets.contains_key(&fragment_url(ROOT, 300)));
}

#[test]
fn existing_target_buckets_by_lower_bound() {
    let plan = plan_buckets(&metadata_with(&[100, 300]), batch(&[120, 300])).unwrap();

    assert!(plan.new_fragments.is_empty());
    assert_eq!(bodies(&plan.buckets[&fragment_url(ROOT, 100)]), vec!["event-120"]);
    assert_eq!(bodies(&plan.buckets[&fragment_url(ROOT, 300)]), vec!["event-300"]);
}

#[test]
fn batch_before_every_fragment_is_placed_at_watermark() {
    let plan = plan_buckets(&metadata_with(&[1_000, 2_000]), batch(&[40, 10, 30])).unwrap();

    let watermark_fragment = fragment_url(ROOT, 10);
    assert_eq!(plan.watermark, Some(10));
    assert_eq!(plan.new_fragments.len(), 1);
    assert_eq!(plan.new_fragments[0].fragment_id, watermark_fragment);
    assert!(plan.new_fragments[0].lower_bound <= 40);
    assert!(!plan.new_fragments[0].annotate);
    assert_eq!(plan.buckets.len(), 1);
    assert_eq!(
        bodies(&plan.buckets[&watermark_fragment]),
        vec!["event-10", "event-30", "event-40"]
    );
}

#[test]
fn every_resource_lands_in_exactly_one_bucket() {
    let timestamps = [5, 150, 250, 260, 999, 1_500];
    let plan = plan_buckets(&metadata_with(&[100, 200]), batch(&timestamps)).unwrap();

    let mut placed: Vec<i64> = plan
        .buckets
        .values()
        .flatten()
        .map(|r| r.timestamp)
        .collect();
    placed.sort();
    assert_eq!(placed, timestamps);
    assert!(plan.buckets.values().all(|b| !b.is_empty()));
}

// ── Late batches ─────────────────────────────────────────────────────

#[test]
fn late_batch_inside_named_range_reuses_fragment() {
    let mut metadata = LogMetadata::new(ROOT);
    metadata.insert_relation(Relation::new(fragment_url(ROOT, 2_000), 1_500));

    let plan = plan_buckets(&metadata, batch(&[1_800, 1_900])).unwrap();

    assert!(plan.new_fragments.is_empty());
    assert_eq!(plan.buckets.len(), 1);
    assert_eq!(
        bodies(&plan.buckets[&fragment_url(ROOT, 2_000)]),
        vec!["event-1800", "event-1900"]
    );
}

#[test]
fn single_resource_before_log_annotates_its_fragment() {
    let plan = plan_buckets(&metadata_with(&[1_000]), batch(&[500])).unwrap();

    assert_eq!(plan.watermark, Some(500));
    assert_eq!(plan.new_fragments.len(), 1);
    assert_eq!(plan.new_fragments[0].fragment_id, fragment_url(ROOT, 500));
    assert!(plan.new_fragments[0].annotate);
}
