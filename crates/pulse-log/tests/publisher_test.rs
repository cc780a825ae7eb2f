//! Publishing against the in-memory log store.

use chrono::{TimeZone, Utc};
use pulse_log::rdf::{Term, LDP_INBOX, TREE_NODE, TREE_RELATION};
use pulse_log::{
    fragment_url, meta_url, pointer_triple, BackgroundTasks, LogPublisher, LogStore,
    MemoryLogStore, PointerUpdate, ProvenanceRecord, PublishError, PublisherConfig,
    QueryDescriptor,
};
use pulse_types::Resource;
use std::sync::Arc;

const ROOT: &str = "https://pod.example/aggregates/";
const TREE_PATH: &str = "https://saref.etsi.org/core/hasTimestamp";

fn publisher(store: Arc<MemoryLogStore>, pointer_update: PointerUpdate) -> LogPublisher {
    LogPublisher::new(
        store,
        BackgroundTasks::start(),
        PublisherConfig {
            root: ROOT.to_string(),
            tree_path: TREE_PATH.to_string(),
            pointer_update,
        },
    )
}

fn provenance() -> ProvenanceRecord {
    let descriptor = QueryDescriptor {
        query: "SELECT (AVG(?v) AS ?avg) WHERE { ?s ?p ?v }".to_string(),
        stream_name: "https://pod.example/acc-x/".to_string(),
        window_name: "http://example.org/w1".to_string(),
        window_size: 60_000,
        window_slide: 60_000,
        projection_variable: "avg".to_string(),
        focus: "https://saref.etsi.org/core/hasValue".to_string(),
    };
    ProvenanceRecord::new(
        descriptor,
        Utc.timestamp_millis_opt(0).unwrap(),
        Utc.timestamp_millis_opt(60_000).unwrap(),
    )
}

fn batch(timestamps: &[i64]) -> Vec<Resource> {
    timestamps
        .iter()
        .map(|ts| Resource::new(format!("<urn:event:{ts}> <{TREE_PATH}> {ts} ."), *ts))
        .collect()
}

fn inbox_objects(store: &MemoryLogStore) -> Vec<String> {
    store
        .triples(ROOT)
        .into_iter()
        .filter(|t| t.predicate.as_iri() == Some(LDP_INBOX))
        .map(|t| t.object.value().to_string())
        .collect()
}

#[tokio::test]
async fn first_publish_creates_links_and_points_at_fragment() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);

    let report = publisher
        .publish(batch(&[1_000, 2_000, 3_000]), &provenance())
        .await
        .unwrap();

    let fragment = fragment_url(ROOT, 3_000);
    assert_eq!(report.created, vec![fragment.clone()]);
    assert!(report.failed_fragments.is_empty());
    assert_eq!(report.committed.get(&fragment), Some(&3));
    assert_eq!(report.dropped, 0);
    assert_eq!(report.current_fragment.as_deref(), Some(fragment.as_str()));

    assert_eq!(store.members(&fragment).len(), 3);
    let root_triples = store.triples(ROOT);
    assert!(root_triples
        .iter()
        .any(|t| t.predicate.as_iri() == Some(TREE_RELATION) && t.subject == Term::iri(ROOT)));
    assert!(root_triples
        .iter()
        .any(|t| t.predicate.as_iri() == Some(TREE_NODE) && t.object == Term::iri(fragment.clone())));
    assert_eq!(inbox_objects(&store), vec![fragment]);
}

#[tokio::test]
async fn new_fragment_is_annotated_in_background() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);

    publisher
        .publish(batch(&[5_000]), &provenance())
        .await
        .unwrap();
    publisher.tasks().flush().await;

    let meta = meta_url(&fragment_url(ROOT, 5_000));
    assert_eq!(publisher.tasks().completed(), 1);
    assert!(!store.triples(&meta).is_empty());
    assert!(store
        .patches()
        .iter()
        .any(|(target, update)| target == &meta && update.delete.is_empty()));
}

#[tokio::test]
async fn later_batches_reuse_fragments_and_move_pointer() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);
    let first = fragment_url(ROOT, 2_000);

    publisher
        .publish(batch(&[1_000, 2_000]), &provenance())
        .await
        .unwrap();
    let report = publisher
        .publish(batch(&[1_500, 2_000]), &provenance())
        .await
        .unwrap();
    assert!(report.created.is_empty());
    assert_eq!(store.members(&first).len(), 4);

    let report = publisher
        .publish(batch(&[9_000]), &provenance())
        .await
        .unwrap();
    let second = fragment_url(ROOT, 9_000);
    assert_eq!(report.created, vec![second.clone()]);
    assert_eq!(store.members(&second).len(), 1);
    assert_eq!(inbox_objects(&store), vec![second]);
}

#[tokio::test]
async fn failed_fragment_drops_its_bucket() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let fragment = fragment_url(ROOT, 200);
    store.fail_fragment(&fragment);
    let publisher = publisher(store.clone(), PointerUpdate::Combined);

    let report = publisher
        .publish(batch(&[100, 200]), &provenance())
        .await
        .unwrap();

    assert!(report.created.is_empty());
    assert_eq!(report.failed_fragments, vec![fragment]);
    assert_eq!(report.dropped, 2);
    assert!(report.committed.is_empty());
    assert_eq!(report.current_fragment, None);
    assert!(inbox_objects(&store).is_empty());
}

#[tokio::test]
async fn annotation_failure_is_counted_not_raised() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let fragment = fragment_url(ROOT, 700);
    store.fail_patches(&meta_url(&fragment));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);
    let mut failures = publisher.tasks().failures();

    let report = publisher
        .publish(batch(&[700]), &provenance())
        .await
        .unwrap();
    publisher.tasks().flush().await;

    assert_eq!(report.committed.get(&fragment), Some(&1));
    assert_eq!(publisher.tasks().failed(), 1);
    let failure = failures.recv().await.unwrap();
    assert!(failure.task.contains(&fragment));
}

#[tokio::test]
async fn empty_batch_is_an_error() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);

    let err = publisher.publish(Vec::new(), &provenance()).await.unwrap_err();
    assert!(matches!(err, PublishError::EmptyBatch));
    assert!(store.patches().is_empty());
}

async fn stale_pointers_are_replaced(mode: PointerUpdate) {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    store.create_container(&fragment_url(ROOT, 10));
    store.create_container(&fragment_url(ROOT, 20));
    store.seed(
        ROOT,
        vec![
            pointer_triple(ROOT, &fragment_url(ROOT, 10)),
            pointer_triple(ROOT, &fragment_url(ROOT, 20)),
        ],
    );
    let publisher = publisher(store.clone(), mode);

    publisher
        .publish(batch(&[50_000]), &provenance())
        .await
        .unwrap();

    assert_eq!(inbox_objects(&store), vec![fragment_url(ROOT, 50_000)]);
    let metadata = store.read_metadata(ROOT).await.unwrap();
    assert_eq!(
        metadata.current_fragment(),
        Some(fragment_url(ROOT, 50_000).as_str())
    );
}

#[tokio::test]
async fn combined_pointer_update_leaves_single_pointer() {
    stale_pointers_are_replaced(PointerUpdate::Combined).await;
}

#[tokio::test]
async fn split_pointer_update_leaves_single_pointer() {
    stale_pointers_are_replaced(PointerUpdate::Split).await;
}

#[tokio::test]
async fn pointer_update_is_idempotent() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);
    publisher
        .publish(batch(&[1_000]), &provenance())
        .await
        .unwrap();
    publisher.tasks().flush().await;
    let patches_before = store.patches().len();

    let pointer = publisher.update_current_pointer().await.unwrap();

    assert_eq!(pointer, Some(fragment_url(ROOT, 1_000)));
    assert_eq!(store.patches().len(), patches_before);
}

#[tokio::test]
async fn late_batch_keeps_fragment_ranges_disjoint() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);
    let fragment = fragment_url(ROOT, 2_000);

    publisher
        .publish(batch(&[1_500, 2_000]), &provenance())
        .await
        .unwrap();
    let report = publisher
        .publish(batch(&[1_800, 1_900]), &provenance())
        .await
        .unwrap();

    assert!(report.created.is_empty());
    assert_eq!(store.members(&fragment).len(), 4);
    let metadata = store.read_metadata(ROOT).await.unwrap();
    assert_eq!(metadata.relations().len(), 1);
    for ts in [1_500, 1_800, 1_900, 2_000] {
        assert_eq!(metadata.fragment_for(ts).unwrap().fragment_id, fragment);
    }
    assert_eq!(inbox_objects(&store), vec![fragment]);
}

#[tokio::test]
async fn fragment_minted_before_the_log_is_annotated() {
    let store = Arc::new(MemoryLogStore::with_root(ROOT));
    let publisher = publisher(store.clone(), PointerUpdate::Combined);

    publisher
        .publish(batch(&[1_000]), &provenance())
        .await
        .unwrap();
    let report = publisher
        .publish(batch(&[500]), &provenance())
        .await
        .unwrap();
    publisher.tasks().flush().await;

    let early = fragment_url(ROOT, 500);
    assert_eq!(report.created, vec![early.clone()]);
    assert_eq!(publisher.tasks().completed(), 2);
    assert!(!store.triples(&meta_url(&early)).is_empty());
    assert_eq!(inbox_objects(&store), vec![fragment_url(ROOT, 1_000)]);
}
