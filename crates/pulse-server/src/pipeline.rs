//! Bridge from relayed events on the bus into the log publisher.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pulse_bus::EventBus;
use pulse_log::{LogPublisher, ProvenanceRecord, QueryDescriptor, TimestampExtractor};
use pulse_types::Resource;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A batch of produced resources and the query execution that produced it.
#[derive(Debug, Clone)]
pub struct Batch {
    pub resources: Vec<Resource>,
    pub provenance: ProvenanceRecord,
}

/// Turns relayed events into publishable batches.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Consumes one event from `topic`. Returns a batch when one is ready.
    async fn ingest(&self, topic: &str, payload: &str) -> Option<Batch>;
}

/// Republishes every timestamped event as a one-element batch.
pub struct PassthroughAggregator {
    extractor: Box<dyn TimestampExtractor>,
    query: QueryDescriptor,
}

impl PassthroughAggregator {
    pub fn new(extractor: Box<dyn TimestampExtractor>, query: QueryDescriptor) -> Self {
        Self { extractor, query }
    }
}

#[async_trait]
impl Aggregator for PassthroughAggregator {
    async fn ingest(&self, topic: &str, payload: &str) -> Option<Batch> {
        let Some(resource) = self.extractor.resource(payload) else {
            tracing::warn!(topic, "event without timestamp skipped");
            return None;
        };
        let end = resource.time().unwrap_or_else(Utc::now);
        let width = i64::try_from(self.query.window_size).unwrap_or(i64::MAX);
        let start = end - Duration::try_milliseconds(width).unwrap_or_else(Duration::zero);
        Some(Batch {
            resources: vec![resource],
            provenance: ProvenanceRecord::new(self.query.clone(), start, end),
        })
    }
}

/// Subscribes to `topics` and publishes whatever `aggregator` produces.
///
/// One task per topic; each runs until its subscription closes.
pub fn spawn(
    bus: &EventBus,
    topics: &[String],
    aggregator: Arc<dyn Aggregator>,
    publisher: Arc<LogPublisher>,
) -> Vec<JoinHandle<()>> {
    topics
        .iter()
        .map(|topic| {
            let mut subscription = bus.subscribe(topic.clone());
            let aggregator = aggregator.clone();
            let publisher = publisher.clone();
            tracing::info!(topic = %topic, root = publisher.root(), "pipeline subscribed");

            tokio::spawn(async move {
                while let Some(payload) = subscription.recv().await {
                    let Some(batch) = aggregator.ingest(&subscription.topic, &payload).await
                    else {
                        continue;
                    };
                    match publisher.publish(batch.resources, &batch.provenance).await {
                        Ok(report) => {
                            tracing::info!(
                                topic = %subscription.topic,
                                created = report.created.len(),
                                dropped = report.dropped,
                                "batch published"
                            );
                        }
                        Err(e) => {
                            tracing::error!(topic = %subscription.topic, "batch publish failed: {}", e);
                        }
                    }
                }
                tracing::debug!(topic = %subscription.topic, "pipeline subscription closed");
            })
        })
        .collect()
}
