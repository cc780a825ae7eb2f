//! Fragmented, time-partitioned event log publishing for the Pulse relay.
//!
//! A log is a root container whose descriptor lists fragments (one container
//! per time range) and a single current-fragment pointer. Produced resources
//! are bucketed into fragments by timestamp, new fragments are created and
//! linked on demand, and the pointer is moved to the newest fragment after
//! every commit.
//!
//! # Fragment layout
//!
//! | Item | Form |
//! |------|------|
//! | fragment | `<root><millis>/`, named after the newest resource that minted it |
//! | relation | `<root> tree:relation _:r` with `tree:node`, `tree:path`, `tree:value` |
//! | pointer | `<root> ldp:inbox <fragment>` |
//! | provenance | `INSERT DATA` patch on `<fragment>.meta` |
//!
//! # Usage
//!
//! ```rust,ignore
//! let publisher = LogPublisher::new(store, BackgroundTasks::start(), config);
//! let report = publisher.publish(batch, &provenance).await?;
//! ```

mod assign;
mod error;
mod extract;
mod memory;
mod metadata;
mod provenance;
mod publisher;
pub mod rdf;
mod store;
mod tasks;

pub use assign::{plan_buckets, BucketPlan, NewFragment};
pub use error::{PublishError, RdfError, StoreError};
pub use extract::{TimestampExtractor, TreePathExtractor};
pub use memory::MemoryLogStore;
pub use metadata::{
    fragment_url, meta_url, parse_timestamp, pointer_triple, relation_triples, timestamp_suffix,
    LogMetadata, Relation,
};
pub use provenance::{ProvenanceRecord, QueryDescriptor};
pub use publisher::{CommitOutcome, LogPublisher, PointerUpdate, PublishReport, PublisherConfig};
pub use store::{LdpLogStore, LogStore};
pub use tasks::{BackgroundTasks, TaskFailure};

#[cfg(test)]
mod tests;
