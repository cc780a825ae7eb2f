//! Log root metadata: fragment relations and the current-fragment pointer.

use crate::rdf::{
    Term, Triple, LDP_INBOX, RDF_TYPE, TREE_GTE_RELATION, TREE_NODE, TREE_PATH, TREE_RELATION,
    TREE_VALUE, XSD_DATE_TIME,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

/// A fragment and the earliest timestamp it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub fragment_id: String,
    /// Lower bound in epoch milliseconds (inclusive).
    pub lower_bound: i64,
}

impl Relation {
    pub fn new(fragment_id: impl Into<String>, lower_bound: i64) -> Self {
        Self {
            fragment_id: fragment_id.into(),
            lower_bound,
        }
    }
}

/// Snapshot of a log root's descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMetadata {
    /// The log root container, always ending in `/`.
    pub root: String,
    /// Relations sorted by ascending lower bound.
    relations: Vec<Relation>,
    /// Every current-fragment link found on the root, in document order.
    pub current_pointers: Vec<String>,
}

impl LogMetadata {
    pub fn new(root: &str) -> Self {
        Self {
            root: container(root),
            relations: Vec::new(),
            current_pointers: Vec::new(),
        }
    }

    /// Builds metadata from the triples of the root document.
    ///
    /// A relation without a readable `tree:value` falls back to the
    /// timestamp suffix of its node. Relations with neither are skipped.
    pub fn from_triples(root: &str, triples: &[Triple]) -> Self {
        let mut metadata = Self::new(root);
        let root_term = Term::iri(metadata.root.clone());

        let mut nodes: HashMap<&Term, &str> = HashMap::new();
        let mut values: HashMap<&Term, &str> = HashMap::new();
        let mut relation_subjects = Vec::new();

        for triple in triples {
            match triple.predicate.value() {
                TREE_RELATION if triple.subject == root_term => {
                    relation_subjects.push(&triple.object);
                }
                TREE_NODE => {
                    if let Some(node) = triple.object.as_iri() {
                        nodes.insert(&triple.subject, node);
                    }
                }
                TREE_VALUE => {
                    values.insert(&triple.subject, triple.object.value());
                }
                LDP_INBOX if triple.subject == root_term => {
                    if let Some(pointer) = triple.object.as_iri() {
                        metadata.current_pointers.push(pointer.to_string());
                    }
                }
                _ => {}
            }
        }

        for subject in relation_subjects {
            let Some(node) = nodes.get(subject) else {
                continue;
            };
            let lower_bound = values
                .get(subject)
                .and_then(|v| parse_timestamp(v))
                .or_else(|| timestamp_suffix(node));
            if let Some(lower_bound) = lower_bound {
                metadata.insert_relation(Relation::new(*node, lower_bound));
            }
        }

        metadata
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    /// Adds a relation, keeping the set sorted and unique by fragment.
    pub fn insert_relation(&mut self, relation: Relation) {
        if self.contains(&relation.fragment_id) {
            return;
        }
        let at = self
            .relations
            .partition_point(|r| r.lower_bound <= relation.lower_bound);
        self.relations.insert(at, relation);
    }

    pub fn contains(&self, fragment_id: &str) -> bool {
        self.relations.iter().any(|r| r.fragment_id == fragment_id)
    }

    /// The relation with the greatest lower bound at or before `timestamp`.
    pub fn fragment_for(&self, timestamp: i64) -> Option<&Relation> {
        self.relations
            .iter()
            .rev()
            .find(|r| r.lower_bound <= timestamp)
    }

    /// The greatest lower bound in the log, if any.
    pub fn max_lower_bound(&self) -> Option<i64> {
        self.relations.last().map(|r| r.lower_bound)
    }

    /// The newest time any linked fragment may already hold: the greatest of
    /// every lower bound and every timestamp a fragment is named after.
    pub fn newest_linked_time(&self) -> Option<i64> {
        self.relations
            .iter()
            .flat_map(|r| [Some(r.lower_bound), timestamp_suffix(&r.fragment_id)])
            .flatten()
            .max()
    }

    /// The current fragment, when exactly one pointer is present.
    pub fn current_fragment(&self) -> Option<&str> {
        match self.current_pointers.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// The linked fragment with the greatest numeric timestamp suffix.
    pub fn latest_fragment(&self) -> Option<&str> {
        self.relations
            .iter()
            .map(|r| r.fragment_id.as_str())
            .filter_map(|f| timestamp_suffix(f).map(|ts| (ts, f)))
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, f)| f)
    }
}

/// Returns `uri` with exactly one trailing slash.
pub fn container(uri: &str) -> String {
    format!("{}/", uri.trim_end_matches('/'))
}

/// Fragment identity for a timestamp: `<root><millis>/`.
pub fn fragment_url(root: &str, timestamp: i64) -> String {
    format!("{}{}/", container(root), timestamp)
}

/// Metadata sidecar of a fragment container.
pub fn meta_url(fragment: &str) -> String {
    format!("{fragment}.meta")
}

/// Numeric last path segment: `https://ex/log/1700000000000/` → `1700000000000`.
pub fn timestamp_suffix(uri: &str) -> Option<i64> {
    uri.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Parses an RFC 3339 date or integer epoch milliseconds.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    value.parse::<i64>().ok().or_else(|| {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|t| t.timestamp_millis())
    })
}

/// Formats epoch milliseconds as an `xsd:dateTime` lexical value.
pub fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| millis.to_string())
}

/// Triples linking `relation` into the root descriptor.
pub fn relation_triples(root: &str, relation: &Relation, tree_path: &str) -> Vec<Triple> {
    let root = Term::iri(container(root));
    let label = timestamp_suffix(&relation.fragment_id).unwrap_or(relation.lower_bound);
    let node = Term::blank(format!("r{label}"));
    vec![
        Triple::new(root, TREE_RELATION, node.clone()),
        Triple::new(node.clone(), RDF_TYPE, Term::iri(TREE_GTE_RELATION)),
        Triple::new(
            node.clone(),
            TREE_NODE,
            Term::iri(relation.fragment_id.clone()),
        ),
        Triple::new(node.clone(), TREE_PATH, Term::iri(tree_path)),
        Triple::new(
            node,
            TREE_VALUE,
            Term::typed(format_timestamp(relation.lower_bound), XSD_DATE_TIME),
        ),
    ]
}

/// `<root> ldp:inbox <fragment>`.
pub fn pointer_triple(root: &str, fragment: &str) -> Triple {
    Triple::new(Term::iri(container(root)), LDP_INBOX, Term::iri(fragment))
}
