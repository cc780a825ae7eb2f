//! Timestamp extraction from serialized resources.

use crate::metadata::parse_timestamp;
use pulse_types::Resource;
use rio_api::model::{Literal, Term};
use rio_api::parser::TriplesParser;
use rio_turtle::{TurtleError, TurtleParser};

/// Reads the logical timestamp of a serialized resource.
pub trait TimestampExtractor: Send + Sync {
    /// Epoch milliseconds, or `None` when the body carries no timestamp.
    fn extract(&self, body: &str) -> Option<i64>;

    /// Wraps `body` into a [`Resource`] when a timestamp can be extracted.
    fn resource(&self, body: &str) -> Option<Resource> {
        self.extract(body).map(|ts| Resource::new(body, ts))
    }
}

/// Reads the object of the configured temporal predicate from a Turtle (or
/// N-Triples) body.
#[derive(Debug, Clone)]
pub struct TreePathExtractor {
    tree_path: String,
}

impl TreePathExtractor {
    pub fn new(tree_path: impl Into<String>) -> Self {
        Self {
            tree_path: tree_path.into(),
        }
    }

    pub fn tree_path(&self) -> &str {
        &self.tree_path
    }
}

impl TimestampExtractor for TreePathExtractor {
    fn extract(&self, body: &str) -> Option<i64> {
        let mut found = None;
        let mut parser = TurtleParser::new(body.as_bytes(), None);
        let parsed = parser.parse_all(&mut |triple| {
            if found.is_none() && triple.predicate.iri == self.tree_path {
                if let Term::Literal(literal) = triple.object {
                    found = parse_timestamp(literal_value(&literal));
                }
            }
            Ok::<(), TurtleError>(())
        });
        if let Err(e) = parsed {
            if found.is_none() {
                tracing::debug!("resource body is not turtle: {}", e);
            }
        }
        found
    }
}

fn literal_value<'a>(literal: &Literal<'a>) -> &'a str {
    match *literal {
        Literal::Simple { value }
        | Literal::LanguageTaggedString { value, .. }
        | Literal::Typed { value, .. } => value,
    }
}
