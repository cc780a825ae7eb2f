//! Function Ontology description of the query that produced a fragment.

use crate::metadata::format_timestamp;
use crate::rdf::{Term, Triple, RDF_TYPE, XSD_DATE_TIME, XSD_INTEGER};
use chrono::{DateTime, Utc};
use serde::Deserialize;

const FNO: &str = "https://w3id.org/function/ontology#";
const FNO_W3ID: &str = "http://w3id.org/function/ontology#";
const EX: &str = "http://example.org/";
const EX_WWW: &str = "http://www.example.org/";
const DCT_DESCRIPTION: &str = "http://purl.org/dc/terms/description";
const VOCALS_REGISTERED_STREAMS: &str = "http://w3id.org/rsp/vocals-sd#registeredStreams";
const SAO_STREAM_DATA: &str = "http://purl.oclc.org/NET/UNIS/sao/sao#StreamData";
const ASDO_PARAMETERS: &str = "http://argahsuknesib.github.io/asdo/parameters/";

/// Static description of a continuous aggregation query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryDescriptor {
    /// The query text.
    pub query: String,
    /// The stream the query is registered on.
    pub stream_name: String,
    /// IRI of the window.
    pub window_name: String,
    /// Window width in milliseconds.
    pub window_size: u64,
    /// Window slide in milliseconds.
    pub window_slide: u64,
    /// The projected variable.
    pub projection_variable: String,
    /// IRI of the aggregated property.
    pub focus: String,
}

/// A descriptor plus the time window of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceRecord {
    pub descriptor: QueryDescriptor,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ProvenanceRecord {
    pub fn new(
        descriptor: QueryDescriptor,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            descriptor,
            start_time,
            end_time,
        }
    }

    /// Renders the description with a fresh query identifier.
    pub fn to_triples(&self, executed_at: DateTime<Utc>) -> Vec<Triple> {
        let query_id = format!("{EX}aggregation_query/{}", uuid::Uuid::new_v4());
        self.triples_with_id(&query_id, executed_at)
    }

    pub(crate) fn triples_with_id(&self, query_id: &str, executed_at: DateTime<Utc>) -> Vec<Triple> {
        let d = &self.descriptor;
        let execution = Term::iri(format!("{EX}aggregation_function_execution"));
        let function = Term::iri(format!("{EX}aggregation_function"));
        let output = Term::iri(format!("{EX}aggregation_result_stream"));
        let problem = Term::iri(format!("{EX}continuous_monitoring_with_solid"));
        let query = Term::iri(query_id);
        let date = |t: &DateTime<Utc>| Term::typed(format_timestamp(t.timestamp_millis()), XSD_DATE_TIME);
        let integer = |n: i64| Term::typed(n.to_string(), XSD_INTEGER);
        let fno = |local: &str| format!("{FNO}{local}");
        let fno_w3id = |local: &str| format!("{FNO_W3ID}{local}");

        let mut triples = vec![
            Triple::new(execution.clone(), RDF_TYPE, Term::iri(fno("Execution"))),
            Triple::new(execution.clone(), &fno("executes"), function.clone()),
            Triple::new(
                execution.clone(),
                &format!("{EX}aggregation_start_time"),
                date(&self.start_time),
            ),
            Triple::new(
                execution.clone(),
                &format!("{EX}aggregation_end_time"),
                date(&self.end_time),
            ),
            Triple::new(
                execution.clone(),
                &format!("{EX}last_execution_time"),
                integer(executed_at.timestamp_millis()),
            ),
            Triple::new(execution.clone(), &format!("{EX}aggregation_query"), query.clone()),
            Triple::new(function.clone(), RDF_TYPE, Term::iri(fno("Function"))),
            Triple::new(
                function.clone(),
                &fno("name"),
                Term::literal("aggregation_function"),
            ),
            Triple::new(
                function.clone(),
                DCT_DESCRIPTION,
                Term::lang(
                    "A function that executes an aggregation function on a RDF stream of data",
                    "en",
                ),
            ),
            Triple::new(function.clone(), &fno_w3id("solves"), problem.clone()),
        ];

        for parameter in ["solid_pod_url", "aggregation_query", "latest_minutes_to_monitor"] {
            triples.push(Triple::new(
                function.clone(),
                &fno_w3id("expects"),
                Term::iri(format!("{ASDO_PARAMETERS}{parameter}")),
            ));
        }

        triples.extend([
            Triple::new(function.clone(), &fno_w3id("returns"), output.clone()),
            Triple::new(
                function,
                &fno_w3id("implements"),
                Term::iri(format!("{EX}solid_stream_aggregation_function")),
            ),
            Triple::new(output.clone(), RDF_TYPE, Term::iri(fno_w3id("OutputStream"))),
            Triple::new(output.clone(), RDF_TYPE, Term::iri(SAO_STREAM_DATA)),
            Triple::new(
                output,
                DCT_DESCRIPTION,
                Term::lang(
                    "The stream of generated aggregation data that is the result of the aggregation function",
                    "en",
                ),
            ),
            Triple::new(problem, RDF_TYPE, Term::iri(fno_w3id("Problem"))),
            Triple::new(
                Term::iri(format!("{ASDO_PARAMETERS}aggregation_query")),
                RDF_TYPE,
                Term::iri(fno_w3id("Parameter")),
            ),
            Triple::new(query.clone(), RDF_TYPE, Term::iri(fno_w3id("Query"))),
            Triple::new(
                query.clone(),
                &format!("{EX_WWW}has_query_string"),
                Term::literal(d.query.clone()),
            ),
            Triple::new(
                query.clone(),
                &format!("{EX_WWW}has_projection_variable"),
                Term::literal(d.projection_variable.clone()),
            ),
            Triple::new(
                query.clone(),
                &format!("{EX_WWW}has_window_size"),
                integer(d.window_size as i64),
            ),
            Triple::new(
                query.clone(),
                &format!("{EX_WWW}has_window_slide"),
                integer(d.window_slide as i64),
            ),
        ]);

        // Unset IRIs are left out rather than rendered as `<>`.
        let optional = [
            (&execution, VOCALS_REGISTERED_STREAMS.to_string(), &d.stream_name),
            (&query, format!("{EX_WWW}has_window_name"), &d.window_name),
            (&query, format!("{EX_WWW}has_focus"), &d.focus),
        ];
        for (subject, predicate, object) in optional {
            if !object.is_empty() {
                triples.push(Triple::new(
                    subject.clone(),
                    &predicate,
                    Term::iri(object.clone()),
                ));
            }
        }

        triples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{parse_ntriples, to_ntriples};

    fn record() -> ProvenanceRecord {
        ProvenanceRecord::new(
            QueryDescriptor {
                query: "SELECT (AVG(?v) AS ?avg) FROM NAMED WINDOW :w ON STREAM :s [RANGE 60000 STEP 20000]".into(),
                stream_name: "https://ex/alice/acc-x/".into(),
                window_name: "https://ex/w1".into(),
                window_size: 60_000,
                window_slide: 20_000,
                projection_variable: "avg".into(),
                focus: "https://saref.etsi.org/core/hasValue".into(),
            },
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            DateTime::from_timestamp_millis(1_700_000_060_000).unwrap(),
        )
    }

    #[test]
    fn describes_query_and_window() {
        let triples = record().triples_with_id("http://example.org/aggregation_query/q1", Utc::now());
        let find = |predicate: &str| {
            triples
                .iter()
                .find(|t| t.predicate.value() == predicate)
                .map(|t| t.object.clone())
        };

        assert_eq!(
            find("http://www.example.org/has_window_size"),
            Some(Term::typed("60000", XSD_INTEGER))
        );
        assert_eq!(
            find("http://www.example.org/has_projection_variable"),
            Some(Term::literal("avg"))
        );
        assert_eq!(
            find("http://example.org/aggregation_start_time"),
            Some(Term::typed("2023-11-14T22:13:20.000Z", XSD_DATE_TIME))
        );
        assert_eq!(
            find("http://w3id.org/rsp/vocals-sd#registeredStreams"),
            Some(Term::iri("https://ex/alice/acc-x/"))
        );
    }

    #[test]
    fn query_identifiers_are_fresh_and_serializable() {
        let a = record().to_triples(Utc::now());
        let b = record().to_triples(Utc::now());
        let query_of = |triples: &[Triple]| {
            triples
                .iter()
                .find(|t| t.predicate.value() == "http://example.org/aggregation_query")
                .map(|t| t.object.clone())
        };
        assert_ne!(query_of(&a), query_of(&b));
        assert_eq!(parse_ntriples(&to_ntriples(&a)).unwrap(), a);
    }

    #[test]
    fn unset_descriptor_fields_are_omitted() {
        let record = ProvenanceRecord::new(
            QueryDescriptor::default(),
            DateTime::from_timestamp_millis(0).unwrap(),
            DateTime::from_timestamp_millis(60_000).unwrap(),
        );
        let triples = record.to_triples(Utc::now());

        assert!(!to_ntriples(&triples).contains("<>"));
        assert!(triples.iter().all(|t| t.object != Term::iri("")));
        assert!(!triples
            .iter()
            .any(|t| t.predicate.value() == VOCALS_REGISTERED_STREAMS));
    }
}
