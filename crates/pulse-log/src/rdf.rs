//! Minimal RDF term model with N-Triples reading and writing.
//!
//! Only what the log metadata needs: IRIs, blank nodes, and plain, typed, or
//! language-tagged literals. Resource bodies themselves stay opaque.

use crate::error::RdfError;
use std::fmt;

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const LDP_INBOX: &str = "http://www.w3.org/ns/ldp#inbox";
pub const LDP_BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";
pub const TREE_RELATION: &str = "https://w3id.org/tree#relation";
pub const TREE_NODE: &str = "https://w3id.org/tree#node";
pub const TREE_PATH: &str = "https://w3id.org/tree#path";
pub const TREE_VALUE: &str = "https://w3id.org/tree#value";
pub const TREE_GTE_RELATION: &str = "https://w3id.org/tree#GreaterThanOrEqualToRelation";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Term::Blank(label.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }

    pub fn lang(value: impl Into<String>, language: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into()),
        }
    }

    /// The IRI, blank label, or literal lexical form.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(v) | Term::Blank(v) => v,
            Term::Literal { value, .. } => value,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", escape(value))?;
                if let Some(language) = language {
                    write!(f, "@{language}")
                } else if let Some(datatype) = datatype {
                    write!(f, "^^<{datatype}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: &str, object: Term) -> Self {
        Self {
            subject,
            predicate: Term::iri(predicate),
            object,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
    }
}

/// Serializes triples as an N-Triples document, one statement per line.
pub fn to_ntriples(triples: &[Triple]) -> String {
    triples.iter().map(|t| format!("{t}\n")).collect()
}

/// An insert/delete patch against one document, rendered as SPARQL Update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRequest {
    pub delete: Vec<Triple>,
    pub insert: Vec<Triple>,
}

impl UpdateRequest {
    pub fn insert(triples: Vec<Triple>) -> Self {
        Self {
            delete: Vec::new(),
            insert: triples,
        }
    }

    pub fn delete(triples: Vec<Triple>) -> Self {
        Self {
            delete: triples,
            insert: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.insert.is_empty()
    }

    /// Renders `DELETE DATA {…}` and/or `INSERT DATA {…}`, delete first.
    pub fn to_sparql(&self) -> String {
        let block = |triples: &[Triple]| {
            triples
                .iter()
                .map(Triple::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        let mut parts = Vec::new();
        if !self.delete.is_empty() {
            parts.push(format!("DELETE DATA {{{}}}", block(&self.delete)));
        }
        if !self.insert.is_empty() {
            parts.push(format!("INSERT DATA {{{}}}", block(&self.insert)));
        }
        parts.join(";\n")
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Parses an N-Triples document.
pub fn parse_ntriples(input: &str) -> Result<Vec<Triple>, RdfError> {
    let mut triples = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut cursor = Cursor {
            rest: line,
            line: index + 1,
        };
        let subject = cursor.term()?;
        let predicate = cursor.term()?;
        let object = cursor.term()?;
        cursor.skip_ws();
        if !cursor.rest.starts_with('.') {
            return Err(cursor.error("expected '.'"));
        }
        if matches!(predicate, Term::Iri(_)) && !matches!(subject, Term::Literal { .. }) {
            triples.push(Triple {
                subject,
                predicate,
                object,
            });
        } else {
            return Err(cursor.error("invalid subject or predicate"));
        }
    }
    Ok(triples)
}

struct Cursor<'a> {
    rest: &'a str,
    line: usize,
}

impl<'a> Cursor<'a> {
    fn error(&self, message: &str) -> RdfError {
        RdfError::Syntax {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn term(&mut self) -> Result<Term, RdfError> {
        self.skip_ws();
        if let Some(rest) = self.rest.strip_prefix('<') {
            let end = rest.find('>').ok_or_else(|| self.error("unterminated IRI"))?;
            let iri = rest[..end].to_string();
            self.rest = &rest[end + 1..];
            Ok(Term::Iri(iri))
        } else if let Some(rest) = self.rest.strip_prefix("_:") {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            let label = rest[..end].to_string();
            self.rest = &rest[end..];
            Ok(Term::Blank(label))
        } else if self.rest.starts_with('"') {
            self.literal()
        } else {
            Err(self.error("expected term"))
        }
    }

    fn literal(&mut self) -> Result<Term, RdfError> {
        let mut value = String::new();
        let mut chars = self.rest[1..].char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    end = Some(i + 2);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    _ => return Err(self.error("invalid escape")),
                },
                c => value.push(c),
            }
        }
        let end = end.ok_or_else(|| self.error("unterminated literal"))?;
        self.rest = &self.rest[end..];

        if let Some(rest) = self.rest.strip_prefix("^^") {
            self.rest = rest;
            match self.term()? {
                Term::Iri(datatype) => Ok(Term::typed(value, datatype)),
                _ => Err(self.error("datatype must be an IRI")),
            }
        } else if let Some(rest) = self.rest.strip_prefix('@') {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
                .unwrap_or(rest.len());
            let language = rest[..end].to_string();
            self.rest = &rest[end..];
            Ok(Term::lang(value, language))
        } else {
            Ok(Term::literal(value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_term_kinds() {
        let doc = r#"
# comment
<https://ex/log/> <https://w3id.org/tree#relation> _:r1 .
_:r1 <https://w3id.org/tree#value> "2024-01-01T00:00:00Z"^^<http://www.w3.org/2001/XMLSchema#dateTime> .
<https://ex/f> <http://purl.org/dc/terms/description> "say \"hi\"\n"@en .
<https://ex/f> <https://ex/p> "plain" .
"#;
        let triples = parse_ntriples(doc).unwrap();
        assert_eq!(triples.len(), 4);
        assert_eq!(triples[0].object, Term::blank("r1"));
        assert_eq!(
            triples[1].object,
            Term::typed("2024-01-01T00:00:00Z", XSD_DATE_TIME)
        );
        assert_eq!(triples[2].object, Term::lang("say \"hi\"\n", "en"));
        assert_eq!(triples[3].object, Term::literal("plain"));
    }

    #[test]
    fn written_triples_parse_back() {
        let triples = vec![
            Triple::new(Term::iri("https://ex/a"), RDF_TYPE, Term::iri("https://ex/T")),
            Triple::new(Term::iri("https://ex/a"), TREE_VALUE, Term::typed("5", XSD_INTEGER)),
            Triple::new(Term::blank("b"), TREE_NODE, Term::lang("tab\there", "en")),
        ];
        assert_eq!(parse_ntriples(&to_ntriples(&triples)).unwrap(), triples);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_ntriples("<a> <b> <c>"),
            Err(RdfError::Syntax { line: 1, .. })
        ));
        assert!(parse_ntriples("\"lit\" <b> <c> .").is_err());
        assert!(parse_ntriples("<a> <b> \"open .").is_err());
    }

    #[test]
    fn update_renders_delete_before_insert() {
        let old = Triple::new(Term::iri("https://ex/log/"), LDP_INBOX, Term::iri("https://ex/log/1/"));
        let new = Triple::new(Term::iri("https://ex/log/"), LDP_INBOX, Term::iri("https://ex/log/2/"));

        assert_eq!(
            UpdateRequest::insert(vec![new.clone()]).to_sparql(),
            "INSERT DATA {<https://ex/log/> <http://www.w3.org/ns/ldp#inbox> <https://ex/log/2/> .}"
        );
        let combined = UpdateRequest {
            delete: vec![old],
            insert: vec![new],
        }
        .to_sparql();
        let delete_at = combined.find("DELETE DATA").unwrap();
        let insert_at = combined.find("INSERT DATA").unwrap();
        assert!(delete_at < insert_at);
        assert!(UpdateRequest::default().is_empty());
    }
}
