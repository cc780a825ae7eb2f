//! The log store protocol and its HTTP (LDP) implementation.

use crate::error::StoreError;
use crate::metadata::{container, fragment_url, LogMetadata};
use crate::rdf::{parse_ntriples, UpdateRequest, LDP_BASIC_CONTAINER};
use async_trait::async_trait;
use pulse_types::Resource;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LINK, LOCATION};
use reqwest::StatusCode;

/// Storage operations the publisher needs from a fragmented log.
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Reads the root descriptor of the log at `root`.
    async fn read_metadata(&self, root: &str) -> Result<LogMetadata, StoreError>;

    /// Returns whether a container or resource exists at `uri`.
    async fn exists(&self, uri: &str) -> Result<bool, StoreError>;

    /// Creates the fragment container named after `timestamp` and returns
    /// its URI.
    ///
    /// Does not link the fragment into the root descriptor.
    async fn new_fragment(&self, root: &str, timestamp: i64) -> Result<String, StoreError>;

    /// Applies an insert/delete patch to `target`. Returns the success status.
    async fn patch(&self, target: &str, update: &UpdateRequest) -> Result<u16, StoreError>;

    /// Appends a resource to a fragment container. Returns its location.
    async fn append(&self, fragment: &str, resource: &Resource) -> Result<String, StoreError>;
}

/// [`LogStore`] over a Linked Data Platform server.
#[derive(Debug, Clone)]
pub struct LdpLogStore {
    client: reqwest::Client,
}

impl LdpLogStore {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn status_error(uri: &str, status: StatusCode) -> StoreError {
    if status == StatusCode::NOT_FOUND {
        StoreError::NotFound(uri.to_string())
    } else {
        StoreError::Status {
            uri: uri.to_string(),
            status: status.as_u16(),
        }
    }
}

#[async_trait]
impl LogStore for LdpLogStore {
    async fn read_metadata(&self, root: &str) -> Result<LogMetadata, StoreError> {
        let root = container(root);
        let response = self
            .client
            .get(&root)
            .header(ACCEPT, "application/n-triples")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(&root, response.status()));
        }
        let body = response.text().await?;
        let triples = parse_ntriples(&body)?;
        Ok(LogMetadata::from_triples(&root, &triples))
    }

    async fn exists(&self, uri: &str) -> Result<bool, StoreError> {
        let response = self.client.head(uri).send().await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(uri, s)),
        }
    }

    async fn new_fragment(&self, root: &str, timestamp: i64) -> Result<String, StoreError> {
        let fragment = fragment_url(root, timestamp);
        let response = self
            .client
            .put(&fragment)
            .header(CONTENT_TYPE, "text/turtle")
            .header(LINK, format!("<{LDP_BASIC_CONTAINER}>; rel=\"type\""))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(&fragment, response.status()));
        }
        Ok(fragment)
    }

    async fn patch(&self, target: &str, update: &UpdateRequest) -> Result<u16, StoreError> {
        let response = self
            .client
            .patch(target)
            .header(CONTENT_TYPE, "application/sparql-update")
            .body(update.to_sparql())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(target, response.status()));
        }
        Ok(response.status().as_u16())
    }

    async fn append(&self, fragment: &str, resource: &Resource) -> Result<String, StoreError> {
        let response = self
            .client
            .post(fragment)
            .header(CONTENT_TYPE, "text/turtle")
            .body(resource.body.clone())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(fragment, response.status()));
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| fragment.to_string());
        Ok(location)
    }
}
