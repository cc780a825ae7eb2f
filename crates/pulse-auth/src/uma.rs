//! UMA 2.0 ticket exchange used to refresh credentials.

use crate::cache::Authorizer;
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use pulse_types::Credential;
use reqwest::header::{ACCEPT, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Grant type for exchanging a permission ticket for an access token.
pub const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Claim token format used when the client identity is a WebID.
pub const DEFAULT_CLAIM_FORMAT: &str = "urn:solidlab:uma:claims:formats:webid";

/// A parsed `WWW-Authenticate: UMA as_uri="…", ticket="…"` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmaChallenge {
    /// Base URI of the authorization server.
    pub as_uri: String,
    /// Permission ticket to redeem.
    pub ticket: String,
}

impl UmaChallenge {
    /// Parses the value of a `WWW-Authenticate` header.
    pub fn parse(header: &str) -> Result<Self, AuthError> {
        let header = header.trim();
        let params = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("UMA") => rest,
            _ => return Err(AuthError::MalformedChallenge(header.to_string())),
        };

        let mut as_uri = None;
        let mut ticket = None;
        for param in params.split(',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_string();
            match key.trim() {
                "as_uri" => as_uri = Some(value),
                "ticket" => ticket = Some(value),
                _ => {}
            }
        }

        match (as_uri, ticket) {
            (Some(as_uri), Some(ticket)) if !as_uri.is_empty() && !ticket.is_empty() => {
                Ok(Self { as_uri, ticket })
            }
            _ => Err(AuthError::MalformedChallenge(header.to_string())),
        }
    }
}

#[derive(Deserialize)]
struct UmaConfiguration {
    token_endpoint: String,
}

#[derive(Serialize)]
struct TicketRequest<'a> {
    grant_type: &'static str,
    ticket: &'a str,
    claim_token: &'a str,
    claim_token_format: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Authorizer that redeems UMA permission tickets with a fixed client identity.
#[derive(Debug, Clone)]
pub struct UmaAuthorizer {
    client: reqwest::Client,
    claim_token: String,
    claim_format: String,
}

impl UmaAuthorizer {
    pub fn new(
        client: reqwest::Client,
        claim_token: impl Into<String>,
        claim_format: impl Into<String>,
    ) -> Self {
        Self {
            client,
            claim_token: claim_token.into(),
            claim_format: claim_format.into(),
        }
    }

    async fn challenge(&self, resource: &str) -> Result<UmaChallenge, AuthError> {
        let response = self
            .client
            .get(resource)
            .header(ACCEPT, "text/turtle")
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Err(AuthError::NoChallenge(resource.to_string()));
        }

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AuthError::MalformedChallenge("missing WWW-Authenticate".into()))?;
        UmaChallenge::parse(header)
    }

    async fn token_endpoint(&self, as_uri: &str) -> Result<String, AuthError> {
        let url = format!(
            "{}/.well-known/uma2-configuration",
            as_uri.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected(response.status().as_u16()));
        }
        let config: UmaConfiguration = response.json().await?;
        Ok(config.token_endpoint)
    }
}

#[async_trait]
impl Authorizer for UmaAuthorizer {
    async fn authorize(&self, resource_scope: &str) -> Result<Credential, AuthError> {
        let challenge = self.challenge(resource_scope).await?;
        let token_endpoint = self.token_endpoint(&challenge.as_uri).await?;

        let response = self
            .client
            .post(&token_endpoint)
            .json(&TicketRequest {
                grant_type: UMA_TICKET_GRANT,
                ticket: &challenge.ticket,
                claim_token: &self.claim_token,
                claim_token_format: &self.claim_format,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Rejected(response.status().as_u16()));
        }

        let token: TokenResponse = response.json().await?;
        let mut credential = Credential::new(resource_scope, token.token_type, token.access_token);
        if let Some(seconds) = token.expires_in {
            credential = credential.with_expiry(Utc::now() + chrono::Duration::seconds(seconds));
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_challenge() {
        let c = UmaChallenge::parse(r#"UMA as_uri="https://as.example/uma", ticket="t-1""#)
            .unwrap();
        assert_eq!(c.as_uri, "https://as.example/uma");
        assert_eq!(c.ticket, "t-1");
    }

    #[test]
    fn parse_challenge_rejects_other_schemes() {
        assert!(UmaChallenge::parse(r#"Bearer realm="x""#).is_err());
        assert!(UmaChallenge::parse(r#"UMA as_uri="https://as""#).is_err());
        assert!(UmaChallenge::parse("UMA").is_err());
    }
}
