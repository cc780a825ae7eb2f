use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use pulse_types::Credential;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Performs the external authorization exchange for one resource scope.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Obtains a fresh credential for `resource_scope`.
    async fn authorize(&self, resource_scope: &str) -> Result<Credential, AuthError>;
}

/// Per-resource credential cache with refresh through an [`Authorizer`].
pub struct TokenCache {
    /// Credentials keyed by resource scope.
    ///
    /// Uses `std::sync::RwLock` intentionally: every acquisition is a brief
    /// HashMap operation that never spans an `.await` point. Entries are
    /// `Arc`s so a refresh swaps the whole credential in one insert.
    entries: RwLock<HashMap<String, Arc<Credential>>>,
    authorizer: Arc<dyn Authorizer>,
}

impl TokenCache {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            authorizer,
        }
    }

    /// Returns the best current credential for `resource_scope`.
    ///
    /// Looks up the exact scope first, then each ancestor container from the
    /// nearest outwards. Expired credentials are skipped. No network I/O.
    pub fn get(&self, resource_scope: &str) -> Option<Arc<Credential>> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Utc::now();

        std::iter::once(resource_scope.to_string())
            .chain(ancestor_scopes(resource_scope))
            .find_map(|scope| {
                entries
                    .get(&scope)
                    .filter(|credential| !credential.is_expired_at(now))
                    .cloned()
            })
    }

    /// Installs `credential` under its own scope, replacing any prior entry.
    pub fn insert(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(credential.resource_scope.clone(), credential.clone());
        credential
    }

    /// Runs the authorization exchange for `resource_scope` and installs the
    /// result.
    ///
    /// On failure the prior credential (if any) stays in place.
    pub async fn refresh(&self, resource_scope: &str) -> Result<Arc<Credential>, AuthError> {
        tracing::debug!(scope = resource_scope, "refreshing credential");
        match self.authorizer.authorize(resource_scope).await {
            Ok(mut credential) => {
                credential.resource_scope = resource_scope.to_string();
                tracing::info!(scope = resource_scope, "credential refreshed");
                Ok(self.insert(credential))
            }
            Err(e) => {
                tracing::error!(scope = resource_scope, "credential refresh failed: {}", e);
                Err(e)
            }
        }
    }

    /// Number of cached credentials, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The scopes currently holding a credential, sorted.
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        scopes.sort();
        scopes
    }
}

/// Ancestor containers of `scope`, nearest first, each ending in `/`.
///
/// `https://ex/a/b/c` yields `https://ex/a/b/`, `https://ex/a/`, `https://ex/`.
fn ancestor_scopes(scope: &str) -> Vec<String> {
    let Some(authority_start) = scope.find("://").map(|i| i + 3) else {
        return Vec::new();
    };
    let Some(path_start) = scope[authority_start..].find('/').map(|i| i + authority_start) else {
        return Vec::new();
    };

    let mut ancestors = Vec::new();
    let mut current = scope.trim_end_matches('/');
    while current.len() > path_start {
        match current.rfind('/') {
            Some(i) if i >= path_start => {
                ancestors.push(current[..=i].to_string());
                current = &current[..i];
            }
            _ => break,
        }
    }
    ancestors
}
