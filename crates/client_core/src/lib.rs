use std::{fmt, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{NewResource, Resource, ResourceKind},
    protocol::{ListQuery, PageRequest},
};

pub mod controller;
pub mod error;
pub mod http;
pub mod notice;
pub mod query_state;

pub use controller::{CollectionSnapshot, ListController, ListEvent, ListOptions, Phase};
pub use error::{AuthFailure, Operation, SyncError};
pub use http::HttpBackend;
pub use notice::{Notice, NoticeBoard, NoticeKind};
pub use query_state::{QueryError, QueryState, Reconcile};

/// Wait between a successful mutation and the refresh that reads it back.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);
/// How long success and error notices stay visible.
pub const DEFAULT_NOTICE_TTL: Duration = Duration::from_millis(4000);

/// Bearer credential attached to every API call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Returns a credential valid for at least the next request.
    async fn refresh(&self) -> std::result::Result<Credential, AuthFailure>;
}

pub struct MissingCredentialProvider;

#[async_trait]
impl CredentialProvider for MissingCredentialProvider {
    async fn refresh(&self) -> std::result::Result<Credential, AuthFailure> {
        Err(AuthFailure::new("no credential provider configured"))
    }
}

/// A fixed token, e.g. one pasted from the identity provider or read from config.
pub struct StaticCredential {
    credential: Credential,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Credential::bearer(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn refresh(&self) -> std::result::Result<Credential, AuthFailure> {
        if self.credential.token().trim().is_empty() {
            return Err(AuthFailure::new("configured token is empty"));
        }
        Ok(self.credential.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create(NewResource),
    Update(Resource),
    Delete(String),
    Block(String),
    Unblock(String),
    Reinject(String),
    /// A JSON array of records in the kind's create shape.
    Import(Value),
    Ventilate,
}

impl Mutation {
    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Create(_) => Operation::Create,
            Mutation::Update(_) => Operation::Update,
            Mutation::Delete(_) => Operation::Delete,
            Mutation::Block(_) => Operation::Block,
            Mutation::Unblock(_) => Operation::Unblock,
            Mutation::Reinject(_) => Operation::Reinject,
            Mutation::Import(_) => Operation::Import,
            Mutation::Ventilate => Operation::Ventilate,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReceipt {
    /// Number of records touched, when the API reports it (imports do).
    pub affected: Option<u64>,
}

/// Remote collection capabilities the list controller depends on.
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    async fn fetch_count(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        credential: &Credential,
    ) -> Result<u64>;
    async fn fetch_page(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        page: PageRequest,
        credential: &Credential,
    ) -> Result<Vec<Resource>>;
    async fn mutate(
        &self,
        kind: ResourceKind,
        mutation: Mutation,
        credential: &Credential,
    ) -> Result<MutationReceipt>;
    async fn export_all(&self, kind: ResourceKind, credential: &Credential)
        -> Result<Vec<Resource>>;
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_provider_always_rejects() {
        let err = MissingCredentialProvider
            .refresh()
            .await
            .expect_err("must reject");
        assert!(err.to_string().contains("no credential provider"));
    }

    #[tokio::test]
    async fn static_credential_rejects_blank_tokens() {
        assert!(StaticCredential::new("  ").refresh().await.is_err());
        let credential = StaticCredential::new("abc").refresh().await.expect("token");
        assert_eq!(credential.token(), "abc");
        assert_eq!(format!("{credential:?}"), "Credential(<redacted>)");
    }
}
