//! REST implementation of [`ResourceBackend`] against the inventory API.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::Value;
use shared::{
    domain::{Resource, ResourceKind},
    error::ApiError,
    protocol::{ApiRoutes, BulkAction, ItemAction, ListQuery, PageRequest},
};
use tracing::debug;

use crate::{Credential, Mutation, MutationReceipt, ResourceBackend};

pub struct HttpBackend {
    http: Client,
    routes: ApiRoutes,
}

impl HttpBackend {
    pub fn new(routes: ApiRoutes) -> Self {
        Self::with_client(Client::new(), routes)
    }

    pub fn with_client(http: Client, routes: ApiRoutes) -> Self {
        Self { http, routes }
    }

    /// Turns any non-2xx answer into an [`ApiError`] carrying the response body.
    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body
        };
        Err(ApiError::from_status(status.as_u16(), message).into())
    }
}

#[async_trait]
impl ResourceBackend for HttpBackend {
    /// The API has no count endpoint; the count is the length of the
    /// unpaginated listing for the same selector.
    async fn fetch_count(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        credential: &Credential,
    ) -> Result<u64> {
        let url = self.routes.count_url(kind, query);
        debug!(%url, "GET count");
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await?;
        let items: Vec<Value> = Self::checked(response).await?.json().await?;
        Ok(items.len() as u64)
    }

    async fn fetch_page(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        page: PageRequest,
        credential: &Credential,
    ) -> Result<Vec<Resource>> {
        let url = self.routes.page_url(kind, query, page);
        debug!(%url, "GET page");
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }

    async fn mutate(
        &self,
        kind: ResourceKind,
        mutation: Mutation,
        credential: &Credential,
    ) -> Result<MutationReceipt> {
        let request = match &mutation {
            Mutation::Create(payload) => self
                .http
                .post(self.routes.collection_url(kind))
                .json(&payload.to_json(kind)),
            Mutation::Update(resource) => self
                .http
                .put(self.routes.collection_url(kind))
                .json(resource),
            Mutation::Delete(id) => self.http.delete(self.routes.item_url(kind, id)),
            Mutation::Block(id) => self
                .http
                .put(self.routes.action_url(kind, ItemAction::Block, id)),
            Mutation::Unblock(id) => self
                .http
                .put(self.routes.action_url(kind, ItemAction::Unblock, id)),
            Mutation::Reinject(id) => self
                .http
                .put(self.routes.action_url(kind, ItemAction::Reinject, id)),
            Mutation::Import(records) => self
                .http
                .post(self.routes.bulk_url(kind, BulkAction::Import))
                .json(records),
            Mutation::Ventilate => self
                .http
                .post(self.routes.bulk_url(kind, BulkAction::Ventilate)),
        };
        debug!(%kind, operation = %mutation.operation(), "sending mutation");
        let response = request.bearer_auth(credential.token()).send().await?;
        let response = Self::checked(response).await?;

        let mut receipt = MutationReceipt::default();
        if let Mutation::Import(_) = mutation {
            // Import answers with the number of stored records.
            let body = response.text().await?;
            receipt.affected = body.trim().parse().ok();
        }
        Ok(receipt)
    }

    async fn export_all(&self, kind: ResourceKind, credential: &Credential) -> Result<Vec<Resource>> {
        let url = self.routes.bulk_url(kind, BulkAction::Export);
        debug!(%url, "GET export");
        let response = self
            .http
            .get(url)
            .bearer_auth(credential.token())
            .send()
            .await?;
        Ok(Self::checked(response).await?.json().await?)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
