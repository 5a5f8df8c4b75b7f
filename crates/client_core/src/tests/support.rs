use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{Resource, ResourceKind},
    protocol::{Filter, ListQuery, PageRequest, QuerySelector},
};
use tokio::time::Instant;

use crate::{
    AuthFailure, Credential, CredentialProvider, Mutation, MutationReceipt, Operation,
    ResourceBackend,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Count(ListQuery),
    Page(ListQuery, PageRequest),
    Mutate(Operation, Option<String>),
    Export,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: Call,
    pub at: Instant,
}

#[derive(Default)]
struct FakeState {
    records: Vec<Resource>,
    calls: Vec<RecordedCall>,
    fail_count: bool,
    fail_page: bool,
    fail_operations: HashSet<Operation>,
    page_delays: VecDeque<Duration>,
    count_delays: VecDeque<Duration>,
}

/// In-memory collection that serves counts and pages the way the API does and
/// applies mutations to its records.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<StdMutex<FakeState>>,
}

impl FakeBackend {
    pub fn with_records(records: Vec<Resource>) -> Self {
        let backend = Self::default();
        backend.lock().records = records;
        backend
    }

    /// `count` records named `item-01`, `item-02`, ...
    pub fn numbered(count: usize) -> Self {
        Self::with_records(
            (1..=count)
                .map(|n| {
                    let name = format!("item-{n:02}");
                    Resource::new(name.clone()).with_attribute("name", name)
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn count_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c.call, Call::Count(_)))
            .count()
    }

    pub fn page_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c.call, Call::Page(..)))
            .count()
    }

    pub fn fail_count(&self, fail: bool) {
        self.lock().fail_count = fail;
    }

    pub fn fail_page(&self, fail: bool) {
        self.lock().fail_page = fail;
    }

    pub fn fail_operation(&self, operation: Operation) {
        self.lock().fail_operations.insert(operation);
    }

    /// Delays applied to the next page fetches, in issue order.
    pub fn delay_pages(&self, delays: impl IntoIterator<Item = Duration>) {
        self.lock().page_delays.extend(delays);
    }

    pub fn delay_counts(&self, delays: impl IntoIterator<Item = Duration>) {
        self.lock().count_delays.extend(delays);
    }

    pub fn push_record(&self, record: Resource) {
        self.lock().records.push(record);
    }

    pub fn truncate(&self, len: usize) {
        self.lock().records.truncate(len);
    }

    pub fn record(&self, id: &str) -> Option<Resource> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake backend state")
    }

    fn record_call(&self, call: Call) {
        self.lock().calls.push(RecordedCall {
            call,
            at: Instant::now(),
        });
    }

    fn matching(records: &[Resource], kind: ResourceKind, query: &ListQuery) -> Vec<Resource> {
        records
            .iter()
            .filter(|record| match &query.selector {
                QuerySelector::All => true,
                QuerySelector::Search(text) => record.identity(kind).contains(text.as_str()),
                QuerySelector::Filter(filter) => match filter {
                    Filter::All => true,
                    Filter::Blocked => record.blocked(),
                    Filter::NotBlocked => !record.blocked(),
                    Filter::InScope => record.in_scope(),
                    Filter::OutOfScope => !record.in_scope(),
                    Filter::ToReview => !record.reviewed(),
                },
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ResourceBackend for FakeBackend {
    async fn fetch_count(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        _credential: &Credential,
    ) -> Result<u64> {
        self.record_call(Call::Count(query.clone()));
        let delay = self.lock().count_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.lock();
        if state.fail_count {
            return Err(anyhow!("count endpoint unavailable"));
        }
        Ok(Self::matching(&state.records, kind, query).len() as u64)
    }

    async fn fetch_page(
        &self,
        kind: ResourceKind,
        query: &ListQuery,
        page: PageRequest,
        _credential: &Credential,
    ) -> Result<Vec<Resource>> {
        self.record_call(Call::Page(query.clone(), page));
        let delay = self.lock().page_delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.lock();
        if state.fail_page {
            return Err(anyhow!("page endpoint unavailable"));
        }
        let size = page.size.get() as usize;
        let start = (page.index.saturating_sub(1) as usize) * size;
        Ok(Self::matching(&state.records, kind, query)
            .into_iter()
            .skip(start)
            .take(size)
            .collect())
    }

    async fn mutate(
        &self,
        kind: ResourceKind,
        mutation: Mutation,
        _credential: &Credential,
    ) -> Result<MutationReceipt> {
        let operation = mutation.operation();
        let target = match &mutation {
            Mutation::Delete(id)
            | Mutation::Block(id)
            | Mutation::Unblock(id)
            | Mutation::Reinject(id) => Some(id.clone()),
            Mutation::Create(payload) => Some(payload.identity().to_string()),
            Mutation::Update(resource) => Some(resource.id.clone()),
            Mutation::Import(_) | Mutation::Ventilate => None,
        };
        self.record_call(Call::Mutate(operation, target));

        let mut state = self.lock();
        if state.fail_operations.contains(&operation) {
            return Err(anyhow!("{operation} rejected by fake backend"));
        }
        let mut receipt = MutationReceipt::default();
        match mutation {
            Mutation::Create(payload) => {
                let mut record = Resource::new(payload.identity());
                if let Value::Object(body) = payload.to_json(kind) {
                    record.attributes = body;
                }
                state.records.push(record);
            }
            Mutation::Update(resource) => {
                if let Some(existing) = state.records.iter_mut().find(|r| r.id == resource.id) {
                    *existing = resource;
                }
            }
            Mutation::Delete(id) => state.records.retain(|r| r.id != id),
            Mutation::Block(id) | Mutation::Unblock(id) => {
                let blocked = operation == Operation::Block;
                if let Some(existing) = state.records.iter_mut().find(|r| r.id == id) {
                    existing
                        .attributes
                        .insert("blocked".to_string(), Value::Bool(blocked));
                }
            }
            Mutation::Import(Value::Array(items)) => {
                let field = kind.descriptor().identity_field;
                for item in &items {
                    let identity = item
                        .get(field)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    state
                        .records
                        .push(Resource::new(identity.clone()).with_attribute(field, identity));
                }
                receipt.affected = Some(items.len() as u64);
            }
            Mutation::Import(_) | Mutation::Reinject(_) | Mutation::Ventilate => {}
        }
        Ok(receipt)
    }

    async fn export_all(
        &self,
        _kind: ResourceKind,
        _credential: &Credential,
    ) -> Result<Vec<Resource>> {
        self.record_call(Call::Export);
        Ok(self.lock().records.clone())
    }
}

pub struct RejectingCredentials;

#[async_trait]
impl CredentialProvider for RejectingCredentials {
    async fn refresh(&self) -> std::result::Result<Credential, AuthFailure> {
        Err(AuthFailure::new("refresh token expired"))
    }
}
