//! List synchronization for one mounted resource page.
//!
//! The controller owns the query dimensions and the last good snapshot of the
//! remote collection. Query changes are turned into either a recount (count,
//! derive page count, then content) or a content-only refresh. Mutations run
//! through the same path after a settling delay so that reads observe the
//! backend's post-mutation state.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde_json::Value;
use shared::{
    domain::{NewResource, Resource, ResourceKind},
    protocol::{Filter, PageSize},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::{Operation, SyncError},
    notice::{Notice, NoticeBoard, NoticeKind},
    query_state::{QueryState, Reconcile},
    Credential, CredentialProvider, Mutation, MutationReceipt, ResourceBackend,
    DEFAULT_NOTICE_TTL, DEFAULT_SETTLE_DELAY,
};

const NOT_AUTHENTICATED_NOTICE: &str = "Not authenticated; sign in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub settle_delay: Duration,
    pub notice_ttl: Duration,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            notice_ttl: DEFAULT_NOTICE_TTL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot {
    pub total_count: u64,
    pub page_count: u32,
    pub items: Vec<Resource>,
}

impl Default for CollectionSnapshot {
    fn default() -> Self {
        Self {
            total_count: 0,
            page_count: 1,
            items: Vec::new(),
        }
    }
}

/// `max(1, ceil(total / size))`.
pub fn page_count_for(total_count: u64, page_size: PageSize) -> u32 {
    let pages = total_count.div_ceil(u64::from(page_size.get())).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    LoadingCount,
    LoadingContent,
    Mutating,
    Settling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Count,
    Content,
}

#[derive(Debug, Clone)]
pub enum ListEvent {
    PhaseChanged(Phase),
    SnapshotUpdated(CollectionSnapshot),
    Notice(Notice),
    StaleResponseDiscarded { request: RequestKind, sequence: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Filter,
    Search,
    SortField,
    SortOrder,
    PageSize,
    PageIndex,
}

impl Dimension {
    const ALL: [Dimension; 6] = [
        Dimension::Filter,
        Dimension::Search,
        Dimension::SortField,
        Dimension::SortOrder,
        Dimension::PageSize,
        Dimension::PageIndex,
    ];
}

/// One-shot "has settled once" flag per query dimension.
///
/// The first observation of a dimension (its mount-time value) never triggers
/// a reconcile; only later changes do. Cleared only by `mount`.
#[derive(Debug, Default, Clone, Copy)]
struct MountLatch {
    settled: [bool; 6],
}

impl MountLatch {
    fn observe(&mut self, dimension: Dimension) -> bool {
        let slot = &mut self.settled[dimension as usize];
        let was_settled = *slot;
        *slot = true;
        was_settled
    }

    fn admit(&self, dimensions: &[Dimension], reconcile: Reconcile) -> Reconcile {
        if dimensions
            .iter()
            .any(|dimension| self.settled[*dimension as usize])
        {
            reconcile
        } else {
            Reconcile::Nothing
        }
    }
}

/// Count and page count as last reported by the backend, ahead of the content
/// that will be fetched against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Totals {
    total_count: u64,
    page_count: u32,
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            total_count: 0,
            page_count: 1,
        }
    }
}

struct ControllerState {
    query: QueryState,
    totals: Totals,
    snapshot: CollectionSnapshot,
    latch: MountLatch,
    phase: Phase,
    notices: NoticeBoard,
}

pub struct ListController {
    kind: ResourceKind,
    backend: Arc<dyn ResourceBackend>,
    credentials: Arc<dyn CredentialProvider>,
    options: ListOptions,
    inner: Mutex<ControllerState>,
    count_sequence: AtomicU64,
    content_sequence: AtomicU64,
    events: broadcast::Sender<ListEvent>,
}

impl ListController {
    pub fn new(
        kind: ResourceKind,
        backend: Arc<dyn ResourceBackend>,
        credentials: Arc<dyn CredentialProvider>,
        options: ListOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            kind,
            backend,
            credentials,
            options,
            inner: Mutex::new(ControllerState {
                query: QueryState::new(kind),
                totals: Totals::default(),
                snapshot: CollectionSnapshot::default(),
                latch: MountLatch::default(),
                phase: Phase::Idle,
                notices: NoticeBoard::new(options.notice_ttl),
            }),
            count_sequence: AtomicU64::new(0),
            content_sequence: AtomicU64::new(0),
            events,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ListEvent> {
        self.events.subscribe()
    }

    pub async fn query(&self) -> QueryState {
        self.inner.lock().await.query.clone()
    }

    pub async fn snapshot(&self) -> CollectionSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.phase
    }

    pub async fn visible_notice(&self) -> Option<Notice> {
        self.inner.lock().await.notices.visible().cloned()
    }

    /// The unexpired notice of `kind`, even when a newer one of the other kind
    /// is the visible one.
    pub async fn pending_notice(&self, kind: NoticeKind) -> Option<Notice> {
        self.inner.lock().await.notices.pending(kind).cloned()
    }

    /// Mounts the page with default query dimensions.
    pub async fn mount(&self) -> Result<(), SyncError> {
        self.mount_with(QueryState::new(self.kind)).await
    }

    /// Mounts the page with preset dimensions: resets the snapshot, settles
    /// every dimension latch on its initial value, then runs one recount.
    ///
    /// The first count moves the page count off its initial value of 1, so a
    /// preset page index is only kept when everything fits on one page.
    pub async fn mount_with(&self, mut query: QueryState) -> Result<(), SyncError> {
        if query.kind() != self.kind {
            warn!(kind = %self.kind, preset = %query.kind(), "ignoring query preset for another kind");
            query = QueryState::new(self.kind);
        }
        {
            let mut guard = self.inner.lock().await;
            guard.query = query;
            guard.totals = Totals::default();
            guard.snapshot = CollectionSnapshot::default();
            guard.latch = MountLatch::default();
            for dimension in Dimension::ALL {
                guard.latch.observe(dimension);
            }
        }
        info!(kind = %self.kind, "list mounted");
        self.recount().await
    }

    pub async fn set_filter(&self, filter: Filter) -> Result<(), SyncError> {
        let reconcile = {
            let mut guard = self.inner.lock().await;
            let reconcile = guard.query.set_filter(filter)?;
            guard
                .latch
                .admit(&[Dimension::Filter, Dimension::Search], reconcile)
        };
        self.run(reconcile).await
    }

    pub async fn set_search(&self, text: impl Into<String>) -> Result<(), SyncError> {
        let reconcile = {
            let mut guard = self.inner.lock().await;
            let reconcile = guard.query.set_search(text);
            guard.latch.admit(
                &[Dimension::Search, Dimension::Filter, Dimension::PageIndex],
                reconcile,
            )
        };
        self.run(reconcile).await
    }

    pub async fn set_sort(&self, field: &str) -> Result<(), SyncError> {
        let reconcile = {
            let mut guard = self.inner.lock().await;
            let reconcile = guard.query.set_sort(field)?;
            guard
                .latch
                .admit(&[Dimension::SortField, Dimension::SortOrder], reconcile)
        };
        self.run(reconcile).await
    }

    pub async fn set_page_size(&self, size: PageSize) -> Result<(), SyncError> {
        let reconcile = {
            let mut guard = self.inner.lock().await;
            let reconcile = guard.query.set_page_size(size);
            guard.latch.admit(&[Dimension::PageSize], reconcile)
        };
        self.run(reconcile).await
    }

    pub async fn set_page_index(&self, index: u32) -> Result<(), SyncError> {
        let reconcile = {
            let mut guard = self.inner.lock().await;
            let page_count = guard.totals.page_count;
            let reconcile = guard.query.set_page_index(index, page_count);
            guard.latch.admit(&[Dimension::PageIndex], reconcile)
        };
        self.run(reconcile).await
    }

    async fn run(&self, reconcile: Reconcile) -> Result<(), SyncError> {
        match reconcile {
            Reconcile::Nothing => Ok(()),
            Reconcile::RefreshContent => self.refresh_content().await,
            Reconcile::Recount => self.recount().await,
        }
    }

    /// Count, derive the page count, then fetch content, strictly in sequence.
    ///
    /// Any change of page count sends the list back to page 1, even when the
    /// current page would still exist.
    pub async fn recount(&self) -> Result<(), SyncError> {
        let credential = self.credential().await?;
        let sequence = self.count_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let query = self.inner.lock().await.query.list_query();
        self.set_phase(Phase::LoadingCount).await;
        debug!(kind = %self.kind, sequence, selector = ?query.selector, "fetching count");

        let outcome = self
            .backend
            .fetch_count(self.kind, &query, &credential)
            .await;

        // A superseded answer is dropped whether it succeeded or failed.
        if self.count_sequence.load(Ordering::SeqCst) != sequence {
            self.discard_stale(RequestKind::Count, sequence);
            return Ok(());
        }
        let total_count = match outcome {
            Ok(total_count) => total_count,
            Err(source) => return Err(self.retrieval_failed(source).await),
        };

        {
            let mut guard = self.inner.lock().await;
            let page_count = page_count_for(total_count, guard.query.page_size());
            let page_count_changed = page_count != guard.totals.page_count;
            guard.totals = Totals {
                total_count,
                page_count,
            };
            if page_count_changed {
                guard.query.reset_page();
            }
            debug!(
                kind = %self.kind,
                total_count,
                page_count,
                page_count_changed,
                "count reconciled"
            );
        }

        self.refresh_content().await
    }

    /// Fetches the current page and replaces the snapshot on success. On
    /// failure the previous snapshot stays in place.
    pub async fn refresh_content(&self) -> Result<(), SyncError> {
        let credential = self.credential().await?;
        let sequence = self.content_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let (query, page) = {
            let guard = self.inner.lock().await;
            (guard.query.list_query(), guard.query.page_request())
        };
        self.set_phase(Phase::LoadingContent).await;
        debug!(
            kind = %self.kind,
            sequence,
            page = page.index,
            size = page.size.get(),
            "fetching page"
        );

        let outcome = self
            .backend
            .fetch_page(self.kind, &query, page, &credential)
            .await;

        if self.content_sequence.load(Ordering::SeqCst) != sequence {
            self.discard_stale(RequestKind::Content, sequence);
            return Ok(());
        }
        let items = match outcome {
            Ok(items) => items,
            Err(source) => return Err(self.retrieval_failed(source).await),
        };

        let snapshot = {
            let mut guard = self.inner.lock().await;
            guard.snapshot = CollectionSnapshot {
                total_count: guard.totals.total_count,
                page_count: guard.totals.page_count,
                items,
            };
            guard.snapshot.clone()
        };
        let _ = self.events.send(ListEvent::SnapshotUpdated(snapshot));
        self.set_phase(Phase::Idle).await;
        Ok(())
    }

    /// Waits for the backend to settle, then recounts.
    pub async fn after_mutation(&self) -> Result<(), SyncError> {
        self.set_phase(Phase::Settling).await;
        tokio::time::sleep(self.options.settle_delay).await;
        self.recount().await
    }

    pub async fn create(&self, payload: NewResource) -> Result<MutationReceipt, SyncError> {
        if !payload.matches_kind(self.kind) {
            return Err(SyncError::PayloadKindMismatch(self.kind));
        }
        let identity = payload.identity().to_string();
        let block_after_create = payload.block_after_create();

        let receipt = self.perform(Mutation::Create(payload)).await?;
        self.raise(NoticeKind::Success, Operation::Create.success_message())
            .await;

        if block_after_create {
            if let Err(err) = self.perform(Mutation::Block(identity)).await {
                // The record exists either way; show it.
                self.refresh_after_mutation().await;
                return Err(err);
            }
            self.raise(NoticeKind::Success, Operation::Block.success_message())
                .await;
        }

        self.refresh_after_mutation().await;
        Ok(receipt)
    }

    pub async fn update(&self, resource: Resource) -> Result<MutationReceipt, SyncError> {
        self.require_scannable(Operation::Update)?;
        let receipt = self.perform(Mutation::Update(resource)).await?;
        self.finish_mutation(Operation::Update, receipt).await
    }

    /// Deletes a resource. A blocked item is unblocked first, and the delete is
    /// only issued once that unblock has succeeded.
    pub async fn delete(&self, resource: &Resource) -> Result<MutationReceipt, SyncError> {
        if !self.kind.is_scannable() && resource.blocked() {
            info!(kind = %self.kind, id = %resource.id, "unblocking before delete");
            self.perform(Mutation::Unblock(resource.id.clone())).await?;
            self.raise(NoticeKind::Success, Operation::Unblock.success_message())
                .await;
        }
        let receipt = self.perform(Mutation::Delete(resource.id.clone())).await?;
        self.finish_mutation(Operation::Delete, receipt).await
    }

    pub async fn toggle_block(&self, resource: &Resource) -> Result<MutationReceipt, SyncError> {
        if self.kind.is_scannable() {
            return Err(SyncError::Unsupported {
                operation: Operation::Block,
                kind: self.kind,
            });
        }
        let mutation = if resource.blocked() {
            Mutation::Unblock(resource.id.clone())
        } else {
            Mutation::Block(resource.id.clone())
        };
        let operation = mutation.operation();
        let receipt = self.perform(mutation).await?;
        self.finish_mutation(operation, receipt).await
    }

    pub async fn reinject(&self, resource: &Resource) -> Result<MutationReceipt, SyncError> {
        let receipt = self
            .perform(Mutation::Reinject(resource.id.clone()))
            .await?;
        self.finish_mutation(Operation::Reinject, receipt).await
    }

    pub async fn import(&self, records: Value) -> Result<MutationReceipt, SyncError> {
        if !records.is_array() {
            return Err(SyncError::InvalidImport);
        }
        let receipt = self.perform(Mutation::Import(records)).await?;
        let imported = receipt.affected.unwrap_or(0);
        let noun = if imported == 1 { "object" } else { "objects" };
        self.raise(
            NoticeKind::Success,
            format!("Import of {imported} {noun} succeeded."),
        )
        .await;
        self.refresh_after_mutation().await;
        Ok(receipt)
    }

    pub async fn ventilate(&self) -> Result<MutationReceipt, SyncError> {
        self.require_scannable(Operation::Ventilate)?;
        let receipt = self.perform(Mutation::Ventilate).await?;
        self.finish_mutation(Operation::Ventilate, receipt).await
    }

    /// Full unpaginated dump of the collection; leaves the query untouched.
    pub async fn export(&self) -> Result<Vec<Resource>, SyncError> {
        let credential = self.credential().await?;
        match self.backend.export_all(self.kind, &credential).await {
            Ok(items) => {
                info!(kind = %self.kind, count = items.len(), "export complete");
                self.raise(NoticeKind::Success, Operation::Export.success_message())
                    .await;
                Ok(items)
            }
            Err(source) => {
                warn!(kind = %self.kind, error = %source, "export failed");
                self.raise(NoticeKind::Error, Operation::Export.failure_message())
                    .await;
                Err(SyncError::OperationFailed {
                    operation: Operation::Export,
                    source,
                })
            }
        }
    }

    async fn perform(&self, mutation: Mutation) -> Result<MutationReceipt, SyncError> {
        let operation = mutation.operation();
        let credential = self.credential().await?;
        self.set_phase(Phase::Mutating).await;
        match self.backend.mutate(self.kind, mutation, &credential).await {
            Ok(receipt) => {
                info!(kind = %self.kind, %operation, affected = ?receipt.affected, "mutation applied");
                Ok(receipt)
            }
            Err(source) => {
                warn!(kind = %self.kind, %operation, error = %source, "mutation failed");
                self.raise(NoticeKind::Error, operation.failure_message())
                    .await;
                self.set_phase(Phase::Idle).await;
                Err(SyncError::OperationFailed { operation, source })
            }
        }
    }

    async fn finish_mutation(
        &self,
        operation: Operation,
        receipt: MutationReceipt,
    ) -> Result<MutationReceipt, SyncError> {
        self.raise(NoticeKind::Success, operation.success_message())
            .await;
        self.refresh_after_mutation().await;
        Ok(receipt)
    }

    /// The mutation itself already succeeded; a failed read-back is reported
    /// through the retrieval notice only.
    async fn refresh_after_mutation(&self) {
        if let Err(err) = self.after_mutation().await {
            warn!(kind = %self.kind, error = %err, "refresh after mutation failed");
        }
    }

    fn require_scannable(&self, operation: Operation) -> Result<(), SyncError> {
        if self.kind.is_scannable() {
            Ok(())
        } else {
            Err(SyncError::Unsupported {
                operation,
                kind: self.kind,
            })
        }
    }

    async fn credential(&self) -> Result<Credential, SyncError> {
        match self.credentials.refresh().await {
            Ok(credential) => Ok(credential),
            Err(failure) => {
                warn!(kind = %self.kind, reason = %failure.reason, "credential refresh rejected");
                self.raise(NoticeKind::Error, NOT_AUTHENTICATED_NOTICE).await;
                self.set_phase(Phase::Idle).await;
                Err(SyncError::NotAuthenticated(failure))
            }
        }
    }

    async fn retrieval_failed(&self, source: anyhow::Error) -> SyncError {
        warn!(kind = %self.kind, error = %source, "list retrieval failed");
        self.raise(
            NoticeKind::Error,
            format!("Retrieval of {} impossible.", self.kind.descriptor().plural),
        )
        .await;
        self.set_phase(Phase::Idle).await;
        SyncError::Retrieval {
            kind: self.kind,
            source,
        }
    }

    fn discard_stale(&self, request: RequestKind, sequence: u64) {
        debug!(kind = %self.kind, ?request, sequence, "discarding out-of-order response");
        let _ = self
            .events
            .send(ListEvent::StaleResponseDiscarded { request, sequence });
    }

    async fn raise(&self, kind: NoticeKind, message: impl Into<String>) {
        let notice = self.inner.lock().await.notices.raise(kind, message);
        let _ = self.events.send(ListEvent::Notice(notice));
    }

    async fn set_phase(&self, phase: Phase) {
        {
            let mut guard = self.inner.lock().await;
            if guard.phase == phase {
                return;
            }
            guard.phase = phase;
        }
        let _ = self.events.send(ListEvent::PhaseChanged(phase));
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
