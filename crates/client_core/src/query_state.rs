//! The query dimensions of a mounted list and the cross-field rules between them.

use shared::{
    domain::{ResourceKind, ID_SORT_FIELD},
    protocol::{Filter, ListQuery, PageRequest, PageSize, QuerySelector, SortOrder},
};
use thiserror::Error;

/// What a query change requires from the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reconcile {
    Nothing,
    RefreshContent,
    Recount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("filter '{filter:?}' is not offered for {kind}")]
    UnsupportedFilter { kind: ResourceKind, filter: Filter },
    #[error("{kind} cannot be sorted by '{field}'")]
    UnsupportedSortField { kind: ResourceKind, field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    kind: ResourceKind,
    filter: Filter,
    search: String,
    sort_field: String,
    sort_order: SortOrder,
    page_size: PageSize,
    page_index: u32,
}

impl QueryState {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            filter: Filter::All,
            search: String::new(),
            sort_field: ID_SORT_FIELD.to_string(),
            sort_order: SortOrder::Asc,
            page_size: PageSize::Ten,
            page_index: 1,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort_field(&self) -> &str {
        &self.sort_field
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Switching to a narrowing filter drops any search text.
    pub fn set_filter(&mut self, filter: Filter) -> Result<Reconcile, QueryError> {
        if !self.kind.supports_filter(filter) {
            return Err(QueryError::UnsupportedFilter {
                kind: self.kind,
                filter,
            });
        }
        if filter == self.filter {
            return Ok(Reconcile::Nothing);
        }
        self.filter = filter;
        if filter != Filter::All {
            self.search.clear();
        }
        Ok(Reconcile::Recount)
    }

    /// A search always starts from page 1 of the unfiltered collection.
    pub fn set_search(&mut self, text: impl Into<String>) -> Reconcile {
        let text = text.into();
        let text_changed = text != self.search;
        let filter_changed = self.filter != Filter::All;
        let page_changed = self.page_index != 1;

        self.search = text;
        self.filter = Filter::All;
        self.page_index = 1;

        if text_changed || filter_changed {
            Reconcile::Recount
        } else if page_changed {
            Reconcile::RefreshContent
        } else {
            Reconcile::Nothing
        }
    }

    /// Same field flips the order; a new field starts ascending.
    pub fn set_sort(&mut self, field: &str) -> Result<Reconcile, QueryError> {
        if !self.kind.supports_sort_field(field) {
            return Err(QueryError::UnsupportedSortField {
                kind: self.kind,
                field: field.to_string(),
            });
        }
        if self.sort_field == field {
            self.sort_order = self.sort_order.toggled();
        } else {
            self.sort_field = field.to_string();
            self.sort_order = SortOrder::Asc;
        }
        Ok(Reconcile::RefreshContent)
    }

    /// The page count has to be rederived against the new size, hence a recount.
    pub fn set_page_size(&mut self, size: PageSize) -> Reconcile {
        if size == self.page_size {
            return Reconcile::Nothing;
        }
        self.page_size = size;
        Reconcile::Recount
    }

    pub fn set_page_index(&mut self, index: u32, page_count: u32) -> Reconcile {
        let index = index.clamp(1, page_count.max(1));
        if index == self.page_index {
            return Reconcile::Nothing;
        }
        self.page_index = index;
        Reconcile::RefreshContent
    }

    /// Returns whether the index actually moved.
    pub fn reset_page(&mut self) -> bool {
        let moved = self.page_index != 1;
        self.page_index = 1;
        moved
    }

    pub fn selector(&self) -> QuerySelector {
        if !self.search.is_empty() {
            QuerySelector::Search(self.search.clone())
        } else if self.filter != Filter::All {
            QuerySelector::Filter(self.filter)
        } else {
            QuerySelector::All
        }
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery {
            selector: self.selector(),
            sort_field: self.sort_field.clone(),
            sort_order: self.sort_order,
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            index: self.page_index,
            size: self.page_size,
        }
    }
}

#[cfg(test)]
#[path = "tests/query_state_tests.rs"]
mod tests;
