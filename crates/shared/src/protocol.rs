use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{ResourceKind, ID_SORT_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    #[default]
    All,
    ToReview,
    InScope,
    OutOfScope,
    Blocked,
    NotBlocked,
}

impl Filter {
    /// Path segment selecting the filtered collection. `All` has none.
    pub fn endpoint(self) -> &'static str {
        match self {
            Filter::All => "",
            Filter::ToReview => "toReview",
            Filter::InScope => "inScope",
            Filter::OutOfScope => "outOfScope",
            Filter::Blocked => "blocked",
            Filter::NotBlocked => "nonBlocked",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Filter::All => "All",
            Filter::ToReview => "To review",
            Filter::InScope => "In scope",
            Filter::OutOfScope => "Out of scope",
            Filter::Blocked => "Blocked",
            Filter::NotBlocked => "Not blocked",
        }
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "all" => Ok(Filter::All),
            "toreview" => Ok(Filter::ToReview),
            "inscope" => Ok(Filter::InScope),
            "outofscope" => Ok(Filter::OutOfScope),
            "blocked" => Ok(Filter::Blocked),
            "notblocked" | "nonblocked" => Ok(Filter::NotBlocked),
            _ => Err(format!("unknown filter '{raw}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PageSize {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
}

impl PageSize {
    pub const ALL: [PageSize; 3] = [PageSize::Ten, PageSize::TwentyFive, PageSize::Fifty];

    pub fn get(self) -> u32 {
        match self {
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
        }
    }
}

impl TryFrom<u32> for PageSize {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageSize::ALL
            .into_iter()
            .find(|size| size.get() == value)
            .ok_or_else(|| format!("page size must be one of 10, 25, 50 (got {value})"))
    }
}

impl From<PageSize> for u32 {
    fn from(value: PageSize) -> Self {
        value.get()
    }
}

/// Which slice of the collection a query addresses, before pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySelector {
    All,
    Search(String),
    Filter(Filter),
}

/// The canonical remote query: selector plus sort. Count requests use it as is;
/// page requests add a [`PageRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub selector: QuerySelector,
    pub sort_field: String,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            selector: QuerySelector::All,
            sort_field: ID_SORT_FIELD.to_string(),
            sort_order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: u32,
    pub size: PageSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    Block,
    Unblock,
    Reinject,
}

impl ItemAction {
    fn segment(self) -> &'static str {
        match self {
            ItemAction::Block => "block",
            ItemAction::Unblock => "unblock",
            ItemAction::Reinject => "reinject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAction {
    Export,
    Import,
    Ventilate,
}

impl BulkAction {
    fn segment(self) -> &'static str {
        match self {
            BulkAction::Export => "export",
            BulkAction::Import => "import",
            BulkAction::Ventilate => "ventilate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("api base url '{0}' cannot carry path segments")]
pub struct InvalidBaseUrl(pub String);

/// URL builder for the inventory REST API.
///
/// Grammar: `<base>/<plural>[/search/<text> | /<filterEndpoint>][/<page>/<size>]/sort?field=..&order=..`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoutes {
    base: Url,
}

impl ApiRoutes {
    pub fn new(base: Url) -> Result<Self, InvalidBaseUrl> {
        if base.cannot_be_a_base() {
            return Err(InvalidBaseUrl(base.to_string()));
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn page_url(&self, kind: ResourceKind, query: &ListQuery, page: PageRequest) -> Url {
        let index = page.index.to_string();
        let size = page.size.get().to_string();
        self.sorted_url(kind, query, &[index.as_str(), size.as_str()])
    }

    pub fn count_url(&self, kind: ResourceKind, query: &ListQuery) -> Url {
        self.sorted_url(kind, query, &[])
    }

    pub fn collection_url(&self, kind: ResourceKind) -> Url {
        self.join(&[kind.descriptor().plural])
    }

    pub fn item_url(&self, kind: ResourceKind, id: &str) -> Url {
        self.join(&[kind.descriptor().plural, id])
    }

    pub fn action_url(&self, kind: ResourceKind, action: ItemAction, id: &str) -> Url {
        self.join(&[kind.descriptor().plural, action.segment(), id])
    }

    pub fn bulk_url(&self, kind: ResourceKind, action: BulkAction) -> Url {
        self.join(&[kind.descriptor().plural, action.segment()])
    }

    fn sorted_url(&self, kind: ResourceKind, query: &ListQuery, paging: &[&str]) -> Url {
        let mut segments = vec![kind.descriptor().plural];
        match &query.selector {
            QuerySelector::All => {}
            QuerySelector::Search(text) => {
                segments.push("search");
                segments.push(text.as_str());
            }
            QuerySelector::Filter(filter) => {
                if !filter.endpoint().is_empty() {
                    segments.push(filter.endpoint());
                }
            }
        }
        segments.extend_from_slice(paging);
        segments.push("sort");

        let mut url = self.join(&segments);
        url.query_pairs_mut()
            .append_pair("field", &query.sort_field)
            .append_pair("order", query.sort_order.as_str());
        url
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`: the base always accepts path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
