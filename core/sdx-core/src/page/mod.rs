//! Query page services: continuation state of paginated queries.

pub mod registry;
pub mod service;

pub use registry::PageRegistry;
pub use service::QueryPageService;

use crate::query::QuerySpecification;

/// Path under which page services are created.
pub const QUERY_PAGE_PREFIX: &str = "/core/query-page";

/// Cursor of one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    /// Link of the page service serving this page
    pub link: String,
    /// Keyset predicate selecting the rows after the previous page
    pub after: Option<String>,
    pub group_offset: Option<usize>,
    /// Row offset when the query pages by OFFSET instead of keyset
    pub offset: Option<usize>,
    pub previous_page_link: Option<String>,
}

impl QueryPage {
    /// Whether this is the first page of its query.
    pub fn is_first(&self) -> bool {
        self.after.is_none() && self.group_offset.is_none() && self.previous_page_link.is_none()
    }
}

/// Creates page services for the DAO when a result has more rows.
pub trait PageFactory: Send + Sync {
    /// Store `spec` with `page` as its cursor and return the new page link.
    fn create_page(
        &self,
        spec: QuerySpecification,
        page: QueryPage,
        parent_expiration_micros: i64,
    ) -> String;
}
