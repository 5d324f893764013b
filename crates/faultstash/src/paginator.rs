//! Generic cursor-following paginator
//!
//! One `Paginator` walks one resource traversal: it owns the current page
//! buffer and an index into it, refills lazily (at most one page in memory,
//! one fetch per exhausted buffer), and is finite and non-restartable; a
//! fresh instance is required to re-scan.

use std::collections::HashSet;

use faultstash_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::ApiClient;
use crate::resources::PageRequest;
use crate::transport::ApiTransport;

/// Pagination position: a page number, an opaque "next" link, or the
/// terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    Page(u32),
    Next(String),
    End,
}

/// The capability set a resource's page response exposes to the generic
/// paginator: yield its records, name the cursor of the following page, and
/// (for resources that support include filtering) key each record.
pub trait PageResponse: DeserializeOwned {
    type Record: Serialize + Clone;

    fn take_records(&mut self) -> Vec<Self::Record>;

    fn next_cursor(&self) -> PageCursor;

    /// Per-record key for include filtering. Resources without a usable key
    /// return `None` and are never filtered.
    fn record_name(_record: &Self::Record) -> Option<&str> {
        None
    }
}

/// Pull-based iterator over one paginated resource.
pub struct Paginator<P: PageResponse> {
    request: PageRequest,
    buffer: Vec<P::Record>,
    cursor_idx: isize,
    fetch_needed: bool,
    next: PageCursor,
    exhausted: bool,
    /// Lowercased record names to include; empty means include all.
    include: HashSet<String>,
}

impl<P: PageResponse> Paginator<P> {
    pub fn new(request: PageRequest) -> Self {
        Self {
            request,
            buffer: Vec::new(),
            cursor_idx: -1,
            fetch_needed: true,
            next: PageCursor::Page(1),
            exhausted: false,
            include: HashSet::new(),
        }
    }

    /// Restricts the sequence to records whose lowercased name is in `set`.
    /// An empty set keeps include-all behavior.
    pub fn with_include_set(mut self, set: HashSet<String>) -> Self {
        self.include = set;
        self
    }

    /// Returns the next record, or `None` once the resource is exhausted.
    /// The terminal state is idempotent: every later call returns `None`
    /// without issuing further fetches.
    pub async fn next<T: ApiTransport>(
        &mut self,
        client: &mut ApiClient<T>,
    ) -> Result<Option<P::Record>> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            if !self.ensure_buffer(client).await? {
                self.exhausted = true;
                return Ok(None);
            }
            // Scan forward for the next record to hand out. Whoever returns
            // the last record of the buffer also schedules the next fetch.
            let start = (self.cursor_idx + 1) as usize;
            let mut found = None;
            for idx in start..self.buffer.len() {
                if idx == self.buffer.len() - 1 {
                    self.fetch_needed = true;
                }
                if self.matches_include(&self.buffer[idx]) {
                    found = Some(idx);
                    break;
                }
            }
            match found {
                Some(idx) => {
                    self.cursor_idx = idx as isize;
                    return Ok(Some(self.buffer[idx].clone()));
                }
                // Nothing in this buffer matched the include set; fetch the
                // next page and keep scanning.
                None => continue,
            }
        }
    }

    /// Makes sure the buffer holds unread records, fetching the next page if
    /// needed. Returns false once the resource is exhausted: no next cursor,
    /// or a page with zero records.
    async fn ensure_buffer<T: ApiTransport>(&mut self, client: &mut ApiClient<T>) -> Result<bool> {
        if !self.fetch_needed {
            return Ok(true);
        }
        match std::mem::replace(&mut self.next, PageCursor::End) {
            PageCursor::End => Ok(false),
            cursor => {
                let url = self.request.url_for(&cursor)?;
                tracing::debug!(url = %url, "fetching page");
                let mut page: P = client.issue(&url).await?;
                self.buffer = page.take_records();
                self.next = page.next_cursor();
                self.cursor_idx = -1;
                self.fetch_needed = false;
                Ok(!self.buffer.is_empty())
            }
        }
    }

    fn matches_include(&self, record: &P::Record) -> bool {
        if self.include.is_empty() {
            return true;
        }
        P::record_name(record)
            .map(|name| self.include.contains(&name.to_lowercase()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{PageRoute, ProjectPage};
    use crate::transport::{ApiResponse, ApiTransport, RateLimitSnapshot};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves a fixed sequence of project pages; `page=N` selects the Nth.
    struct PagedApi {
        pages: Vec<Value>,
        fetches: Arc<AtomicUsize>,
    }

    impl PagedApi {
        fn new(pages: Vec<Value>) -> (Self, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let api = Self {
                pages,
                fetches: fetches.clone(),
            };
            (api, fetches)
        }
    }

    #[async_trait]
    impl ApiTransport for PagedApi {
        async fn get(&self, url: &str) -> Result<ApiResponse> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let parsed = reqwest::Url::parse(url).unwrap();
            let page: usize = parsed
                .query_pairs()
                .find(|(key, _)| key == "page")
                .map(|(_, value)| value.parse().unwrap())
                .unwrap();
            Ok(ApiResponse {
                body: serde_json::to_vec(&self.pages[page - 1]).unwrap().into(),
                rate_limit: RateLimitSnapshot {
                    limit: 100,
                    remaining: 99,
                    reset_epoch: 0,
                },
            })
        }
    }

    fn project(id: i64, name: &str) -> Value {
        json!({ "id": id, "name": name })
    }

    fn projects_request() -> PageRequest {
        PageRequest {
            endpoint: "https://api.example.com/v2/projects".to_string(),
            token: "token".to_string(),
            route: PageRoute::Projects,
            created_after: 0,
        }
    }

    async fn drain(
        paginator: &mut Paginator<ProjectPage>,
        client: &mut ApiClient<PagedApi>,
    ) -> Vec<String> {
        let mut names = Vec::new();
        while let Some(record) = paginator.next(client).await.unwrap() {
            names.push(record.name);
        }
        names
    }

    #[tokio::test(flavor = "current_thread")]
    async fn walks_every_page_in_order() {
        let (api, _fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "a"), project(2, "b")], "current_page": 1, "num_pages": 2}),
            json!({"results": [project(3, "c")], "current_page": 2, "num_pages": 2}),
        ]);
        let mut client = ApiClient::new(api);
        let mut paginator = Paginator::<ProjectPage>::new(projects_request());

        let names = drain(&mut paginator, &mut client).await;
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fetches_lazily_one_page_per_exhausted_buffer() {
        let (api, fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "a"), project(2, "b")], "current_page": 1, "num_pages": 2}),
            json!({"results": [project(3, "c")], "current_page": 2, "num_pages": 2}),
        ]);
        let mut client = ApiClient::new(api);
        let mut paginator = Paginator::<ProjectPage>::new(projects_request());

        // Returning the first page's records costs exactly one fetch; the
        // second page is not requested until its first record is needed.
        paginator.next(&mut client).await.unwrap();
        paginator.next(&mut client).await.unwrap();
        assert_eq!(client.rate_limit().remaining(), 99);
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        paginator.next(&mut client).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exhaustion_is_idempotent_and_fetch_free() {
        let (api, fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "a")], "current_page": 1, "num_pages": 1}),
        ]);
        let mut client = ApiClient::new(api);
        let mut paginator = Paginator::<ProjectPage>::new(projects_request());

        assert!(paginator.next(&mut client).await.unwrap().is_some());
        for _ in 0..3 {
            assert!(paginator.next(&mut client).await.unwrap().is_none());
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_first_page_is_terminal() {
        let (api, fetches) = PagedApi::new(vec![
            json!({"results": [], "current_page": 1, "num_pages": 1}),
        ]);
        let mut client = ApiClient::new(api);
        let mut paginator = Paginator::<ProjectPage>::new(projects_request());

        assert!(paginator.next(&mut client).await.unwrap().is_none());
        assert!(paginator.next(&mut client).await.unwrap().is_none());
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn include_set_filters_case_insensitively_in_dataset_order() {
        let (api, _fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "Alpha"), project(2, "Beta")], "current_page": 1, "num_pages": 2}),
            json!({"results": [project(3, "Gamma"), project(4, "Delta")], "current_page": 2, "num_pages": 2}),
        ]);
        let mut client = ApiClient::new(api);
        let include: HashSet<String> =
            ["alpha", "delta"].iter().map(|s| s.to_string()).collect();
        let mut paginator =
            Paginator::<ProjectPage>::new(projects_request()).with_include_set(include);

        let names = drain(&mut paginator, &mut client).await;
        assert_eq!(names, vec!["Alpha", "Delta"]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn include_filtering_skips_across_whole_pages() {
        let (api, fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "a"), project(2, "b")], "current_page": 1, "num_pages": 3}),
            json!({"results": [project(3, "c")], "current_page": 2, "num_pages": 3}),
            json!({"results": [project(4, "d")], "current_page": 3, "num_pages": 3}),
        ]);
        let mut client = ApiClient::new(api);
        let include: HashSet<String> = ["d"].iter().map(|s| s.to_string()).collect();
        let mut paginator =
            Paginator::<ProjectPage>::new(projects_request()).with_include_set(include);

        // The only match sits on page 3; the paginator keeps fetching until
        // it finds it.
        let first = paginator.next(&mut client).await.unwrap().unwrap();
        assert_eq!(first.name, "d");
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert!(paginator.next(&mut client).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_include_set_returns_everything() {
        let (api, _fetches) = PagedApi::new(vec![
            json!({"results": [project(1, "a"), project(2, "b")], "current_page": 1, "num_pages": 1}),
        ]);
        let mut client = ApiClient::new(api);
        let mut paginator =
            Paginator::<ProjectPage>::new(projects_request()).with_include_set(HashSet::new());

        let names = drain(&mut paginator, &mut client).await;
        assert_eq!(names, vec!["a", "b"]);
    }
}
