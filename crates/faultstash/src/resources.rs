//! Upstream resource records and page responses
//!
//! Records are decoded from upstream JSON. Identifier and count fields are
//! typed because pagination and progress logging need them; everything else
//! is captured verbatim through `#[serde(flatten)]` and forwarded to storage
//! untouched.

use faultstash_core::{BackupError, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::paginator::{PageCursor, PageResponse};

/// An error-tracker project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub fault_count: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// A fault (grouped error) inside a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub notices_count: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// A single error occurrence attached to a fault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub fault_id: i64,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Pagination links as the upstream API reports them. Only `next` is
/// consumed; an empty string reads the same as an absent link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageLinks {
    #[serde(default)]
    pub next: Option<String>,
}

impl PageLinks {
    fn next_url(&self) -> Option<&str> {
        self.next.as_deref().filter(|link| !link.is_empty())
    }
}

/// One page of the projects listing. Pages by number.
#[derive(Debug, Deserialize)]
pub struct ProjectPage {
    #[serde(default)]
    pub results: Vec<Project>,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub num_pages: u32,
}

impl PageResponse for ProjectPage {
    type Record = Project;

    fn take_records(&mut self) -> Vec<Project> {
        std::mem::take(&mut self.results)
    }

    fn next_cursor(&self) -> PageCursor {
        page_number_cursor(self.current_page, self.num_pages)
    }

    fn record_name(record: &Project) -> Option<&str> {
        Some(&record.name)
    }
}

/// One page of a project's faults. Follows `links.next` when the upstream
/// provides it, otherwise pages by number.
#[derive(Debug, Deserialize)]
pub struct FaultPage {
    #[serde(default)]
    pub results: Vec<Fault>,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub num_pages: u32,
    #[serde(default)]
    pub links: PageLinks,
}

impl PageResponse for FaultPage {
    type Record = Fault;

    fn take_records(&mut self) -> Vec<Fault> {
        std::mem::take(&mut self.results)
    }

    fn next_cursor(&self) -> PageCursor {
        match self.links.next_url() {
            Some(link) => PageCursor::Next(link.to_string()),
            None => page_number_cursor(self.current_page, self.num_pages),
        }
    }
}

/// One page of a fault's notices. Same cursor shape as [`FaultPage`].
#[derive(Debug, Deserialize)]
pub struct NoticePage {
    #[serde(default)]
    pub results: Vec<Notice>,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub num_pages: u32,
    #[serde(default)]
    pub links: PageLinks,
}

impl PageResponse for NoticePage {
    type Record = Notice;

    fn take_records(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.results)
    }

    fn next_cursor(&self) -> PageCursor {
        match self.links.next_url() {
            Some(link) => PageCursor::Next(link.to_string()),
            None => page_number_cursor(self.current_page, self.num_pages),
        }
    }
}

fn page_number_cursor(current_page: u32, num_pages: u32) -> PageCursor {
    if current_page < num_pages {
        PageCursor::Page(current_page + 1)
    } else {
        PageCursor::End
    }
}

/// Which resource a paginator walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRoute {
    Projects,
    Faults { project_id: i64 },
    Notices { project_id: i64, fault_id: i64 },
}

impl PageRoute {
    /// Query parameter carrying the watermark filter for this resource.
    /// The projects listing is never filtered.
    fn watermark_param(&self) -> Option<&'static str> {
        match self {
            PageRoute::Projects => None,
            PageRoute::Faults { .. } => Some("occurred_after"),
            PageRoute::Notices { .. } => Some("created_after"),
        }
    }
}

/// Everything needed to build the URL of any page of one resource
/// traversal.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub endpoint: String,
    pub token: String,
    pub route: PageRoute,
    /// Watermark filter as epoch seconds; 0 means unfiltered.
    pub created_after: i64,
}

impl PageRequest {
    pub fn url_for(&self, cursor: &PageCursor) -> Result<String> {
        match cursor {
            PageCursor::Page(page) => {
                let base = self.route_base();
                let mut url = Url::parse(&base).map_err(|err| {
                    BackupError::Config(format!("invalid API endpoint {base:?}: {err}"))
                })?;
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("auth_token", &self.token);
                    query.append_pair("page", &page.to_string());
                }
                if self.created_after > 0 {
                    if let Some(param) = self.route.watermark_param() {
                        url.query_pairs_mut()
                            .append_pair(param, &self.created_after.to_string());
                    }
                }
                Ok(url.into())
            }
            // The upstream "next" link is already absolute, but it does not
            // reliably preserve the watermark filter. Re-appending it here is
            // deliberate; dropping this would silently widen the next pages
            // to the full history.
            PageCursor::Next(link) => {
                let mut url = Url::parse(link).map_err(|err| {
                    BackupError::Decode(format!("invalid next link {link:?}: {err}"))
                })?;
                if self.created_after > 0 {
                    if let Some(param) = self.route.watermark_param() {
                        set_query_param(&mut url, param, &self.created_after.to_string());
                    }
                }
                Ok(url.into())
            }
            PageCursor::End => Err(BackupError::Config(
                "cannot build a URL for an exhausted cursor".into(),
            )),
        }
    }

    fn route_base(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        match self.route {
            PageRoute::Projects => endpoint.to_string(),
            PageRoute::Faults { project_id } => format!("{endpoint}/{project_id}/faults"),
            PageRoute::Notices {
                project_id,
                fault_id,
            } => format!("{endpoint}/{project_id}/faults/{fault_id}/notices"),
        }
    }
}

/// Replaces `name` in the URL's query, dropping any existing occurrence.
fn set_query_param(url: &mut Url, name: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, val)| (key.into_owned(), val.into_owned()))
        .collect();
    let mut query = url.query_pairs_mut();
    query.clear();
    for (key, val) in &kept {
        query.append_pair(key, val);
    }
    query.append_pair(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ENDPOINT: &str = "https://api.example.com/v2/projects";

    fn request(route: PageRoute, created_after: i64) -> PageRequest {
        PageRequest {
            endpoint: ENDPOINT.to_string(),
            token: "secret".to_string(),
            route,
            created_after,
        }
    }

    #[test]
    fn projects_url_carries_token_and_page_but_no_filter() {
        let url = request(PageRoute::Projects, 1_234)
            .url_for(&PageCursor::Page(3))
            .unwrap();
        assert_eq!(
            url,
            "https://api.example.com/v2/projects?auth_token=secret&page=3"
        );
    }

    #[test]
    fn faults_url_is_scoped_and_filtered() {
        let url = request(PageRoute::Faults { project_id: 42 }, 1_234)
            .url_for(&PageCursor::Page(1))
            .unwrap();
        assert_eq!(
            url,
            "https://api.example.com/v2/projects/42/faults?auth_token=secret&page=1&occurred_after=1234"
        );
    }

    #[test]
    fn notices_url_nests_under_the_fault() {
        let url = request(
            PageRoute::Notices {
                project_id: 42,
                fault_id: 7,
            },
            0,
        )
        .url_for(&PageCursor::Page(2))
        .unwrap();
        assert_eq!(
            url,
            "https://api.example.com/v2/projects/42/faults/7/notices?auth_token=secret&page=2"
        );
    }

    #[test]
    fn next_link_gets_the_filter_reappended() {
        let link = "https://api.example.com/v2/projects/42/faults/7/notices?auth_token=secret&page=2&created_after=9";
        let url = request(
            PageRoute::Notices {
                project_id: 42,
                fault_id: 7,
            },
            1_234,
        )
        .url_for(&PageCursor::Next(link.to_string()))
        .unwrap();
        // The stale created_after=9 from the link is replaced, not duplicated.
        assert_eq!(
            url,
            "https://api.example.com/v2/projects/42/faults/7/notices?auth_token=secret&page=2&created_after=1234"
        );
    }

    #[test]
    fn next_link_is_used_verbatim_without_a_watermark() {
        let link = "https://api.example.com/v2/projects/42/faults?auth_token=secret&page=5";
        let url = request(PageRoute::Faults { project_id: 42 }, 0)
            .url_for(&PageCursor::Next(link.to_string()))
            .unwrap();
        assert_eq!(url, link);
    }

    #[test]
    fn page_cursor_prefers_next_link_over_page_numbers() {
        let page: FaultPage = serde_json::from_value(json!({
            "results": [],
            "current_page": 1,
            "num_pages": 3,
            "links": { "next": "https://api.example.com/v2/projects/1/faults?page=2" }
        }))
        .unwrap();
        assert_eq!(
            page.next_cursor(),
            PageCursor::Next("https://api.example.com/v2/projects/1/faults?page=2".to_string())
        );
    }

    #[test]
    fn page_cursor_falls_back_to_page_numbers() {
        let page: FaultPage = serde_json::from_value(json!({
            "results": [],
            "current_page": 1,
            "num_pages": 3,
            "links": { "next": "" }
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), PageCursor::Page(2));
    }

    #[test]
    fn last_page_is_terminal() {
        let page: ProjectPage = serde_json::from_value(json!({
            "results": [],
            "current_page": 3,
            "num_pages": 3
        }))
        .unwrap();
        assert_eq!(page.next_cursor(), PageCursor::End);
    }

    #[test]
    fn opaque_record_fields_survive_a_round_trip() {
        let raw = json!({
            "id": 42,
            "name": "Checkout Service",
            "fault_count": 3,
            "environments": [{"name": "production"}],
            "owner": {"email": "ops@example.com"}
        });
        let project: Project = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(project.id, 42);
        assert_eq!(project.fault_count, 3);
        assert_eq!(serde_json::to_value(&project).unwrap(), raw);
    }
}
