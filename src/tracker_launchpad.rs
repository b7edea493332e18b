//! Launchpad backend.
//!
//! Two code paths:
//!
//! - **API session** ([`LaunchpadSession`]): the `api.launchpad.net` REST
//!   API. Preferred whenever the composing application provides a session.
//! - **`+text` pages** (deprecated): RFC 822-style text blocks, one for the
//!   bug and one per task.
//!
//! Both follow duplicate links until a bug that is not a duplicate, rank
//! the bug's tasks with [`crate::ranking`], and report the duplicates they
//! walked through in traversal order (the requested id first).

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::{FetchError, Transport};
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::ranking::{select_task, select_task_index, BugTask};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:bugs\.)?launchpad\.net/(?:[^\s/]+/)*(?:\+bug|bugs)/\d+")
        .expect("valid launchpad url pattern")
});

static ASSIGNEE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \([^)]*\)$").expect("valid assignee suffix pattern"));

/// Duplicate chains longer than this are treated as a loop.
const MAX_DUPLICATE_DEPTH: usize = 32;

// ═══════════════════════════════════════════════════════════════════════
// API session
// ═══════════════════════════════════════════════════════════════════════

/// An anonymous session against the Launchpad REST API.
///
/// Built once by the application and handed to [`LaunchpadBackend`];
/// read-only afterwards, so it is safe to share between concurrent fetches.
#[derive(Clone)]
pub struct LaunchpadSession {
    transport: Arc<dyn Transport>,
    api_root: String,
}

enum ApiError {
    Fetch(FetchError),
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Fetch(e) => write!(f, "{}", e),
            ApiError::Decode(e) => write!(f, "{}", e),
        }
    }
}

impl LaunchpadSession {
    pub fn new(transport: Arc<dyn Transport>, api_root: impl Into<String>) -> Self {
        Self {
            transport,
            api_root: api_root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub fn bug_url(&self, bug_id: &str) -> String {
        format!("{}/bugs/{}", self.api_root, bug_id)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let body = self.transport.get(url).await.map_err(ApiError::Fetch)?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiBug {
    id: u64,
    title: String,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    duplicate_of_link: Option<String>,
    #[serde(default)]
    users_affected_count_with_dupes: i64,
    #[serde(default)]
    heat: i64,
    bug_tasks_collection_link: String,
}

#[derive(Debug, Deserialize)]
struct ApiTaskCollection {
    #[serde(default)]
    entries: Vec<ApiTask>,
}

#[derive(Debug, Deserialize)]
struct ApiTask {
    status: String,
    importance: String,
    #[serde(default)]
    assignee_link: Option<String>,
    bug_target_display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPerson {
    display_name: String,
}

/// The bug number Launchpad embeds at the end of a 404 body, e.g.
/// `Object: <Bug ...>, name: '123456'`.
fn bug_number_from_payload(body: &str) -> Option<String> {
    let last = body.split_whitespace().last()?;
    let number = last
        .trim_start_matches('u')
        .trim_matches(|c: char| !c.is_ascii_digit());
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then(|| number.to_string())
}

/// Last path segment of an API link (`.../bugs/123` → `123`).
fn link_id(link: &str) -> &str {
    link.trim_end_matches('/').rsplit('/').next().unwrap_or(link)
}

// ═══════════════════════════════════════════════════════════════════════
// Backend
// ═══════════════════════════════════════════════════════════════════════

pub struct LaunchpadBackend {
    transport: Arc<dyn Transport>,
    session: Option<LaunchpadSession>,
}

impl LaunchpadBackend {
    pub fn new(transport: Arc<dyn Transport>, session: Option<LaunchpadSession>) -> Self {
        Self { transport, session }
    }

    /// Recognize `launchpad.net/bugs/<n>` and `bugs.launchpad.net/<target>/+bug/<n>`.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        URL_RE.is_match(strip_scheme(url)).then(|| {
            TrackerIdentity::new(
                "launchpad",
                "https://launchpad.net",
                "Launchpad",
                TrackerKind::Launchpad,
            )
        })
    }

    fn web_url(tracker: &TrackerIdentity, bug_id: &str) -> String {
        format!("{}/bugs/{}", tracker.base_url, bug_id)
    }

    fn private_duplicate(tracker: &TrackerIdentity, bug_id: &str, dup_id: &str) -> TrackerError {
        TrackerError::refused(
            &tracker.description,
            format!(
                "Bug #{} is a duplicate of bug #{}, but it is private",
                bug_id, dup_id
            ),
            Self::web_url(tracker, dup_id),
        )
    }

    async fn fetch_api(
        &self,
        session: &LaunchpadSession,
        tracker: &TrackerIdentity,
        bug_id: &str,
    ) -> TrackerResult<BugRecord> {
        let context_url = Self::web_url(tracker, bug_id);
        let fetch_err = |e: ApiError| match e {
            ApiError::Fetch(e) => TrackerError::fetch(&tracker.description, e, context_url.clone()),
            ApiError::Decode(e) => TrackerError::parse(&tracker.description, e, context_url.clone()),
        };

        let mut bug: ApiBug = match session.get(&session.bug_url(bug_id)).await {
            Ok(bug) => bug,
            Err(ApiError::Fetch(FetchError::Status { status: 404, body })) => {
                return Err(match bug_number_from_payload(&body) {
                    Some(real) if real != bug_id => Self::private_duplicate(tracker, bug_id, &real),
                    _ => TrackerError::NotFound,
                });
            }
            Err(e) => return Err(fetch_err(e)),
        };

        let mut duplicates = Vec::new();
        loop {
            if bug.private {
                return Err(TrackerError::refused(
                    &tracker.description,
                    "This bug is private",
                    Self::web_url(tracker, &bug.id.to_string()),
                ));
            }
            let Some(link) = bug.duplicate_of_link.take() else {
                break;
            };
            duplicates.push(bug.id.to_string());
            if duplicates.len() > MAX_DUPLICATE_DEPTH {
                return Err(TrackerError::parse(
                    &tracker.description,
                    "duplicate chain does not terminate",
                    context_url.clone(),
                ));
            }
            bug = match session.get(&link).await {
                Ok(next) => next,
                Err(ApiError::Fetch(FetchError::Status { status: 404, .. })) => {
                    return Err(Self::private_duplicate(tracker, bug_id, link_id(&link)));
                }
                Err(e) => return Err(fetch_err(e)),
            };
        }

        let collection: ApiTaskCollection = session
            .get(&bug.bug_tasks_collection_link)
            .await
            .map_err(fetch_err)?;
        let mut tasks = Vec::with_capacity(collection.entries.len());
        let mut assignee_links = Vec::with_capacity(collection.entries.len());
        for t in collection.entries {
            tasks.push(BugTask {
                status: t.status,
                importance: t.importance,
                assignee: String::new(),
                target: t.bug_target_display_name,
            });
            assignee_links.push(t.assignee_link);
        }
        let chosen_idx = select_task_index(&tasks).ok_or_else(|| {
            TrackerError::parse(&tracker.description, "bug has no tasks", context_url.clone())
        })?;
        let chosen = &tasks[chosen_idx];
        let assignee_link = assignee_links.swap_remove(chosen_idx);

        // Assignee details can be private; that only blanks the field.
        let assignee = match assignee_link {
            Some(link) => session
                .get::<ApiPerson>(&link)
                .await
                .map(|p| p.display_name)
                .unwrap_or_default(),
            None => String::new(),
        };

        let id = bug.id.to_string();
        Ok(BugRecord {
            url: Self::web_url(tracker, &id),
            id,
            product: chosen.target.clone(),
            title: bug.title,
            severity: chosen.importance.clone(),
            status: chosen.status.clone(),
            assignee,
            extra_info: vec![
                format!("affected: {}", bug.users_affected_count_with_dupes),
                format!("heat: {}", bug.heat),
            ],
            duplicates,
        })
    }

    async fn fetch_text(&self, tracker: &TrackerIdentity, bug_id: &str) -> TrackerResult<BugRecord> {
        let mut current = bug_id.to_string();
        let mut duplicates = Vec::new();

        loop {
            let url = format!("{}/bugs/{}/+text", tracker.base_url, current);
            let body = match self.transport.get(&url).await {
                Ok(body) => body,
                Err(e) if e.status() == Some(404) => {
                    return Err(if duplicates.is_empty() {
                        TrackerError::NotFound
                    } else {
                        Self::private_duplicate(tracker, bug_id, &current)
                    });
                }
                Err(e) => return Err(TrackerError::fetch(&tracker.description, e, url)),
            };

            let (bug, tasks) = parse_text(&body)
                .map_err(|e| TrackerError::parse(&tracker.description, e, url.clone()))?;

            if let Some(dup) = bug.get("duplicate-of").filter(|d| !d.is_empty()) {
                duplicates.push(bug.get("bug").cloned().unwrap_or_else(|| current.clone()));
                if duplicates.len() > MAX_DUPLICATE_DEPTH {
                    return Err(TrackerError::parse(
                        &tracker.description,
                        "duplicate chain does not terminate",
                        url,
                    ));
                }
                current = dup.clone();
                continue;
            }

            let task = select_task(&tasks)
                .ok_or_else(|| TrackerError::parse(&tracker.description, "bug has no tasks", url.clone()))?;

            return Ok(BugRecord {
                id: current.clone(),
                product: task.target.clone(),
                title: bug.get("title").cloned().unwrap_or_default(),
                severity: task.importance.clone(),
                status: task.status.clone(),
                assignee: task.assignee.clone(),
                url: Self::web_url(tracker, &current),
                duplicates,
                ..Default::default()
            });
        }
    }
}

#[async_trait]
impl Backend for LaunchpadBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Launchpad
    }

    fn description(&self) -> &str {
        "Launchpad"
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        Self::recognize_url(url)
    }

    async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        _bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let record = match &self.session {
            Some(session) => self.fetch_api(session, tracker, bug_id).await?,
            None => self.fetch_text(tracker, bug_id).await?,
        };
        Ok(Some(record))
    }
}

// ============ +text parsing ============

/// Parse one `Key: value` block, joining indented continuation lines.
/// Keys are lowercased.
fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();
    let mut last: Option<String> = None;
    for line in block.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some(value) = last.as_ref().and_then(|k| headers.get_mut(k)) {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase();
            headers.insert(key.clone(), value.trim().to_string());
            last = Some(key);
        }
    }
    headers
}

/// Split a `+text` page into the bug block and its task blocks.
fn parse_text(body: &str) -> Result<(HashMap<String, String>, Vec<BugTask>), String> {
    let body = body.replace("\r\n", "\n");
    let data = body.split("\n\nContent-Type:").next().unwrap_or("");
    let mut blocks = data.split("\n\n").filter(|b| !b.trim().is_empty());

    let bug = parse_headers(blocks.next().ok_or("empty bug data")?);
    if !bug.contains_key("bug") && !bug.contains_key("title") {
        return Err("no bug header block".to_string());
    }

    let tasks = blocks
        .map(parse_headers)
        .map(|t| BugTask {
            status: t.get("status").cloned().unwrap_or_default(),
            importance: t.get("importance").cloned().unwrap_or_default(),
            assignee: t
                .get("assignee")
                .map(|a| ASSIGNEE_SUFFIX_RE.replace(a, "").into_owned())
                .unwrap_or_default(),
            target: t.get("task").cloned().unwrap_or_default(),
        })
        .collect();

    Ok((bug, tasks))
}
