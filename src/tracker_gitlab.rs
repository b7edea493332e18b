//! GitLab backend: issues, merge requests and commits of one project.
//!
//! GitLab runs on arbitrary hosts, so a URL shape alone cannot tell it
//! apart from Gitea or a plain web server. Recognition therefore fetches
//! the API endpoint the URL would map to and only claims the URL if a JSON
//! object comes back.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::{
    canonical_forge_path, first_line, is_json_object, retarget, short_hash, strip_scheme, trailing_id,
    TrackerIdentity, GITLAB_SEGMENTS,
};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<host>[^\s/]+)/(?P<project>[^\s/]+/[^\s/]+(?:/[^\s/]+)*?)/(?:-/)?(?:issues|merge_requests|commits?)",
    )
    .expect("valid gitlab url pattern")
});

static BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<origin>[^\s:]+://[^\s/]+)/(?P<project>[^\s/]+/[^\s/]+(?:/[^\s/]+)*?)/(?:-/)?(?P<endpoint>issues|merge_requests|commits?)$",
    )
    .expect("valid gitlab base pattern")
});

pub struct GitLabBackend {
    transport: Arc<dyn Transport>,
}

impl GitLabBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The identity `url` would have, without the validating fetch.
    /// The second element is the id to probe with.
    pub fn candidate(url: &str) -> Option<(TrackerIdentity, String)> {
        let url = strip_scheme(url);
        let m = URL_RE.captures(url)?;
        if &m["host"] == "github.com" {
            return None;
        }
        let whole = m.get(0)?;
        let desc = canonical_forge_path(whole.as_str());
        let probe = trailing_id(&url[whole.end()..]);
        let tracker = TrackerIdentity::new(
            desc.clone(),
            format!("https://{}", desc),
            desc,
            TrackerKind::GitLab,
        );
        Some((tracker, probe))
    }

    /// Project path (`group/sub/project`) of a GitLab tracker.
    pub fn project(tracker: &TrackerIdentity) -> Option<String> {
        BASE_RE
            .captures(&tracker.base_url)
            .map(|c| c["project"].to_string())
    }

    /// API endpoint for `bug_id`, retargeted by the hint.
    pub fn api_url(tracker: &TrackerIdentity, bug_id: &str, bug_type: Option<BugType>) -> Option<String> {
        let caps = BASE_RE.captures(&tracker.base_url)?;
        let url = format!(
            "{}/api/v4/projects/{}/{}/{}",
            &caps["origin"],
            caps["project"].replace('/', "%2F"),
            &caps["endpoint"],
            bug_id
        )
        .replace("/commit/", "/commits/");
        let url = retarget(&url, bug_type, &GITLAB_SEGMENTS);
        Some(url.replace("/commits/", "/repository/commits/"))
    }
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    title: String,
    state: String,
    #[serde(default)]
    assignees: Vec<ApiUser>,
    web_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    id: String,
    message: String,
    web_url: String,
}

#[async_trait]
impl Backend for GitLabBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::GitLab
    }

    fn description(&self) -> &str {
        "GitLab"
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        let (tracker, probe) = Self::candidate(url)?;
        let api = Self::api_url(&tracker, &probe, None)?;
        match self.transport.get(&api).await {
            Ok(body) if is_json_object(&body) => Some(tracker),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url = %api, error = %e, "gitlab probe failed");
                None
            }
        }
    }

    async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let url = Self::api_url(tracker, bug_id, bug_type).ok_or_else(|| {
            TrackerError::parse(&tracker.description, "not a GitLab project URL", tracker.base_url.clone())
        })?;
        let body = self
            .transport
            .get(&url)
            .await
            .map_err(|e| TrackerError::fetch(&tracker.description, e, url.clone()))?;
        parse_api(tracker, bug_id, &body, &url).map(Some)
    }
}

fn parse_api(
    tracker: &TrackerIdentity,
    bug_id: &str,
    body: &str,
    url: &str,
) -> TrackerResult<BugRecord> {
    let parse = |e: serde_json::Error| TrackerError::parse(&tracker.description, e, url);
    let product = GitLabBackend::project(tracker).unwrap_or_default();

    if url.contains("/commits/") {
        let commit: ApiCommit = serde_json::from_str(body).map_err(parse)?;
        return Ok(BugRecord {
            id: short_hash(&commit.id),
            product,
            title: first_line(&commit.message),
            url: commit.web_url,
            ..Default::default()
        });
    }

    let issue: ApiIssue = serde_json::from_str(body).map_err(parse)?;
    let status = if issue.state == "merged" {
        "Merged".to_string()
    } else {
        issue.state
    };
    let assignee = match issue.assignees.as_slice() {
        [] => String::new(),
        [one] => one.name.clone(),
        many => format!("{} people", many.len()),
    };
    Ok(BugRecord {
        id: bug_id.to_string(),
        product,
        title: issue.title,
        status,
        assignee,
        url: issue.web_url,
        ..Default::default()
    })
}
