//! Gitea (and Forgejo) backend.
//!
//! Like GitLab, Gitea is self-hosted under arbitrary names, so recognition
//! confirms the URL with a probe of the `/api/v1/repos/` endpoint.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::{
    canonical_forge_path, first_line, is_json_object, owner_repo, retarget, short_hash,
    split_origin, strip_scheme, trailing_id, TrackerIdentity, GITHUB_SEGMENTS,
};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<host>[^\s/]+)/[^\s/]+/[^\s/]+/(?:issues|pulls|commits?)")
        .expect("valid gitea url pattern")
});

pub struct GiteaBackend {
    transport: Arc<dyn Transport>,
}

impl GiteaBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The identity `url` would have, plus the id to probe with.
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
            TrackerKind::Gitea,
        );
        Some((tracker, probe))
    }

    /// API endpoint for `bug_id`, retargeted by the hint.
    pub fn api_url(tracker: &TrackerIdentity, bug_id: &str, bug_type: Option<BugType>) -> Option<String> {
        let (origin, path) = split_origin(&tracker.base_url)?;
        let url = format!("{}/api/v1/repos{}/{}", origin, path, bug_id)
            .replace("/commit/", "/commits/");
        let url = retarget(&url, bug_type, &GITHUB_SEGMENTS);
        Some(url.replace("/commits/", "/git/commits/"))
    }
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    title: String,
    state: String,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    assignee: Option<ApiUser>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
}

#[async_trait]
impl Backend for GiteaBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Gitea
    }

    fn description(&self) -> &str {
        "Gitea"
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        let (tracker, probe) = Self::candidate(url)?;
        let api = Self::api_url(&tracker, &probe, None)?;
        match self.transport.get(&api).await {
            Ok(body) if is_json_object(&body) => Some(tracker),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url = %api, error = %e, "gitea probe failed");
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
            TrackerError::parse(&tracker.description, "not a Gitea repository URL", tracker.base_url.clone())
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
    let product = owner_repo(&tracker.base_url);
    // Issues carry no html_url; their web page mirrors the API path.
    let web_url = |html: Option<String>| html.unwrap_or_else(|| url.replace("/api/v1/repos/", "/"));

    if url.contains("/commits/") {
        let commit: ApiCommit = serde_json::from_str(body).map_err(parse)?;
        return Ok(BugRecord {
            id: short_hash(&commit.sha),
            product,
            title: first_line(&commit.commit.message),
            url: web_url(commit.html_url),
            ..Default::default()
        });
    }

    let issue: ApiIssue = serde_json::from_str(body).map_err(parse)?;
    let status = if issue.merged == Some(true) {
        "Merged".to_string()
    } else {
        issue.state
    };
    Ok(BugRecord {
        id: bug_id.to_string(),
        product,
        title: issue.title,
        status,
        assignee: issue.assignee.map(|a| a.username).unwrap_or_default(),
        url: web_url(issue.html_url),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(url: &str) -> TrackerIdentity {
        GiteaBackend::candidate(url).unwrap().0
    }

    #[test]
    fn candidate_and_api_url() {
        let (t, probe) = GiteaBackend::candidate("https://codeberg.org/forgejo/forgejo/issues/99").unwrap();
        assert_eq!(t.name, "codeberg.org/forgejo/forgejo/issues");
        assert_eq!(t.kind, TrackerKind::Gitea);
        assert_eq!(probe, "99");
        assert_eq!(
            GiteaBackend::api_url(&t, "99", None).unwrap(),
            "https://codeberg.org/api/v1/repos/forgejo/forgejo/issues/99"
        );
        assert_eq!(
            GiteaBackend::api_url(&t, "99", Some(BugType::Pull)).unwrap(),
            "https://codeberg.org/api/v1/repos/forgejo/forgejo/pulls/99"
        );
        assert_eq!(
            GiteaBackend::api_url(&t, "abc", Some(BugType::Commit)).unwrap(),
            "https://codeberg.org/api/v1/repos/forgejo/forgejo/git/commits/abc"
        );

        let t = tracker("gitea.com/o/r/commit/abc");
        assert_eq!(t.base_url, "https://gitea.com/o/r/commits");
        assert_eq!(
            GiteaBackend::api_url(&t, "abc", None).unwrap(),
            "https://gitea.com/api/v1/repos/o/r/git/commits/abc"
        );

        assert!(GiteaBackend::candidate("github.com/o/r/pulls/1").is_none());
        assert!(GiteaBackend::candidate("codeberg.org/o/r/wiki").is_none());
    }

    #[test]
    fn issue_url_is_synthesized() {
        let t = tracker("codeberg.org/o/r/issues");
        let url = "https://codeberg.org/api/v1/repos/o/r/issues/4";
        let body = r#"{"title": "Bug", "state": "open", "assignee": {"username": "dev"}}"#;
        let rec = parse_api(&t, "4", body, url).unwrap();
        assert_eq!(rec.url, "https://codeberg.org/o/r/issues/4");
        assert_eq!(rec.assignee, "dev");
        assert_eq!(rec.product, "o/r");
    }

    #[test]
    fn merged_pull() {
        let t = tracker("codeberg.org/o/r/pulls");
        let url = "https://codeberg.org/api/v1/repos/o/r/pulls/5";
        let body = r#"{"title": "PR", "state": "closed", "merged": true, "assignee": null,
            "html_url": "https://codeberg.org/o/r/pulls/5"}"#;
        let rec = parse_api(&t, "5", body, url).unwrap();
        assert_eq!(rec.status, "Merged");
        assert_eq!(rec.url, "https://codeberg.org/o/r/pulls/5");
    }

    #[test]
    fn commit_record() {
        let t = tracker("codeberg.org/o/r/commits");
        let url = "https://codeberg.org/api/v1/repos/o/r/git/commits/abcdef1234";
        let body = r#"{"sha": "abcdef1234", "commit": {"message": "Tidy\n\nmore"},
            "html_url": "https://codeberg.org/o/r/commit/abcdef1234"}"#;
        let rec = parse_api(&t, "abcdef1234", body, url).unwrap();
        assert_eq!(rec.id, "abcdef1");
        assert_eq!(rec.title, "Tidy");
        assert!(rec.assignee.is_empty());
    }
}
