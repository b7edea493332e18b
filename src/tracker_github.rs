//! GitHub backend: issues, pull requests and commits of one repository.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::{
    canonical_forge_path, first_line, owner_repo, retarget, short_hash, strip_scheme, TrackerIdentity,
    GITHUB_SEGMENTS,
};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^github\.com/[^\s/]+/[^\s/]+/(issues|pulls?|commits?)")
        .expect("valid github url pattern")
});

pub struct GitHubBackend {
    transport: Arc<dyn Transport>,
}

impl GitHubBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Recognize `github.com/<owner>/<repo>/(issues|pull(s)|commit(s))`.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let desc = canonical_forge_path(URL_RE.find(strip_scheme(url))?.as_str());
        Some(TrackerIdentity::new(
            desc.clone(),
            format!("https://{}", desc),
            desc,
            TrackerKind::GitHub,
        ))
    }

    /// API endpoint for `bug_id`, retargeted by the hint.
    pub fn api_url(tracker: &TrackerIdentity, bug_id: &str, bug_type: Option<BugType>) -> String {
        let url = format!(
            "{}/{}",
            tracker.base_url.replacen("github.com", "api.github.com/repos", 1),
            bug_id
        )
        .replace("/pull/", "/pulls/")
        .replace("/commit/", "/commits/");
        retarget(&url, bug_type, &GITHUB_SEGMENTS)
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
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    commit: ApiCommitDetail,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
}

#[async_trait]
impl Backend for GitHubBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::GitHub
    }

    fn description(&self) -> &str {
        "GitHub"
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        Self::recognize_url(url)
    }

    async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let url = Self::api_url(tracker, bug_id, bug_type);
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

    if url.contains("/commits/") {
        let commit: ApiCommit = serde_json::from_str(body).map_err(parse)?;
        return Ok(BugRecord {
            id: short_hash(&commit.sha),
            product,
            title: first_line(&commit.commit.message),
            url: commit.html_url,
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
        assignee: issue.assignee.map(|a| a.login).unwrap_or_default(),
        url: issue.html_url,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_and_canonicalizes() {
        let t = GitHubBackend::recognize_url("https://github.com/Owner/Repo/pull/12").unwrap();
        assert_eq!(t.name, "github.com/owner/repo/pulls");
        assert_eq!(t.base_url, "https://github.com/Owner/Repo/pulls");
        assert_eq!(t.description, "github.com/Owner/Repo/pulls");

        let t = GitHubBackend::recognize_url("github.com/o/r/commit/abcdef0").unwrap();
        assert_eq!(t.base_url, "https://github.com/o/r/commits");

        assert!(GitHubBackend::recognize_url("github.com/o/r/wiki").is_none());
        assert!(GitHubBackend::recognize_url("gitlab.com/o/r/issues/1").is_none());
    }

    #[test]
    fn api_url_follows_hint() {
        let t = GitHubBackend::recognize_url("github.com/o/r/issues/1").unwrap();
        assert_eq!(
            GitHubBackend::api_url(&t, "5", None),
            "https://api.github.com/repos/o/r/issues/5"
        );
        assert_eq!(
            GitHubBackend::api_url(&t, "5", Some(BugType::Pull)),
            "https://api.github.com/repos/o/r/pulls/5"
        );
        assert_eq!(
            GitHubBackend::api_url(&t, "abc", Some(BugType::Commit)),
            "https://api.github.com/repos/o/r/commits/abc"
        );
    }

    #[test]
    fn merged_pull_reports_merged() {
        let t = GitHubBackend::recognize_url("github.com/o/r/pulls").unwrap();
        let body = r#"{"title": "Add x", "state": "closed", "merged": true,
            "assignee": {"login": "octocat"}, "html_url": "https://github.com/o/r/pull/7"}"#;
        let rec = parse_api(&t, "7", body, "https://api.github.com/repos/o/r/pulls/7").unwrap();
        assert_eq!(rec.status, "Merged");
        assert_eq!(rec.assignee, "octocat");
        assert_eq!(rec.product, "o/r");
        assert_eq!(rec.url, "https://github.com/o/r/pull/7");
    }

    #[test]
    fn issue_without_assignee() {
        let t = GitHubBackend::recognize_url("github.com/o/r/issues").unwrap();
        let body = r#"{"title": "Broken", "state": "open", "assignee": null,
            "html_url": "https://github.com/o/r/issues/3"}"#;
        let rec = parse_api(&t, "3", body, "https://api.github.com/repos/o/r/issues/3").unwrap();
        assert_eq!(rec.id, "3");
        assert_eq!(rec.status, "open");
        assert!(rec.assignee.is_empty());
    }

    #[test]
    fn commit_is_shape_shifted() {
        let t = GitHubBackend::recognize_url("github.com/o/r/commits").unwrap();
        let body = r#"{"sha": "0123456789abcdef", "commit": {"message": "Fix crash\n\nDetails"},
            "html_url": "https://github.com/o/r/commit/0123456789abcdef"}"#;
        let rec = parse_api(&t, "0123456789", body, "https://api.github.com/repos/o/r/commits/0123456789").unwrap();
        assert_eq!(rec.id, "0123456");
        assert_eq!(rec.title, "Fix crash");
        assert!(rec.status.is_empty());
        assert!(rec.assignee.is_empty());
    }
}
