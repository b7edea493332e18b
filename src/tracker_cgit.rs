//! CGit backend: commits scraped from the HTML commit page.
//!
//! There is no API. One pattern has to find the repository name, the
//! commit hash and the subject line together, or the page is rejected.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::text::html_to_text;
use crate::tracker::{short_hash, strip_scheme, TrackerIdentity};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>(?P<desc>[^\s/]+\S*)/commit)/[^\s?]*\?(?:[^\s?&]+&)?id=(?P<id>[^\s&#]*)")
        .expect("valid cgit url pattern")
});

static COMMIT_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)<a href='[^\s']+'>index</a> : <a .*?href='[^\s']+'>(?P<repo>[^\s<]+)</a>.*?",
        r"\n<tr><th>commit</th><td .*?class='(?:sha1|oid)'><a href='[^\s']+'>(?P<hash>[a-f0-9]+)</a>.*?",
        r"\n<div class='commit-subject'>(?P<subj>.*?)</div>",
    ))
    .expect("valid cgit page pattern")
});

pub struct CGitBackend {
    transport: Arc<dyn Transport>,
}

/// Fields scraped from a commit page.
#[derive(Debug, PartialEq)]
pub struct CommitPage {
    pub repo: String,
    pub hash: String,
    pub subject: String,
}

impl CGitBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The identity `url` would have, plus the commit id to probe with.
    pub fn candidate(url: &str) -> Option<(TrackerIdentity, String)> {
        let caps = URL_RE.captures(strip_scheme(url))?;
        let desc = &caps["desc"];
        let tracker = TrackerIdentity::new(
            desc,
            format!("https://{}", &caps["url"]),
            desc,
            TrackerKind::CGit,
        );
        Some((tracker, caps["id"].to_string()))
    }

    pub fn commit_url(tracker: &TrackerIdentity, bug_id: &str) -> String {
        format!("{}/?id={}", tracker.base_url, bug_id)
    }
}

/// Scrape `html`; `None` unless all three fields are present.
pub fn parse_commit_page(html: &str) -> Option<CommitPage> {
    let caps = COMMIT_PAGE_RE.captures(html)?;
    Some(CommitPage {
        repo: caps["repo"].to_string(),
        hash: caps["hash"].to_string(),
        subject: html_to_text(&caps["subj"], " "),
    })
}

#[async_trait]
impl Backend for CGitBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::CGit
    }

    fn description(&self) -> &str {
        "CGit"
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        let (tracker, probe) = Self::candidate(url)?;
        let page = Self::commit_url(&tracker, &probe);
        match self.transport.get(&page).await {
            Ok(body) if parse_commit_page(&body).is_some() => Some(tracker),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(url = %page, error = %e, "cgit probe failed");
                None
            }
        }
    }

    async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        _bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let url = Self::commit_url(tracker, bug_id);
        let body = match self.transport.get(&url).await {
            Ok(body) => body,
            Err(e) if matches!(e.status(), Some(404 | 400)) => return Err(TrackerError::NotFound),
            Err(e) => return Err(TrackerError::fetch(&tracker.description, e, url)),
        };
        let page = parse_commit_page(&body)
            .ok_or_else(|| TrackerError::unparseable(&tracker.description, url.clone()))?;
        Ok(Some(BugRecord {
            id: short_hash(&page.hash),
            product: page.repo,
            title: page.subject,
            url,
            ..Default::default()
        }))
    }
}
