//! MantisBT backend.
//!
//! The REST API (`/api/rest/issues/<id>`) is tried first. Installations
//! without it answer 404, and those get the legacy `mc_issue_get` SOAP
//! call. SOAP is often switched off too; for trackers recognized from a
//! raw URL that failure is logged and the lookup quietly yields nothing.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::soap::{SoapError, SoapSessions};
use crate::text::{html_to_text, maybe_decode_base64};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;
use crate::xml::XmlNode;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>(?P<desc>[^\s/]+)\S*)/view\.php").expect("valid mantis url pattern")
});

const SOAP_PATH: &str = "/api/soap/mantisconnect.php";
const SOAP_NAMESPACE: &str = "http://futureware.biz/mantisconnect";

pub struct MantisBackend {
    transport: Arc<dyn Transport>,
    sessions: SoapSessions,
}

#[derive(Debug, Deserialize)]
struct RestResponse {
    issues: Vec<RestIssue>,
}

#[derive(Debug, Deserialize)]
struct RestIssue {
    summary: String,
    project: Named,
    severity: Named,
    resolution: Named,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

impl MantisBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sessions: SoapSessions::new(SOAP_PATH, SOAP_NAMESPACE),
        }
    }

    /// Recognize `<host>/.../view.php` URLs.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let caps = URL_RE.captures(strip_scheme(url))?;
        let desc = &caps["desc"];
        Some(TrackerIdentity::new(
            desc,
            format!("https://{}", &caps["url"]),
            desc,
            TrackerKind::Mantis,
        ))
    }

    async fn fetch_rest(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
    ) -> TrackerResult<Option<BugRecord>> {
        let url = format!("{}/api/rest/issues/{}", tracker.base_url, bug_id);
        let body = match self.transport.get(&url).await {
            Ok(body) => body,
            Err(e) if e.status() == Some(404) => {
                tracing::debug!(tracker = %tracker.name, "REST API unavailable, using SOAP");
                return self.fetch_soap(tracker, bug_id).await;
            }
            Err(e) => return Err(TrackerError::fetch(&tracker.description, e, url)),
        };
        parse_rest(tracker, bug_id, &body, &url).map(Some)
    }

    async fn fetch_soap(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
    ) -> TrackerResult<Option<BugRecord>> {
        let url = view_url(tracker, bug_id);
        let client = self.sessions.client_for(&tracker.base_url);
        let params = [("username", ""), ("password", ""), ("issue_id", bug_id)];
        let issue = match client.call(self.transport.as_ref(), "mc_issue_get", &params).await {
            Ok(issue) => issue,
            Err(e) if is_missing_issue(&e, bug_id) => return Err(TrackerError::NotFound),
            Err(e) => {
                let err = TrackerError::fetch(&tracker.description, e, url);
                if tracker.is_dotted() {
                    tracing::warn!(tracker = %tracker.name, error = %err, "skipping mantis lookup");
                    return Ok(None);
                }
                return Err(err);
            }
        };
        parse_soap(tracker, bug_id, &issue, &url).map(Some)
    }
}

#[async_trait]
impl Backend for MantisBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Mantis
    }

    fn description(&self) -> &str {
        "Mantis"
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
        self.fetch_rest(tracker, bug_id).await
    }
}

fn view_url(tracker: &TrackerIdentity, bug_id: &str) -> String {
    format!("{}/view.php?id={}", tracker.base_url, bug_id)
}

fn is_missing_issue(err: &SoapError, bug_id: &str) -> bool {
    err.to_string().contains(&format!("Issue #{} not found", bug_id))
}

fn parse_rest(
    tracker: &TrackerIdentity,
    bug_id: &str,
    body: &str,
    url: &str,
) -> TrackerResult<BugRecord> {
    let resp: RestResponse = serde_json::from_str(body)
        .map_err(|e| TrackerError::parse(&tracker.description, e, url))?;
    let issue = resp
        .issues
        .into_iter()
        .next()
        .ok_or_else(|| TrackerError::parse(&tracker.description, "no issues in response", url))?;

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: issue.project.name,
        title: issue.summary,
        severity: issue.severity.name,
        status: issue.resolution.name,
        url: view_url(tracker, bug_id),
        ..Default::default()
    })
}

fn parse_soap(
    tracker: &TrackerIdentity,
    bug_id: &str,
    issue: &XmlNode,
    url: &str,
) -> TrackerResult<BugRecord> {
    if issue.child("id").is_none() {
        return Err(TrackerError::NotFound);
    }
    let text = |path: &[&str]| {
        issue
            .path(path)
            .map(|n| n.text().trim().to_string())
            .ok_or_else(|| {
                TrackerError::parse(&tracker.description, format!("missing {}", path.join(".")), url)
            })
    };

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: text(&["project", "name"])?,
        title: html_to_text(&maybe_decode_base64(&text(&["summary"])?), ""),
        severity: text(&["severity", "name"])?,
        status: text(&["resolution", "name"])?,
        url: url.to_string(),
        ..Default::default()
    })
}
