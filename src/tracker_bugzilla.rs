//! Bugzilla backend.
//!
//! Uses the REST API (`/rest/bug/<id>`) and falls back to the deprecated
//! `show_bug.cgi?ctype=xml` page when the installation answers 404 or
//! reports that its REST interface is disabled.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::text::{decode_base64, html_to_text};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;
use crate::xml::XmlNode;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>(?P<desc>[^\s/]+)\S*)/show_bug\.cgi").expect("valid bugzilla url pattern")
});

static REST_UNAVAILABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<div id="error_msg"[^>]*>\s*The REST Interface feature is not\s+available in this Bugzilla.\s*</div>"#,
    )
    .expect("valid bugzilla marker pattern")
});

/// Error codes Bugzilla uses for missing or invalid bug ids.
const REST_NOT_FOUND_CODES: [i64; 2] = [100, 101];

pub struct BugzillaBackend {
    transport: Arc<dyn Transport>,
}

impl BugzillaBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Recognize `<host>/.../show_bug.cgi` URLs.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let caps = URL_RE.captures(strip_scheme(url))?;
        let desc = &caps["desc"];
        Some(TrackerIdentity::new(
            desc,
            format!("https://{}", &caps["url"]),
            desc,
            TrackerKind::Bugzilla,
        ))
    }

    async fn fetch_rest(&self, tracker: &TrackerIdentity, bug_id: &str) -> TrackerResult<BugRecord> {
        let url = format!("{}/rest/bug/{}", tracker.base_url, bug_id);
        match self.transport.get(&url).await {
            Ok(body) if REST_UNAVAILABLE_RE.is_match(&body) => {
                tracing::debug!(tracker = %tracker.name, "REST interface disabled, using XML");
                self.fetch_xml(tracker, bug_id).await
            }
            Ok(body) => parse_rest(tracker, bug_id, &body, &url),
            Err(e) if e.status() == Some(404) || REST_UNAVAILABLE_RE.is_match(e.body()) => {
                tracing::debug!(tracker = %tracker.name, "REST endpoint missing, using XML");
                self.fetch_xml(tracker, bug_id).await
            }
            Err(e) => Err(TrackerError::fetch(&tracker.description, e, url)),
        }
    }

    async fn fetch_xml(&self, tracker: &TrackerIdentity, bug_id: &str) -> TrackerResult<BugRecord> {
        let url = format!("{}/show_bug.cgi?id={}&ctype=xml", tracker.base_url, bug_id);
        let body = self
            .transport
            .get(&url)
            .await
            .map_err(|e| TrackerError::fetch(&tracker.description, e, url.clone()))?;
        parse_xml(tracker, bug_id, &body, &url)
    }
}

#[async_trait]
impl Backend for BugzillaBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Bugzilla
    }

    fn description(&self) -> &str {
        "Bugzilla"
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
        self.fetch_rest(tracker, bug_id).await.map(Some)
    }
}

// ============ REST ============

#[derive(Debug, Deserialize)]
struct RestResponse {
    #[serde(default)]
    bugs: Vec<RestBug>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestBug {
    product: String,
    summary: String,
    severity: String,
    status: String,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    assigned_to_detail: Option<RestUser>,
}

#[derive(Debug, Deserialize)]
struct RestUser {
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    name: String,
}

fn parse_rest(
    tracker: &TrackerIdentity,
    bug_id: &str,
    body: &str,
    url: &str,
) -> TrackerResult<BugRecord> {
    let resp: RestResponse = serde_json::from_str(body)
        .map_err(|e| TrackerError::parse(&tracker.description, e, url))?;

    if resp.error {
        if resp.code.is_some_and(|c| REST_NOT_FOUND_CODES.contains(&c)) {
            return Err(TrackerError::NotFound);
        }
        let message = resp.message.unwrap_or_else(|| "unknown error".to_string());
        return Err(TrackerError::refused(
            &tracker.description,
            format!("Could not get {} bug #{}: {}", tracker.description, bug_id, message),
            url,
        ));
    }

    let bug = resp
        .bugs
        .into_iter()
        .next()
        .ok_or_else(|| TrackerError::parse(&tracker.description, "no bugs in response", url))?;

    let status = match bug.resolution.as_deref() {
        Some(res) if !res.is_empty() => format!("{}: {}", bug.status, res),
        _ => bug.status,
    };
    let assignee = match bug.assigned_to_detail {
        Some(user) if !user.real_name.is_empty() => user.real_name,
        Some(user) => user.name,
        None => String::new(),
    };

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: bug.product,
        title: bug.summary,
        severity: bug.severity,
        status,
        assignee,
        url: format!("{}/show_bug.cgi?id={}", tracker.base_url, bug_id),
        ..Default::default()
    })
}

// ============ XML (deprecated) ============

/// Text of the first `tag` element under `bug`, base64-decoded when the
/// element says so, with markup stripped.
fn node_text(bug: &XmlNode, tag: &str) -> Result<String, String> {
    let node = bug
        .descendant(tag)
        .ok_or_else(|| format!("missing <{}>", tag))?;
    if !node.has_text() {
        return Err(format!("<{}> has no text", tag));
    }
    let mut value = node.text().to_string();
    if node.attr("encoding") == Some("base64") {
        value = decode_base64(value.trim())
            .unwrap_or_else(|| "Cannot convert bug data from base64.".to_string());
    }
    Ok(html_to_text(&value, ""))
}

fn parse_xml(
    tracker: &TrackerIdentity,
    bug_id: &str,
    body: &str,
    url: &str,
) -> TrackerResult<BugRecord> {
    let root = XmlNode::parse(body).map_err(|e| TrackerError::parse(&tracker.description, e, url))?;
    let bug = if root.name == "bug" {
        &root
    } else {
        root.descendant("bug")
            .ok_or_else(|| TrackerError::parse(&tracker.description, "missing <bug>", url))?
    };

    if let Some(err) = bug.attr("error") {
        if err == "NotFound" || err == "InvalidBugId" {
            return Err(TrackerError::NotFound);
        }
        return Err(TrackerError::refused(
            &tracker.description,
            format!("Could not get {} bug #{}: {}", tracker.description, bug_id, err),
            url,
        ));
    }

    let parse = |e: String| TrackerError::parse(&tracker.description, e, url);
    let title = node_text(bug, "short_desc").map_err(parse)?;
    let mut status = node_text(bug, "bug_status").map_err(parse)?;
    if let Ok(resolution) = node_text(bug, "resolution") {
        status = format!("{}: {}", status, resolution);
    }
    let product = node_text(bug, "product").map_err(parse)?;
    let severity = node_text(bug, "bug_severity").map_err(parse)?;

    let assignee = bug
        .descendant("assigned_to")
        .and_then(|n| n.attr("name"))
        .filter(|name| !name.is_empty())
        .map(|name| html_to_text(name, ""))
        .or_else(|| node_text(bug, "assigned_to").ok())
        .unwrap_or_default();

    Ok(BugRecord {
        id: bug_id.to_string(),
        product,
        title,
        severity,
        status,
        assignee,
        url: format!("{}/show_bug.cgi?id={}", tracker.base_url, bug_id),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bmo() -> TrackerIdentity {
        TrackerIdentity::new("bmo", "https://bugzilla.mozilla.org", "Mozilla", TrackerKind::Bugzilla)
    }

    #[test]
    fn recognizes_show_bug_urls() {
        let t = BugzillaBackend::recognize_url("https://bugzilla.mozilla.org/show_bug.cgi?id=123").unwrap();
        assert_eq!(t.kind, TrackerKind::Bugzilla);
        assert_eq!(t.name, "bugzilla.mozilla.org");
        assert_eq!(t.base_url, "https://bugzilla.mozilla.org");

        let t = BugzillaBackend::recognize_url("bugs.kde.org/bugzilla/show_bug.cgi?id=1").unwrap();
        assert_eq!(t.base_url, "https://bugs.kde.org/bugzilla");
    }

    #[test]
    fn ignores_other_urls() {
        assert!(BugzillaBackend::recognize_url("github.com/a/b/issues/1").is_none());
        assert!(BugzillaBackend::recognize_url("mantisbt.org/bugs/view.php?id=1").is_none());
    }

    #[test]
    fn rest_status_includes_resolution_and_prefers_real_name() {
        let body = r#"{"bugs":[{"product":"Firefox","summary":"Crash on start","severity":"major",
            "status":"RESOLVED","resolution":"FIXED",
            "assigned_to_detail":{"real_name":"Jane Doe","name":"jane@example.org"}}]}"#;
        let rec = parse_rest(&bmo(), "5", body, "u").unwrap();
        assert_eq!(rec.status, "RESOLVED: FIXED");
        assert_eq!(rec.assignee, "Jane Doe");
        assert_eq!(rec.url, "https://bugzilla.mozilla.org/show_bug.cgi?id=5");
    }

    #[test]
    fn rest_falls_back_to_login_and_skips_empty_resolution() {
        let body = r#"{"bugs":[{"product":"Core","summary":"x","severity":"normal",
            "status":"NEW","resolution":"","assigned_to_detail":{"real_name":"","name":"nobody@mozilla.org"}}]}"#;
        let rec = parse_rest(&bmo(), "5", body, "u").unwrap();
        assert_eq!(rec.status, "NEW");
        assert_eq!(rec.assignee, "nobody@mozilla.org");
    }

    #[test]
    fn rest_error_object_maps_to_not_found() {
        let body = r#"{"error":true,"code":101,"message":"Bug #9 does not exist."}"#;
        assert!(parse_rest(&bmo(), "9", body, "u").unwrap_err().is_not_found());

        let body = r#"{"error":true,"code":102,"message":"You are not authorized"}"#;
        let err = parse_rest(&bmo(), "9", body, "u").unwrap_err();
        assert!(err.to_string().contains("not authorized"));
    }

    #[test]
    fn xml_error_attribute() {
        let body = r#"<bugzilla><bug error="NotFound"><bug_id>9</bug_id></bug></bugzilla>"#;
        assert!(parse_xml(&bmo(), "9", body, "u").unwrap_err().is_not_found());

        let body = r#"<bugzilla><bug error="NotPermitted"/></bugzilla>"#;
        let err = parse_xml(&bmo(), "9", body, "u").unwrap_err();
        assert!(err.to_string().contains("NotPermitted"));
    }

    #[test]
    fn xml_decodes_base64_fields() {
        let body = r#"<bugzilla><bug>
            <short_desc encoding="base64">SGVsbG8=</short_desc>
            <bug_status>NEW</bug_status>
            <product>Core</product>
            <bug_severity>normal</bug_severity>
            <assigned_to>dev@example.org</assigned_to>
        </bug></bugzilla>"#;
        let rec = parse_xml(&bmo(), "1", body, "u").unwrap();
        assert_eq!(rec.title, "Hello");
        assert_eq!(rec.status, "NEW");
        assert_eq!(rec.assignee, "dev@example.org");
    }

    #[test]
    fn xml_missing_field_is_parse_error() {
        let body = r#"<bugzilla><bug><short_desc>x</short_desc></bug></bugzilla>"#;
        let err = parse_xml(&bmo(), "1", body, "u").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("bug_status"));
    }
}
