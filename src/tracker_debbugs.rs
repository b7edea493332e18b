//! Debbugs backend (bugs.debian.org and friends).
//!
//! Debbugs has no JSON interface; its SOAP `get_status` call is the only
//! machine-readable way in. A missing bug comes back as a response with no
//! `item` at all.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::soap::SoapSessions;
use crate::text::{html_to_text, maybe_decode_base64};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;
use crate::xml::XmlNode;

static CGI_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>(?P<desc>[^\s/]+)\S*?)/cgi-bin/bugreport\.cgi")
        .expect("valid debbugs url pattern")
});

static SHORT_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<desc>bugs\.debian\.org)/\d+").expect("valid debbugs short url pattern")
});

const SOAP_PATH: &str = "/cgi-bin/soap.cgi";
const SOAP_NAMESPACE: &str = "Debbugs/SOAP";

pub struct DebbugsBackend {
    transport: Arc<dyn Transport>,
    sessions: SoapSessions,
}

impl DebbugsBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sessions: SoapSessions::new(SOAP_PATH, SOAP_NAMESPACE),
        }
    }

    /// Recognize `<host>/cgi-bin/bugreport.cgi?bug=<n>` and `bugs.debian.org/<n>`.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let url = strip_scheme(url);
        let (root, desc) = if let Some(caps) = CGI_URL_RE.captures(url) {
            (caps["url"].to_string(), caps["desc"].to_string())
        } else {
            let caps = SHORT_URL_RE.captures(url)?;
            (caps["desc"].to_string(), caps["desc"].to_string())
        };
        Some(TrackerIdentity::new(
            desc.clone(),
            format!("https://{}", root),
            desc,
            TrackerKind::Debbugs,
        ))
    }
}

#[async_trait]
impl Backend for DebbugsBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Debbugs
    }

    fn description(&self) -> &str {
        "Debbugs"
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
        let url = format!("{}/cgi-bin/bugreport.cgi?bug={}", tracker.base_url, bug_id);
        let client = self.sessions.client_for(&tracker.base_url);
        let result = client
            .call(self.transport.as_ref(), "get_status", &[("bugs", bug_id)])
            .await
            .map_err(|e| TrackerError::fetch(&tracker.description, e, url.clone()))?;
        parse_status(tracker, bug_id, &result, &url).map(Some)
    }
}

fn parse_status(
    tracker: &TrackerIdentity,
    bug_id: &str,
    result: &XmlNode,
    url: &str,
) -> TrackerResult<BugRecord> {
    let item = result.child("item").ok_or(TrackerError::NotFound)?;
    let parse = |e: &str| TrackerError::parse(&tracker.description, e, url);

    let value = item.child("value").ok_or_else(|| parse("missing value"))?;
    let field = |name: &str| {
        value
            .child(name)
            .map(|n| n.text().trim().to_string())
            .ok_or_else(|| parse(&format!("missing {}", name)))
    };

    let title = html_to_text(&maybe_decode_base64(&field("subject")?), "");
    let package = field("package")?;
    let severity = field("severity")?;

    let fixed = value
        .child("fixed_versions")
        .is_some_and(|f| f.child("item").is_some());
    let done = value.child("done").is_some_and(|d| !d.text().trim().is_empty());
    let status = if fixed {
        "Fixed"
    } else if done {
        "Closed"
    } else {
        "Open"
    };

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: package,
        title,
        severity,
        status: status.to_string(),
        url: format!("{}/{}", tracker.base_url, bug_id),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debian() -> TrackerIdentity {
        TrackerIdentity::new("debian", "https://bugs.debian.org", "Debian", TrackerKind::Debbugs)
    }

    fn status_xml(value: &str) -> XmlNode {
        XmlNode::parse(&format!(
            "<s-gensym3><item><key>1</key><value>{}</value></item></s-gensym3>",
            value
        ))
        .unwrap()
    }

    #[test]
    fn recognizes_debbugs_urls() {
        let t = DebbugsBackend::recognize_url("https://bugs.debian.org/cgi-bin/bugreport.cgi?bug=1").unwrap();
        assert_eq!(t.kind, TrackerKind::Debbugs);
        assert_eq!(t.name, "bugs.debian.org");
        assert_eq!(t.base_url, "https://bugs.debian.org");

        let t = DebbugsBackend::recognize_url("bugs.debian.org/987654").unwrap();
        assert_eq!(t.base_url, "https://bugs.debian.org");

        let t = DebbugsBackend::recognize_url("debbugs.gnu.org/cgi-bin/bugreport.cgi?bug=2").unwrap();
        assert_eq!(t.name, "debbugs.gnu.org");

        assert!(DebbugsBackend::recognize_url("bugzilla.mozilla.org/show_bug.cgi?id=1").is_none());
    }

    #[test]
    fn missing_item_is_not_found() {
        let empty = XmlNode::parse("<s-gensym3/>").unwrap();
        assert!(parse_status(&debian(), "1", &empty, "u").unwrap_err().is_not_found());
    }

    #[test]
    fn status_derivation() {
        let fixed = status_xml(
            "<package>vim</package><subject>x</subject><severity>normal</severity>\
             <done>a@b</done><fixed_versions><item>9.0-1</item></fixed_versions>",
        );
        assert_eq!(parse_status(&debian(), "1", &fixed, "u").unwrap().status, "Fixed");

        let closed = status_xml(
            "<package>vim</package><subject>x</subject><severity>normal</severity>\
             <done>a@b</done><fixed_versions/>",
        );
        assert_eq!(parse_status(&debian(), "1", &closed, "u").unwrap().status, "Closed");

        let open = status_xml(
            "<package>vim</package><subject>x</subject><severity>normal</severity><done></done>",
        );
        let rec = parse_status(&debian(), "1", &open, "u").unwrap();
        assert_eq!(rec.status, "Open");
        assert_eq!(rec.product, "vim");
        assert_eq!(rec.url, "https://bugs.debian.org/1");
        assert!(rec.assignee.is_empty());
    }

    #[test]
    fn base64_subject_is_decoded_only_when_valid() {
        let encoded = status_xml(
            "<package>p</package><subject>SGVsbG8=</subject><severity>wishlist</severity>",
        );
        assert_eq!(parse_status(&debian(), "1", &encoded, "u").unwrap().title, "Hello");

        let plain = status_xml(
            "<package>p</package><subject>Hello, world</subject><severity>wishlist</severity>",
        );
        assert_eq!(parse_status(&debian(), "1", &plain, "u").unwrap().title, "Hello, world");
    }

    #[test]
    fn decoded_subject_is_plain_text() {
        let marked_up = status_xml(
            "<package>p</package><subject>PGI+Q3Jhc2g8L2I+ICBpbiBscw==</subject><severity>normal</severity>",
        );
        assert_eq!(parse_status(&debian(), "1", &marked_up, "u").unwrap().title, "Crash in ls");
    }

    #[test]
    fn missing_package_is_parse_error() {
        let broken = status_xml("<subject>x</subject><severity>normal</severity>");
        let err = parse_status(&debian(), "1", &broken, "u").unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("package"));
    }
}
