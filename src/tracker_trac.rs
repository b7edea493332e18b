//! Trac backend, via the tab-separated ticket export (`?format=tab`).
//!
//! The `/ticket` URL pattern is loose enough to match pages that are not
//! Trac at all, so for trackers recognized from a raw URL (dotted names)
//! both fetch and parse failures are logged and the lookup yields nothing.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<url>(?P<desc>[^\s/]+)\S*?/ticket)(?:/|\?|$)").expect("valid trac url pattern")
});

pub struct TracBackend {
    transport: Arc<dyn Transport>,
}

impl TracBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Recognize `<host>/.../ticket/<n>` URLs.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let caps = URL_RE.captures(strip_scheme(url))?;
        let desc = &caps["desc"];
        Some(TrackerIdentity::new(
            desc,
            format!("https://{}", &caps["url"]),
            desc,
            TrackerKind::Trac,
        ))
    }
}

#[async_trait]
impl Backend for TracBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Trac
    }

    fn description(&self) -> &str {
        "Trac"
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
        let url = format!("{}/{}?format=tab", tracker.base_url, bug_id);
        let body = match self.transport.get(&url).await {
            Ok(body) => body,
            Err(e) => {
                if tracker.is_dotted() {
                    let err = TrackerError::fetch(&tracker.description, e, url);
                    tracing::warn!(tracker = %tracker.name, error = %err, "skipping trac lookup");
                    return Ok(None);
                }
                // Trac answers unknown tickets with an internal error.
                if e.status() == Some(500) {
                    return Err(TrackerError::NotFound);
                }
                return Err(TrackerError::fetch(&tracker.description, e, url));
            }
        };

        match parse_tab(tracker, bug_id, &body) {
            Ok(record) => Ok(Some(record)),
            Err(cause) => {
                let err = TrackerError::parse(&tracker.description, cause, url);
                if tracker.is_dotted() {
                    tracing::warn!(tracker = %tracker.name, error = %err, "skipping trac lookup");
                    return Ok(None);
                }
                Err(err)
            }
        }
    }
}

/// Read one ticket from the tab-separated export: a header row naming
/// the columns, then the ticket row.
fn parse_tab(tracker: &TrackerIdentity, bug_id: &str, raw: &str) -> Result<BugRecord, String> {
    let raw = raw.replace("\r\n", "\n");
    let (header, rest) = raw
        .split_once('\n')
        .ok_or_else(|| "missing ticket row".to_string())?;
    let headers: Vec<&str> = header.trim().split('\t').collect();
    let values: Vec<&str> = rest.trim().split('\t').collect();

    let column = |name: &str| -> Option<String> {
        let idx = headers.iter().position(|h| *h == name)?;
        values.get(idx).map(|v| v.to_string())
    };
    let required = |name: &str| column(name).ok_or_else(|| format!("missing column '{}'", name));

    let title = required("summary")?;
    let status = required("status")?;
    let component = required("component")?;
    let severity = if headers.contains(&"severity") {
        column("severity")
    } else {
        column("priority")
    }
    .unwrap_or_default();

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: component,
        title,
        severity,
        status,
        assignee: column("owner").unwrap_or_default(),
        url: format!("{}/{}", tracker.base_url, bug_id),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> TrackerIdentity {
        TracBackend::recognize_url("https://trac.example.org/project/ticket/12").unwrap()
    }

    #[test]
    fn recognizes_ticket_urls() {
        let t = tracker();
        assert_eq!(t.name, "trac.example.org");
        assert_eq!(t.base_url, "https://trac.example.org/project/ticket");
        assert_eq!(t.kind, TrackerKind::Trac);

        assert!(TracBackend::recognize_url("trac.example.org/ticket").is_some());
        assert!(TracBackend::recognize_url("sourceforge.net/p/x/tickets/1").is_none());
        assert!(TracBackend::recognize_url("example.org/wiki/Start").is_none());
    }

    #[test]
    fn parses_tab_export() {
        let raw = "id\tsummary\treporter\towner\tstatus\tcomponent\tpriority\r\n\
                   12\tSegfault on exit\tann\tbob\tnew\tcore\tmajor\r\n";
        let rec = parse_tab(&tracker(), "12", raw).unwrap();
        assert_eq!(rec.title, "Segfault on exit");
        assert_eq!(rec.assignee, "bob");
        assert_eq!(rec.status, "new");
        assert_eq!(rec.product, "core");
        assert_eq!(rec.severity, "major");
        assert_eq!(rec.url, "https://trac.example.org/project/ticket/12");
    }

    #[test]
    fn severity_wins_over_priority() {
        let raw = "summary\tstatus\tcomponent\tseverity\tpriority\nS\tclosed\tui\tblocker\tlow\n";
        let rec = parse_tab(&tracker(), "1", raw).unwrap();
        assert_eq!(rec.severity, "blocker");
        assert!(rec.assignee.is_empty());
    }

    #[test]
    fn missing_required_column_fails() {
        let raw = "summary\tstatus\nS\tnew\n";
        let err = parse_tab(&tracker(), "1", raw).unwrap_err();
        assert!(err.contains("component"));

        assert!(parse_tab(&tracker(), "1", "<html>not trac</html>").is_err());
    }
}
