//! SourceForge (Allura) backend.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sourceforge\.net/p/[^\s/]+/(bugs|tickets|feature-requests|patches|todo)")
        .expect("valid sourceforge url pattern")
});

pub struct SourceForgeBackend {
    transport: Arc<dyn Transport>,
}

impl SourceForgeBackend {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Recognize `sourceforge.net/p/<project>/<tool>` URLs.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        let desc = URL_RE.find(strip_scheme(url))?.as_str();
        Some(TrackerIdentity::new(
            desc,
            format!("https://{}", desc),
            desc,
            TrackerKind::SourceForge,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TicketResponse {
    ticket: Ticket,
}

#[derive(Debug, Deserialize)]
struct Ticket {
    summary: String,
    status: String,
    #[serde(default)]
    assigned_to: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    custom_fields: HashMap<String, serde_json::Value>,
}

#[async_trait]
impl Backend for SourceForgeBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::SourceForge
    }

    fn description(&self) -> &str {
        "SourceForge"
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
        let url = format!(
            "{}/{}/",
            tracker.base_url.replacen("sourceforge.net", "sourceforge.net/rest", 1),
            bug_id
        );
        let body = self
            .transport
            .get(&url)
            .await
            .map_err(|e| TrackerError::fetch(&tracker.description, e, url.clone()))?;
        parse_ticket(tracker, bug_id, &body, &url).map(Some)
    }
}

fn parse_ticket(
    tracker: &TrackerIdentity,
    bug_id: &str,
    body: &str,
    url: &str,
) -> TrackerResult<BugRecord> {
    let TicketResponse { ticket } = serde_json::from_str(body)
        .map_err(|e| TrackerError::parse(&tracker.description, e, url))?;

    let severity = match ticket.custom_fields.get("_priority") {
        Some(serde_json::Value::String(p)) => format!("Pri: {}", p),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => format!("Pri: {}", other),
    };
    // "closed-fixed" reads as "closed: fixed"
    let status = ticket.status.split('-').collect::<Vec<_>>().join(": ");

    Ok(BugRecord {
        id: bug_id.to_string(),
        product: ticket.labels.into_iter().next().unwrap_or_default(),
        title: ticket.summary,
        severity,
        status,
        assignee: ticket.assigned_to.unwrap_or_default(),
        url: format!("{}/{}/", tracker.base_url, bug_id),
        ..Default::default()
    })
}
