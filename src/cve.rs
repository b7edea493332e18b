//! CVE lookup.
//!
//! Not a bug tracker in the usual sense: ids are CVE numbers, the source
//! is one HTML page per entry, and the main consumer wants a single line
//! that fits into a chat message. [`CveBackend::describe`] produces that
//! line; the [`Backend`] impl exposes the same data as a [`BugRecord`].

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::config::CveConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::http::Transport;
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::text::{ellipsize, html_to_text};
use crate::tracker::{strip_scheme, TrackerIdentity};
use crate::traits::Backend;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^cve\.mitre\.org/cgi-bin/cvename\.cgi\?name=").expect("valid cve url pattern")
});

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<th[^>]*>Description</th>.*?<td[^>]*>\s*(?P<cve>.*?)\s*</td>")
        .expect("valid cve description pattern")
});

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<h2[^>]*>\s*(?P<err>.*?)\s*</h2>").expect("valid cve error pattern")
});

const DESCRIPTION: &str = "CVE";

pub struct CveBackend {
    transport: Arc<dyn Transport>,
    url_template: String,
    message_budget: usize,
}

impl CveBackend {
    pub fn new(transport: Arc<dyn Transport>, config: &CveConfig) -> Self {
        Self {
            transport,
            url_template: config.url.clone(),
            message_budget: config.message_budget,
        }
    }

    pub fn identity() -> TrackerIdentity {
        TrackerIdentity::new("cve", "https://cve.mitre.org", DESCRIPTION, TrackerKind::Cve)
    }

    /// Recognize `cve.mitre.org/cgi-bin/cvename.cgi?name=...` URLs.
    pub fn recognize_url(url: &str) -> Option<TrackerIdentity> {
        URL_RE.is_match(strip_scheme(url)).then(Self::identity)
    }

    /// Page URL for a CVE number, with or without the `CVE-` prefix.
    pub fn entry_url(&self, cve_id: &str) -> String {
        self.url_template.replace("{id}", strip_prefix(cve_id))
    }

    /// Fetch the plain-text description of `cve_id`.
    pub async fn lookup(&self, cve_id: &str) -> TrackerResult<String> {
        let url = self.entry_url(cve_id);
        let page = self
            .transport
            .get(&url)
            .await
            .map_err(|e| TrackerError::fetch(DESCRIPTION, e, url.clone()))?;
        parse_entry(&page, &url)
    }

    /// One line describing `cve_id`, sized to fit a message to `channel`,
    /// optionally followed by ` <url>`.
    pub async fn describe(&self, cve_id: &str, channel: &str, with_url: bool) -> TrackerResult<String> {
        let description = self.lookup(cve_id).await?;
        let url = self.entry_url(cve_id);
        Ok(bounded_description(
            &description,
            channel,
            with_url.then_some(url.as_str()),
            self.message_budget,
        ))
    }
}

fn strip_prefix(cve_id: &str) -> &str {
    let id = cve_id.trim();
    id.get(..4)
        .filter(|p| p.eq_ignore_ascii_case("cve-"))
        .map_or(id, |_| &id[4..])
}

/// Extract the description, or classify the error heading.
pub fn parse_entry(page: &str, url: &str) -> TrackerResult<String> {
    if let Some(caps) = DESCRIPTION_RE.captures(page) {
        return Ok(html_to_text(&caps["cve"], ""));
    }
    let caps = ERROR_RE
        .captures(page)
        .ok_or_else(|| TrackerError::unparseable(DESCRIPTION, url))?;
    let heading = html_to_text(&caps["err"], "");
    if heading.contains("Couldn't find") {
        return Err(TrackerError::NotFound);
    }
    Err(TrackerError::parse(DESCRIPTION, heading, url))
}

/// Fit `description` into `budget` characters minus the channel name and,
/// when given, the ` <url>` suffix; overflow is cut with `...`.
pub fn bounded_description(description: &str, channel: &str, url: Option<&str>, budget: usize) -> String {
    let mut max = budget.saturating_sub(channel.chars().count());
    if let Some(url) = url {
        max = max.saturating_sub(url.chars().count() + 3);
    }
    let mut line = ellipsize(description, max);
    if let Some(url) = url {
        line.push_str(&format!(" <{}>", url));
    }
    line
}

#[async_trait]
impl Backend for CveBackend {
    fn kind(&self) -> TrackerKind {
        TrackerKind::Cve
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        Self::recognize_url(url)
    }

    async fn fetch(
        &self,
        _tracker: &TrackerIdentity,
        bug_id: &str,
        _bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let title = self.lookup(bug_id).await?;
        Ok(Some(BugRecord {
            id: format!("CVE-{}", strip_prefix(bug_id)),
            title,
            url: self.entry_url(bug_id),
            ..Default::default()
        }))
    }
}
