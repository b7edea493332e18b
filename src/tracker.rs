//! Tracker identity and the URL helpers shared by recognizers.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::models::{BugType, TrackerKind};

/// A resolved tracker instance: one Bugzilla host, one GitHub repository,
/// one Trac installation, and so on.
///
/// Identities are created once (by a recognizer or from configuration)
/// and reused for every fetch. Two identities with the same base URL are
/// the same tracker, whatever their names say.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerIdentity {
    /// Lowercased short label (often the host name).
    pub name: String,
    /// Root URL every fetch URL is built from.
    pub base_url: String,
    /// Display string used in messages.
    pub description: String,
    pub kind: TrackerKind,
    /// Alternate short names.
    pub aliases: BTreeSet<String>,
}

impl TrackerIdentity {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        description: impl Into<String>,
        kind: TrackerKind,
    ) -> Self {
        Self {
            name: name.into().to_lowercase(),
            base_url: base_url.into(),
            description: description.into(),
            kind,
            aliases: BTreeSet::new(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases
            .into_iter()
            .map(|a| a.into().to_lowercase())
            .collect();
        self
    }

    /// Whether `name` is this tracker's name or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.name == name || self.aliases.contains(&name)
    }

    /// Trackers whose name contains a dot were recognized from a raw URL
    /// (the name is the host) rather than configured; some backends degrade
    /// to log-and-skip for those.
    pub fn is_dotted(&self) -> bool {
        self.name.contains('.')
    }
}

impl PartialEq for TrackerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.base_url == other.base_url
    }
}

impl Eq for TrackerIdentity {}

impl Hash for TrackerIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base_url.hash(state);
    }
}

impl fmt::Display for TrackerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Drop a leading `http://` or `https://` so recognizers see `host/path`.
pub fn strip_scheme(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Split `https://host/rest` into (`https://host`, `/rest`).
pub(crate) fn split_origin(url: &str) -> Option<(&str, &str)> {
    let after_scheme = url.find("://")? + 3;
    match url[after_scheme..].find('/') {
        Some(slash) => Some(url.split_at(after_scheme + slash)),
        None => Some((url, "")),
    }
}

/// The path segments a forge uses for its three overlapping endpoints.
pub(crate) struct EndpointSegments {
    pub issue: &'static str,
    pub pull: &'static str,
    pub commit: &'static str,
}

pub(crate) const GITHUB_SEGMENTS: EndpointSegments = EndpointSegments {
    issue: "/issues/",
    pull: "/pulls/",
    commit: "/commits/",
};

pub(crate) const GITLAB_SEGMENTS: EndpointSegments = EndpointSegments {
    issue: "/issues/",
    pull: "/merge_requests/",
    commit: "/commits/",
};

/// Rewrite an already built API URL to point at the endpoint the hint
/// asks for. Without a hint the URL is left alone.
pub(crate) fn retarget(url: &str, bug_type: Option<BugType>, seg: &EndpointSegments) -> String {
    let (target, others) = match bug_type {
        None => return url.to_string(),
        Some(BugType::Issue) => (seg.issue, [seg.pull, seg.commit]),
        Some(BugType::Pull) => (seg.pull, [seg.issue, seg.commit]),
        Some(BugType::Commit) => (seg.commit, [seg.issue, seg.pull]),
    };
    others
        .iter()
        .fold(url.to_string(), |acc, other| acc.replace(other, target))
}

/// Pull the trailing id out of a forge URL (`.../issues/42`, `.../commit/abc123`)
/// for the speculative recognition fetch.
pub(crate) fn trailing_id(rest: &str) -> String {
    rest.trim_start_matches('/')
        .split(['/', '?', '#'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("1")
        .to_string()
}

/// Abbreviated commit hash, as the forges display it.
pub(crate) fn short_hash(hash: &str) -> String {
    hash.chars().take(7).collect()
}

/// Subject line of a commit message.
pub(crate) fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}

/// `owner/repo` from `https://host/owner/repo/issues`.
pub(crate) fn owner_repo(base_url: &str) -> String {
    let parts: Vec<&str> = base_url.rsplitn(4, '/').collect();
    match parts.as_slice() {
        [_, repo, owner, _] => format!("{}/{}", owner, repo),
        _ => String::new(),
    }
}

/// Whether a speculative probe returned a JSON object.
pub(crate) fn is_json_object(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body).is_ok_and(|v| v.is_object())
}

/// Canonical forms for the singular web paths (`/pull`, `/commit`) that
/// single-item pages use.
pub(crate) fn canonical_forge_path(path: &str) -> String {
    if let Some(stem) = path.strip_suffix("/pull") {
        format!("{}/pulls", stem)
    } else if let Some(stem) = path.strip_suffix("/commit") {
        format!("{}/commits", stem)
    } else {
        path.to_string()
    }
}
