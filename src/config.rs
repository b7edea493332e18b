//! TOML configuration.
//!
//! ```toml
//! [http]
//! timeout_secs = 15
//! user_agent = "bugtracker/0.1"
//!
//! [launchpad]
//! use_api = true
//! api_root = "https://api.launchpad.net/devel"
//!
//! [cve]
//! url = "https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-{id}"
//! message_budget = 450
//!
//! [[trackers]]
//! name = "ubuntu"
//! url = "https://launchpad.net"
//! description = "Launchpad"
//! kind = "launchpad"
//! aliases = ["lp"]
//! ```
//!
//! Every section is optional. Without any `[[trackers]]` the built-in
//! defaults (Launchpad and Debian) are used.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::models::TrackerKind;
use crate::tracker::TrackerIdentity;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub launchpad: LaunchpadConfig,
    #[serde(default)]
    pub cve: CveConfig,
    #[serde(default)]
    pub trackers: Vec<TrackerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    format!("bugtracker/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct LaunchpadConfig {
    /// Prefer the REST API over the deprecated `+text` pages.
    #[serde(default = "default_true")]
    pub use_api: bool,
    #[serde(default = "default_api_root")]
    pub api_root: String,
}

impl Default for LaunchpadConfig {
    fn default() -> Self {
        Self {
            use_api: true,
            api_root: default_api_root(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_api_root() -> String {
    "https://api.launchpad.net/devel".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CveConfig {
    /// Lookup URL; `{id}` is replaced by the CVE number without the
    /// `CVE-` prefix.
    #[serde(default = "default_cve_url")]
    pub url: String,
    /// Maximum length of a chat message the description must fit in.
    #[serde(default = "default_message_budget")]
    pub message_budget: usize,
}

impl Default for CveConfig {
    fn default() -> Self {
        Self {
            url: default_cve_url(),
            message_budget: default_message_budget(),
        }
    }
}

fn default_cve_url() -> String {
    "https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-{id}".to_string()
}
fn default_message_budget() -> usize {
    450
}

/// A preconfigured tracker, addressable by name or alias.
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: TrackerKind,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl TrackerConfig {
    pub fn to_identity(&self) -> TrackerIdentity {
        let description = self.description.clone().unwrap_or_else(|| self.name.clone());
        TrackerIdentity::new(
            self.name.clone(),
            self.url.trim_end_matches('/'),
            description,
            self.kind,
        )
        .with_aliases(self.aliases.iter().cloned())
    }
}

impl Config {
    /// Configured trackers, or the built-in defaults when none are set.
    pub fn tracker_identities(&self) -> Vec<TrackerIdentity> {
        if self.trackers.is_empty() {
            return default_trackers();
        }
        self.trackers.iter().map(TrackerConfig::to_identity).collect()
    }
}

fn default_trackers() -> Vec<TrackerIdentity> {
    vec![
        TrackerIdentity::new("launchpad", "https://launchpad.net", "Launchpad", TrackerKind::Launchpad)
            .with_aliases(["ubuntu", "lp"]),
        TrackerIdentity::new("debian", "https://bugs.debian.org", "Debian", TrackerKind::Debbugs)
            .with_aliases(["deb"]),
    ]
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file means all defaults.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    load_config(path)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    if !config.cve.url.contains("{id}") {
        anyhow::bail!("cve.url must contain an {{id}} placeholder");
    }
    if config.cve.message_budget == 0 {
        anyhow::bail!("cve.message_budget must be > 0");
    }

    if config.launchpad.use_api && !config.launchpad.api_root.starts_with("http") {
        anyhow::bail!(
            "launchpad.api_root must be an http(s) URL, got '{}'",
            config.launchpad.api_root
        );
    }

    let mut seen = HashSet::new();
    for tracker in &config.trackers {
        if !(tracker.url.starts_with("https://") || tracker.url.starts_with("http://")) {
            anyhow::bail!(
                "tracker '{}': url must start with http:// or https://",
                tracker.name
            );
        }
        for name in std::iter::once(&tracker.name).chain(tracker.aliases.iter()) {
            if !seen.insert(name.to_lowercase()) {
                anyhow::bail!("tracker name or alias '{}' is used more than once", name);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.http.timeout_secs, 15);
        assert!(config.launchpad.use_api);
        assert_eq!(config.cve.message_budget, 450);
        let trackers = config.tracker_identities();
        assert!(trackers.iter().any(|t| t.answers_to("lp")));
        assert!(trackers.iter().any(|t| t.kind == TrackerKind::Debbugs));
    }

    #[test]
    fn parses_trackers() {
        let config = parse_config(
            r#"
[http]
timeout_secs = 5

[[trackers]]
name = "Mozilla"
url = "https://bugzilla.mozilla.org/"
kind = "bugzilla"
aliases = ["bmo"]
"#,
        )
        .unwrap();
        let trackers = config.tracker_identities();
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].name, "mozilla");
        assert_eq!(trackers[0].base_url, "https://bugzilla.mozilla.org");
        assert_eq!(trackers[0].description, "Mozilla");
        assert!(trackers[0].answers_to("BMO"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = parse_config("[http]\ntimeout_secs = 0\n").unwrap_err();
        assert!(err.to_string().contains("timeout_secs"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = parse_config(
            "[[trackers]]\nname = \"x\"\nurl = \"https://x\"\nkind = \"jira\"\n",
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("jira"));
    }

    #[test]
    fn rejects_duplicate_aliases() {
        let err = parse_config(
            r#"
[[trackers]]
name = "a"
url = "https://a.example"
kind = "trac"
aliases = ["x"]

[[trackers]]
name = "x"
url = "https://b.example"
kind = "trac"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn rejects_cve_url_without_placeholder() {
        let err = parse_config("[cve]\nurl = \"https://example.org/cve\"\n").unwrap_err();
        assert!(err.to_string().contains("{id}"));
    }
}
