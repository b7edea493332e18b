//! The backend trait and the static registry of built-in backends.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                   BackendRegistry                     │
//! │ Bugzilla  Launchpad  Debbugs  SourceForge  GitHub ... │
//! └──────────────┬───────────────────────┬────────────────┘
//!                ▼                       ▼
//!        recognize(url)          fetch(tracker, id, hint)
//!     → Option<TrackerIdentity>  → Result<Option<BugRecord>>
//! ```
//!
//! Backends are tried in a fixed order during recognition. Fetching
//! dispatches on [`TrackerIdentity::kind`], so callers never need to know
//! which protocol a tracker speaks.
//!
//! # Usage
//!
//! ```rust,no_run
//! # async fn example() -> anyhow::Result<()> {
//! use bugtracker::config::Config;
//! use bugtracker::traits::BackendRegistry;
//!
//! let registry = BackendRegistry::from_config(&Config::default())?;
//! if let Some(tracker) = registry.recognize("https://github.com/rust-lang/rust/issues/1").await {
//!     let record = registry.fetch(&tracker, "1", None).await?;
//!     println!("{:?}", record);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, CveConfig};
use crate::cve::CveBackend;
use crate::error::{TrackerError, TrackerResult};
use crate::http::{HttpTransport, Transport};
use crate::models::{BugRecord, BugType, TrackerKind};
use crate::tracker::TrackerIdentity;
use crate::tracker_bugzilla::BugzillaBackend;
use crate::tracker_cgit::CGitBackend;
use crate::tracker_debbugs::DebbugsBackend;
use crate::tracker_gitea::GiteaBackend;
use crate::tracker_github::GitHubBackend;
use crate::tracker_gitlab::GitLabBackend;
use crate::tracker_launchpad::{LaunchpadBackend, LaunchpadSession};
use crate::tracker_mantis::MantisBackend;
use crate::tracker_sourceforge::SourceForgeBackend;
use crate::tracker_trac::TracBackend;

// ═══════════════════════════════════════════════════════════════════════
// Backend Trait
// ═══════════════════════════════════════════════════════════════════════

/// One tracker backend family: a URL recognizer plus a protocol adapter.
///
/// # Lifecycle
///
/// 1. The backend is registered in a [`BackendRegistry`].
/// 2. [`recognize`](Backend::recognize) is tried on URLs of unknown origin.
/// 3. [`fetch`](Backend::fetch) is called with identities of its own kind.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend family this implementation handles.
    fn kind(&self) -> TrackerKind;

    /// Display name of the family, e.g. `"Bugzilla"`.
    fn description(&self) -> &str;

    /// Decide whether `url` belongs to this backend and, if so, build the
    /// tracker identity for it.
    ///
    /// Never fails: malformed URLs and network errors both mean "not this
    /// backend". GitLab, Gitea and CGit perform a speculative network
    /// fetch here, so this is not a pure function.
    async fn recognize(&self, url: &str) -> Option<TrackerIdentity>;

    /// Fetch one bug (or pull request, or commit) and normalize it.
    ///
    /// `Ok(None)` is only returned by backends that deliberately suppress
    /// errors for auto-recognized trackers (Mantis, Trac); the error is
    /// logged instead.
    async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════

/// Registry of backends plus the preconfigured tracker identities.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
    trackers: Vec<TrackerIdentity>,
    cve: Option<Arc<CveBackend>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            trackers: Vec::new(),
            cve: None,
        }
    }

    /// Create a registry with every built-in backend, in recognition order.
    ///
    /// `launchpad` is the API session to prefer for Launchpad; without one
    /// the deprecated text interface is used.
    pub fn with_builtins(
        transport: Arc<dyn Transport>,
        launchpad: Option<LaunchpadSession>,
        cve: &CveConfig,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BugzillaBackend::new(transport.clone())));
        registry.register(Arc::new(LaunchpadBackend::new(transport.clone(), launchpad)));
        registry.register(Arc::new(DebbugsBackend::new(transport.clone())));
        registry.register(Arc::new(SourceForgeBackend::new(transport.clone())));
        registry.register(Arc::new(GitHubBackend::new(transport.clone())));
        registry.register(Arc::new(GitLabBackend::new(transport.clone())));
        registry.register(Arc::new(GiteaBackend::new(transport.clone())));
        registry.register(Arc::new(CGitBackend::new(transport.clone())));
        registry.register(Arc::new(MantisBackend::new(transport.clone())));
        registry.register(Arc::new(TracBackend::new(transport.clone())));

        let cve_backend = Arc::new(CveBackend::new(transport, cve));
        registry.register(cve_backend.clone());
        registry.cve = Some(cve_backend);
        registry
    }

    /// Create a registry from the config using the real HTTP transport.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.http)?);
        Ok(Self::from_config_with_transport(config, transport))
    }

    /// Create a registry from the config on top of a caller-provided transport.
    pub fn from_config_with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        let session = config
            .launchpad
            .use_api
            .then(|| LaunchpadSession::new(transport.clone(), config.launchpad.api_root.clone()));
        let mut registry = Self::with_builtins(transport, session, &config.cve);
        for tracker in config.tracker_identities() {
            registry.add_tracker(tracker);
        }
        registry
    }

    /// Register a backend. Later registrations are tried last.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.push(backend);
    }

    /// Add a preconfigured tracker identity.
    pub fn add_tracker(&mut self, tracker: TrackerIdentity) {
        if !self.trackers.contains(&tracker) {
            self.trackers.push(tracker);
        }
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    pub fn trackers(&self) -> &[TrackerIdentity] {
        &self.trackers
    }

    /// The backend handling `kind`, if registered.
    pub fn backend(&self, kind: TrackerKind) -> Option<&dyn Backend> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind)
            .map(|b| b.as_ref())
    }

    /// The CVE lookup, if the built-ins were registered.
    pub fn cve(&self) -> Option<&CveBackend> {
        self.cve.as_deref()
    }

    /// Find a preconfigured tracker by name or alias.
    pub fn find_tracker(&self, name: &str) -> Option<&TrackerIdentity> {
        self.trackers.iter().find(|t| t.answers_to(name))
    }

    /// Find the backend that claims `url` and build its tracker identity.
    ///
    /// A preconfigured tracker with the same base URL is returned in place
    /// of the freshly built identity, so its name and aliases survive.
    /// `None` is an expected outcome, not an error.
    pub async fn recognize(&self, url: &str) -> Option<TrackerIdentity> {
        for backend in &self.backends {
            if let Some(found) = backend.recognize(url).await {
                tracing::debug!(url, kind = %found.kind, name = %found.name, "recognized tracker");
                let known = self.trackers.iter().find(|t| **t == found).cloned();
                return Some(known.unwrap_or(found));
            }
        }
        tracing::debug!(url, "no backend recognized url");
        None
    }

    /// Fetch a bug from `tracker` through the backend for its kind.
    pub async fn fetch(
        &self,
        tracker: &TrackerIdentity,
        bug_id: &str,
        bug_type: Option<BugType>,
    ) -> TrackerResult<Option<BugRecord>> {
        let backend = self.backend(tracker.kind).ok_or_else(|| {
            TrackerError::refused(
                &tracker.description,
                format!("No backend registered for {} trackers", tracker.kind),
                tracker.base_url.clone(),
            )
        })?;
        backend.fetch(tracker, bug_id, bug_type).await
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
