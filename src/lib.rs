//! # bugtracker
//!
//! Recognize bug tracker URLs and fetch one normalized record per bug,
//! pull request or commit, whatever protocol the tracker speaks.
//!
//! Eleven backend families sit behind the same two operations: Bugzilla,
//! Launchpad, Debbugs, SourceForge, GitHub, GitLab, Gitea, CGit, Mantis,
//! Trac, and a CVE lookup. Wire formats range from REST/JSON through
//! legacy XML and SOAP to tab-separated exports and scraped HTML.
//!
//! ## Architecture
//!
//! ```text
//!   "github.com/o/r/issues/7"
//!              │
//!              ▼
//!  ┌───────────────────────┐   recognize   ┌──────────────────┐
//!  │    BackendRegistry    │──────────────▶│ TrackerIdentity  │
//!  │ (ordered backends +   │               └────────┬─────────┘
//!  │  configured trackers) │◀────── fetch ──────────┘
//!  └──────────┬────────────┘
//!             ▼
//!  ┌───────────────────────┐      ┌──────────────┐
//!  │ tracker_* backend     │─────▶│  Transport   │── HTTP / SOAP
//!  └──────────┬────────────┘      └──────────────┘
//!             ▼
//!        BugRecord  |  TrackerError::{NotFound, Tracker}
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bt recognize https://bugzilla.mozilla.org/show_bug.cgi?id=1
//! bt fetch https://github.com/rust-lang/rust/issues/1 --json
//! bt fetch lp 1
//! bt cve 2014-0160 --channel '#ubuntu'
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`traits`] | `Backend` trait and `BackendRegistry` |
//! | [`models`] | `BugRecord`, `BugType`, `TrackerKind` |
//! | [`tracker`] | Tracker identity and URL helpers |
//! | [`error`] | `NotFound` vs. `Tracker` error taxonomy |
//! | [`config`] | TOML configuration |
//! | [`http`] | Transport abstraction over reqwest |
//! | [`soap`] | Minimal SOAP client (Debbugs, legacy Mantis) |
//! | [`xml`] | Small owned XML tree |
//! | [`text`] | HTML to text, base64 heuristics, ellipsizing |
//! | [`ranking`] | Launchpad task ranking |
//! | [`cve`] | CVE lookup with message budget |
//! | `tracker_*` | One module per backend family |

pub mod config;
pub mod cve;
pub mod error;
pub mod http;
pub mod models;
pub mod ranking;
pub mod soap;
pub mod text;
pub mod tracker;
pub mod tracker_bugzilla;
pub mod tracker_cgit;
pub mod tracker_debbugs;
pub mod tracker_gitea;
pub mod tracker_github;
pub mod tracker_gitlab;
pub mod tracker_launchpad;
pub mod tracker_mantis;
pub mod tracker_sourceforge;
pub mod tracker_trac;
pub mod traits;
pub mod xml;
