//! Core data models used throughout the tracker layer.
//!
//! These types describe what the caller asks for ([`BugType`]), which
//! backend family answers ([`TrackerKind`]), and the single normalized
//! shape every backend produces ([`BugRecord`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Backend family a tracker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerKind {
    Bugzilla,
    Launchpad,
    Debbugs,
    #[serde(rename = "sourceforge")]
    SourceForge,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    Gitea,
    #[serde(rename = "cgit")]
    CGit,
    Mantis,
    Trac,
    Cve,
}

impl TrackerKind {
    /// Every backend kind, in registry order.
    pub const ALL: [TrackerKind; 11] = [
        TrackerKind::Bugzilla,
        TrackerKind::Launchpad,
        TrackerKind::Debbugs,
        TrackerKind::SourceForge,
        TrackerKind::GitHub,
        TrackerKind::GitLab,
        TrackerKind::Gitea,
        TrackerKind::CGit,
        TrackerKind::Mantis,
        TrackerKind::Trac,
        TrackerKind::Cve,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::Bugzilla => "bugzilla",
            TrackerKind::Launchpad => "launchpad",
            TrackerKind::Debbugs => "debbugs",
            TrackerKind::SourceForge => "sourceforge",
            TrackerKind::GitHub => "github",
            TrackerKind::GitLab => "gitlab",
            TrackerKind::Gitea => "gitea",
            TrackerKind::CGit => "cgit",
            TrackerKind::Mantis => "mantis",
            TrackerKind::Trac => "trac",
            TrackerKind::Cve => "cve",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        TrackerKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == lower)
            .ok_or_else(|| format!("unknown tracker kind: '{}'", s))
    }
}

/// Optional hint telling forge backends which of their overlapping
/// endpoints (issues, pulls/merge requests, commits) to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BugType {
    Issue,
    Pull,
    Commit,
}

impl FromStr for BugType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "issue" | "bug" => Ok(BugType::Issue),
            "pull" | "pr" | "merge" | "mr" => Ok(BugType::Pull),
            "commit" => Ok(BugType::Commit),
            other => Err(format!(
                "unknown bug type: '{}'. Must be issue, pull, or commit.",
                other
            )),
        }
    }
}

/// The normalized bug record every backend produces.
///
/// No field is ever absent: a backend without a concept (e.g. severity
/// on commits) leaves the string empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BugRecord {
    /// Bug number, short commit hash, or the canonical bug after
    /// following duplicates.
    pub id: String,
    /// Project, component, or package name.
    pub product: String,
    pub title: String,
    pub severity: String,
    /// Free-form status, sometimes `"<state>: <resolution>"`.
    pub status: String,
    pub assignee: String,
    /// Human-facing URL for the record.
    pub url: String,
    /// Backend-specific extras, e.g. `"affected: 12"`.
    pub extra_info: Vec<String>,
    /// Ids this record supersedes, in the order they were traversed.
    pub duplicates: Vec<String>,
}

impl BugRecord {
    /// Render the record as the one-line summary a chat bot prints.
    ///
    /// ```text
    /// Bug 2059145 in filament (Ubuntu) "please remove filament" (heat: 6) [Undecided, In Progress] https://launchpad.net/bugs/2059145
    /// ```
    pub fn summary_line(&self, label: &str) -> String {
        let mut line = match self.duplicates.first() {
            Some(first) => format!("{} {} (dup-of: {})", label, first, self.id),
            None => format!("{} {}", label, self.id),
        };

        if !self.product.is_empty() {
            line.push_str(&format!(" in {}", self.product));
        }
        line.push_str(&format!(" \"{}\"", self.title));

        if !self.extra_info.is_empty() {
            line.push_str(&format!(" ({})", self.extra_info.join(", ")));
        }

        let mut facets: Vec<String> = [&self.severity, &self.status]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        if !self.assignee.is_empty() {
            facets.push(format!("assigned: {}", self.assignee));
        }
        if !facets.is_empty() {
            line.push_str(&format!(" [{}]", facets.join(", ")));
        }

        if !self.url.is_empty() {
            line.push(' ');
            line.push_str(&self.url);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in TrackerKind::ALL {
            assert_eq!(kind.as_str().parse::<TrackerKind>().unwrap(), kind);
        }
        assert!("jira".parse::<TrackerKind>().is_err());
    }

    #[test]
    fn bug_type_aliases() {
        assert_eq!("bug".parse::<BugType>().unwrap(), BugType::Issue);
        assert_eq!("MR".parse::<BugType>().unwrap(), BugType::Pull);
        assert_eq!("pr".parse::<BugType>().unwrap(), BugType::Pull);
        assert_eq!("commit".parse::<BugType>().unwrap(), BugType::Commit);
        assert!("patch".parse::<BugType>().is_err());
    }

    #[test]
    fn summary_line_launchpad_shape() {
        let record = BugRecord {
            id: "2059145".to_string(),
            product: "filament (Ubuntu)".to_string(),
            title: "please remove filament from noble".to_string(),
            severity: "Undecided".to_string(),
            status: "In Progress".to_string(),
            url: "https://launchpad.net/bugs/2059145".to_string(),
            extra_info: vec!["affected: 1".to_string(), "heat: 6".to_string()],
            ..Default::default()
        };
        assert_eq!(
            record.summary_line("Bug"),
            "Bug 2059145 in filament (Ubuntu) \"please remove filament from noble\" \
             (affected: 1, heat: 6) [Undecided, In Progress] https://launchpad.net/bugs/2059145"
        );
    }

    #[test]
    fn summary_line_skips_empty_facets_and_notes_duplicates() {
        let record = BugRecord {
            id: "20".to_string(),
            title: "crash".to_string(),
            assignee: "alice".to_string(),
            duplicates: vec!["10".to_string()],
            ..Default::default()
        };
        assert_eq!(
            record.summary_line("Bug"),
            "Bug 10 (dup-of: 20) \"crash\" [assigned: alice]"
        );
    }
}
