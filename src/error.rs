//! Error taxonomy shared by every tracker backend.
//!
//! Callers only ever see two kinds of failure:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | [`TrackerError::NotFound`] | The bug does not exist (or cannot be told apart from that state) |
//! | [`TrackerError::Tracker`] | Fetch failed, payload was unparseable, or expected fields were missing |
//!
//! The `Tracker` kind always carries the backend description, a human
//! readable cause, and the exact URL that was attempted.

use std::fmt::Display;

use thiserror::Error;

/// Result alias used throughout the tracker layer.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The requested bug does not exist at the backend.
    #[error("Bug not found")]
    NotFound,

    /// Any other failure, with enough context to act on it.
    #[error("{message} ({url})")]
    Tracker {
        /// Display description of the tracker (e.g. `"Launchpad"`).
        description: String,
        /// Full human-readable message.
        message: String,
        /// The URL that was being fetched when the failure happened.
        url: String,
    },
}

impl TrackerError {
    /// Transport-level failure: the request never produced a usable body.
    pub fn fetch(description: &str, cause: impl Display, url: impl Into<String>) -> Self {
        Self::Tracker {
            description: description.to_string(),
            message: format!("Could not get data from {}: {}", description, cause),
            url: url.into(),
        }
    }

    /// The body arrived but could not be parsed, or lacked expected fields.
    pub fn parse(description: &str, cause: impl Display, url: impl Into<String>) -> Self {
        Self::Tracker {
            description: description.to_string(),
            message: format!("Could not parse data from {}: {}", description, cause),
            url: url.into(),
        }
    }

    /// The body arrived but matched nothing we know how to read.
    pub fn unparseable(description: &str, url: impl Into<String>) -> Self {
        Self::Tracker {
            description: description.to_string(),
            message: format!("Could not parse data from {}", description),
            url: url.into(),
        }
    }

    /// The backend answered, but refuses to hand out the data
    /// (private bugs, duplicates of private bugs, backend error codes).
    pub fn refused(description: &str, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Tracker {
            description: description.to_string(),
            message: message.into(),
            url: url.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// URL attempted when the failure happened, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::NotFound => None,
            Self::Tracker { url, .. } => Some(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_keeps_description_cause_and_url() {
        let err = TrackerError::fetch("Launchpad", "timed out", "https://launchpad.net/bugs/1");
        assert_eq!(
            err.to_string(),
            "Could not get data from Launchpad: timed out (https://launchpad.net/bugs/1)"
        );
        assert_eq!(err.url(), Some("https://launchpad.net/bugs/1"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_has_no_payload() {
        let err = TrackerError::NotFound;
        assert!(err.is_not_found());
        assert_eq!(err.url(), None);
        assert_eq!(err.to_string(), "Bug not found");
    }

    #[test]
    fn unparseable_has_no_cause() {
        let err = TrackerError::unparseable("CGit", "https://git.example.org/repo/commit/?id=1");
        assert_eq!(
            err.to_string(),
            "Could not parse data from CGit (https://git.example.org/repo/commit/?id=1)"
        );
    }
}
