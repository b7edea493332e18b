//! Pick one representative task for bugs that carry several.
//!
//! A Launchpad bug has one task per affected target (project, package,
//! series), each with its own status and importance. We report the most
//! "active" one: rank = `status_index * 100 + severity_index`, maximum
//! wins, ties go to the task that came first.

/// Statuses from least to most active.
pub const STATUSES: [&str; 11] = [
    "Unknown",
    "Invalid",
    "Opinion",
    "Won't Fix",
    "Fix Released",
    "Fix Committed",
    "New",
    "Incomplete",
    "Confirmed",
    "Triaged",
    "In Progress",
];

/// Importances from least to most severe.
pub const SEVERITIES: [&str; 7] = [
    "Unknown",
    "Undecided",
    "Wishlist",
    "Low",
    "Medium",
    "High",
    "Critical",
];

/// One task of a multi-target bug. Only lives while a record is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BugTask {
    pub status: String,
    pub importance: String,
    pub assignee: String,
    /// Display name of the task target, e.g. `"filament (Ubuntu)"`.
    pub target: String,
}

/// Rank of a task; 0 if either field is outside the known enumerations.
pub fn rank(task: &BugTask) -> u32 {
    let status = STATUSES.iter().position(|s| *s == task.status);
    let severity = SEVERITIES.iter().position(|s| *s == task.importance);
    match (status, severity) {
        (Some(st), Some(sev)) => (st * 100 + sev) as u32,
        _ => 0,
    }
}

/// Index of the highest-ranked task; the first one wins a tie.
/// `None` for no tasks.
pub fn select_task_index(tasks: &[BugTask]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (i, task) in tasks.iter().enumerate() {
        let r = rank(task);
        match best {
            Some((_, best_rank)) if r <= best_rank => {}
            _ => best = Some((i, r)),
        }
    }
    best.map(|(i, _)| i)
}

/// Highest-ranked task; see [`select_task_index`].
pub fn select_task(tasks: &[BugTask]) -> Option<&BugTask> {
    select_task_index(tasks).map(|i| &tasks[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(status: &str, importance: &str, target: &str) -> BugTask {
        BugTask {
            status: status.to_string(),
            importance: importance.to_string(),
            target: target.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn rank_uses_both_enumerations() {
        assert_eq!(rank(&task("New", "Low", "a")), 603);
        assert_eq!(rank(&task("Confirmed", "Critical", "b")), 806);
        assert_eq!(rank(&task("Unknown", "Unknown", "c")), 0);
    }

    #[test]
    fn unknown_values_rank_zero() {
        assert_eq!(rank(&task("Expired", "High", "a")), 0);
        assert_eq!(rank(&task("New", "", "a")), 0);
    }

    #[test]
    fn picks_the_maximum() {
        let tasks = vec![task("New", "Low", "a"), task("Confirmed", "Critical", "b")];
        assert_eq!(select_task(&tasks).unwrap().target, "b");
    }

    #[test]
    fn status_outweighs_importance() {
        let tasks = vec![task("New", "Critical", "a"), task("Incomplete", "Wishlist", "b")];
        assert_eq!(select_task(&tasks).unwrap().target, "b");
    }

    #[test]
    fn first_task_wins_a_tie() {
        let tasks = vec![
            task("Triaged", "High", "first"),
            task("Triaged", "High", "second"),
            task("Invalid", "Low", "third"),
        ];
        assert_eq!(select_task(&tasks).unwrap().target, "first");
        assert_eq!(select_task_index(&tasks), Some(0));
    }

    #[test]
    fn index_points_at_the_chosen_task() {
        let tasks = vec![
            task("New", "Low", "a"),
            task("Invalid", "High", "b"),
            task("In Progress", "Medium", "c"),
        ];
        assert_eq!(select_task_index(&tasks), Some(2));
        assert!(select_task_index(&[]).is_none());
    }

    #[test]
    fn all_unranked_keeps_the_first() {
        let tasks = vec![task("?", "?", "a"), task("??", "??", "b")];
        assert_eq!(select_task(&tasks).unwrap().target, "a");
        assert!(select_task(&[]).is_none());
    }
}
