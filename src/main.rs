//! # bugtracker CLI (`bt`)
//!
//! Look up bugs from the command line through the same registry a chat
//! bot would embed.
//!
//! ## Usage
//!
//! ```bash
//! bt --config ./config/bt.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bt recognize <url>` | Show which tracker a URL belongs to |
//! | `bt fetch <tracker-or-url> <id>` | Fetch one bug and print its summary line |
//! | `bt cve <id>` | Print a CVE description sized for a chat message |
//! | `bt trackers` | List preconfigured trackers and their aliases |
//! | `bt completions <shell>` | Generate shell completions |
//!
//! ## Examples
//!
//! ```bash
//! # Which backend handles this URL?
//! bt recognize https://gitlab.gnome.org/GNOME/gtk/-/issues/1
//!
//! # Fetch by alias from the config
//! bt fetch lp 1
//!
//! # Fetch a pull request on a recognized repository, as JSON
//! bt fetch https://github.com/rust-lang/rust/issues 1 --type pull --json
//!
//! # CVE line for a channel, without the trailing URL
//! bt cve 2014-0160 --channel '#ubuntu' --no-url
//! ```

use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use bugtracker::config;
use bugtracker::models::{BugRecord, BugType, TrackerKind};
use bugtracker::tracker::TrackerIdentity;
use bugtracker::traits::BackendRegistry;

/// Recognize bug tracker URLs and fetch normalized bug records.
///
/// All commands accept a `--config` flag pointing to a TOML file. A
/// missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "bt",
    about = "Recognize bug tracker URLs and fetch normalized bug records",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/bt.toml")]
    config: PathBuf,

    /// Log protocol fallbacks and recognition probes to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which tracker a URL belongs to.
    ///
    /// GitLab, Gitea and CGit URLs are confirmed with a network request.
    Recognize {
        url: String,
    },

    /// Fetch one bug, pull request or commit.
    Fetch {
        /// Configured tracker name or alias, or a tracker URL.
        tracker: String,

        /// Bug number, ticket number or commit hash.
        id: String,

        /// Which endpoint to query on forges: issue, pull, or commit.
        #[arg(long = "type", value_name = "TYPE")]
        bug_type: Option<BugType>,

        /// Print the record as JSON instead of a summary line.
        #[arg(long)]
        json: bool,
    },

    /// Print a CVE description sized for a chat message.
    Cve {
        /// CVE number, with or without the `CVE-` prefix.
        id: String,

        /// Channel the message is for; its name counts against the budget.
        #[arg(long, default_value = "")]
        channel: String,

        /// Leave out the trailing URL.
        #[arg(long)]
        no_url: bool,
    },

    /// List preconfigured trackers.
    Trackers,

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "bt", &mut io::stdout());
        return Ok(());
    }

    let cfg = config::load_config_or_default(&cli.config)?;
    let registry = BackendRegistry::from_config(&cfg)?;

    match cli.command {
        Commands::Recognize { url } => {
            let tracker = registry
                .recognize(&url)
                .await
                .with_context(|| format!("No tracker recognized for {}", url))?;
            print_tracker(&tracker);
        }
        Commands::Fetch {
            tracker,
            id,
            bug_type,
            json,
        } => {
            let tracker = resolve_tracker(&registry, &tracker).await?;
            match registry.fetch(&tracker, &id, bug_type).await? {
                Some(record) if json => println!("{}", serde_json::to_string_pretty(&record)?),
                Some(record) => {
                    let line = record.summary_line(label(&tracker, bug_type, &record));
                    println!("{}", line.trim_start());
                }
                None => bail!("{} gave no answer for {} (see log)", tracker.description, id),
            }
        }
        Commands::Cve {
            id,
            channel,
            no_url,
        } => {
            let cve = registry
                .cve()
                .context("CVE lookup is not registered")?;
            println!("{}", cve.describe(&id, &channel, !no_url).await?);
        }
        Commands::Trackers => {
            for tracker in registry.trackers() {
                print_tracker(tracker);
            }
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

/// A configured name or alias first, then URL recognition.
async fn resolve_tracker(registry: &BackendRegistry, name_or_url: &str) -> Result<TrackerIdentity> {
    if let Some(tracker) = registry.find_tracker(name_or_url) {
        return Ok(tracker.clone());
    }
    registry
        .recognize(name_or_url)
        .await
        .with_context(|| format!("'{}' is neither a configured tracker nor a known tracker URL", name_or_url))
}

fn print_tracker(tracker: &TrackerIdentity) {
    let aliases: Vec<&str> = tracker.aliases.iter().map(String::as_str).collect();
    println!(
        "{:<12} {:<24} {} ({}){}",
        tracker.kind.as_str(),
        tracker.name,
        tracker.base_url,
        tracker.description,
        if aliases.is_empty() {
            String::new()
        } else {
            format!(" aliases: {}", aliases.join(", "))
        }
    );
}

/// Word printed before the id in a summary line.
fn label(tracker: &TrackerIdentity, bug_type: Option<BugType>, record: &BugRecord) -> &'static str {
    if tracker.kind == TrackerKind::Cve {
        return "";
    }
    let base = tracker.base_url.as_str();
    let is_commit = tracker.kind == TrackerKind::CGit || record.url.contains("/commit");
    match bug_type {
        Some(BugType::Commit) => "Commit",
        Some(BugType::Pull) if tracker.kind == TrackerKind::GitLab => "Merge request",
        Some(BugType::Pull) => "Pull request",
        Some(BugType::Issue) => "Issue",
        None if is_commit => "Commit",
        None if base.ends_with("/merge_requests") => "Merge request",
        None if base.ends_with("/pulls") => "Pull request",
        None if base.ends_with("/issues") => "Issue",
        None if tracker.kind == TrackerKind::Trac => "Ticket",
        None => "Bug",
    }
}
