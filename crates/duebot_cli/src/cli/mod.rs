use clap::{Parser, Subcommand};
use duebot_core::config::ConfigOverrides;
use duebot_core::reminder::OverduePolicy;

#[derive(Parser, Debug)]
#[command(author, version, about = "Due-date reminders for team task lists", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assign a new task to a team member
    ///
    /// Example: duebot assign 42 "Fix login bug" --due 2025-12-31 --priority high
    Assign {
        owner: String,
        description: String,
        /// Due date, YYYY-MM-DD (midnight in the configured offset) or RFC3339
        #[arg(long)]
        due: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: String,
    },
    /// List tasks
    ///
    /// Example: duebot list --owner 42
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show details of a task
    ///
    /// Example: duebot show task-1
    Show { id: String },
    /// Change a task's description, due date or priority
    ///
    /// Moving the due date resets the reminders already sent.
    ///
    /// Example: duebot update task-1 --due 2026-01-05
    Update {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        priority: Option<String>,
    },
    /// Mark a task as completed
    ///
    /// Example: duebot complete task-1
    Complete { id: String },
    /// Delete a task
    ///
    /// Example: duebot remove task-1
    Remove { id: String },
    /// Find tasks whose description contains a keyword
    ///
    /// Example: duebot search login --owner 42
    Search {
        keyword: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Manage task categories
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },
    /// Add a comment to a task
    ///
    /// Example: duebot comment task-1 "waiting on review" --author 7
    Comment {
        id: String,
        text: String,
        /// Defaults to the task owner
        #[arg(long)]
        author: Option<String>,
    },
    /// Run one reminder pass and exit
    ///
    /// Example: duebot poll
    /// Example: duebot poll --at 2025-12-30T23:30:00-05:00
    Poll {
        /// Evaluate as if the current time were this RFC3339 timestamp
        #[arg(long)]
        at: Option<String>,
    },
    /// Keep polling on the configured interval until interrupted
    ///
    /// Example: duebot run
    Run,
}

#[derive(Subcommand, Debug)]
pub enum CategoryAction {
    /// Tag a task with a category
    ///
    /// Example: duebot category add task-1 backend
    Add { id: String, category: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    PollInterval,
    UtcOffset,
    OverduePolicy,
    PeriodicStep,
    Recipient(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let (field, remainder) = key_raw
        .split_once('.')
        .map(|(field, rest)| (field.trim(), Some(rest.trim())))
        .unwrap_or((key_raw.trim(), None));

    let canonical_field =
        canonicalize_flag_name(field).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match canonical_field.as_str() {
        "recipients" | "recipient" => {
            let owner_id = remainder
                .filter(|segment| !segment.is_empty())
                .ok_or_else(|| "recipients override requires an owner id".to_string())?;
            return Ok(ParsedConfigOverride {
                target: ConfigOverrideTarget::Recipient(owner_id.to_string()),
                value,
            });
        }
        "poll_interval" | "poll_interval_minutes" => ConfigOverrideTarget::PollInterval,
        "utc_offset" | "timezone" => ConfigOverrideTarget::UtcOffset,
        "overdue_policy" | "overdue" => ConfigOverrideTarget::OverduePolicy,
        "periodic_step" | "periodic_step_hours" => ConfigOverrideTarget::PeriodicStep,
        other => return Err(format!("unknown config field '{other}'")),
    };

    if remainder.is_some() {
        return Err(format!("{canonical_field} override cannot have subfields"));
    }

    Ok(ParsedConfigOverride { target, value })
}

/// Fold parsed overrides into the shape the config layer merges.
pub fn collect_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();

    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::PollInterval => {
                let minutes = parsed
                    .value
                    .parse::<u64>()
                    .map_err(|_| format!("poll interval must be a number, got '{}'", parsed.value))?;
                overrides.poll_interval_minutes = Some(minutes);
            }
            ConfigOverrideTarget::UtcOffset => overrides.utc_offset = Some(parsed.value),
            ConfigOverrideTarget::OverduePolicy => {
                let policy = OverduePolicy::parse(&parsed.value)
                    .ok_or_else(|| format!("unknown overdue policy '{}'", parsed.value))?;
                overrides.overdue_policy = Some(policy);
            }
            ConfigOverrideTarget::PeriodicStep => {
                let hours = parsed
                    .value
                    .parse::<u32>()
                    .map_err(|_| format!("periodic step must be a number, got '{}'", parsed.value))?;
                overrides.periodic_step_hours = Some(hours);
            }
            ConfigOverrideTarget::Recipient(owner_id) => {
                overrides.recipients.insert(owner_id, parsed.value);
            }
        }
    }

    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
