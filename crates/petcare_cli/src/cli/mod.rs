use clap::{Parser, Subcommand};
use petcare_core::config::ConfigOverrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Account the command acts for
    #[arg(long, global = true, env = "PETCARE_OWNER", value_name = "OWNER_ID")]
    pub owner: Option<String>,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a care task for a pet
    ///
    /// Example: petcare add task-1 pet-1 Vaccination "2024-03-10 09:00" --recurring monthly
    /// Example: petcare add walk-1 pet-1 Walk 2024-03-10T07:30:00Z --recurring daily --interval 1
    Add {
        id: String,
        pet_id: String,
        task_type: String,
        due: String,
        #[arg(long, default_value = "none")]
        recurring: String,
        /// Multiplier for the recurrence (defaults to 1 when recurring)
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Mark a task as done
    ///
    /// Example: petcare done task-1
    /// Example: petcare done task-1 -m "All went well!"
    Done {
        id: String,
        message: Option<String>,
        #[arg(short = 'm', long = "message", value_name = "MESSAGE")]
        message_flag: Option<String>,
    },
    /// Show details of a task
    ///
    /// Example: petcare show task-1
    Show { id: String },
    /// List tasks
    ///
    /// Example: petcare list today
    /// Example: petcare list upcoming
    List {
        #[command(subcommand)]
        list: ListCommand,
    },
    /// Schedule a reminder for a task
    ///
    /// Example: petcare remind task-1 "2024-03-10 08:00" "Vet at nine"
    Remind {
        task_id: String,
        datetime: String,
        message: String,
    },
    /// List reminders that have not fired yet
    ///
    /// Example: petcare reminders
    Reminders,
    /// Register the device token reminders are pushed to
    ///
    /// Example: petcare register-target fcm-token-123
    RegisterTarget { target: String },
    /// Show a pet's health log, newest first
    ///
    /// Example: petcare logs pet-1
    Logs { pet_id: String },
    /// Show a pet's health timeline, oldest first
    ///
    /// Example: petcare timeline pet-1
    Timeline { pet_id: String },
    /// Run one reminder sweep now
    ///
    /// Example: petcare sweep
    Sweep,
    /// Run the reminder worker until interrupted
    ///
    /// Example: petcare serve
    Serve,
}

#[derive(Subcommand, Debug)]
pub enum ListCommand {
    /// List tasks due today
    ///
    /// Example: petcare list today
    Today,
    /// List open tasks from today onwards
    ///
    /// Example: petcare list upcoming
    Upcoming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    SweepIntervalSecs,
    StorePath,
    Notifications,
    LogFilter,
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
    let field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match field.as_str() {
        "sweep_interval_secs" | "sweep_interval" => ConfigOverrideTarget::SweepIntervalSecs,
        "store_path" | "store" => ConfigOverrideTarget::StorePath,
        "notifications" => ConfigOverrideTarget::Notifications,
        "log_filter" | "log" => ConfigOverrideTarget::LogFilter,
        other => return Err(format!("unknown config field '{other}'")),
    };

    Ok(ParsedConfigOverride { target, value })
}

/// Folds parsed overrides into the shape `merge_overrides` expects.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, String> {
    let mut overrides = ConfigOverrides::default();
    for entry in raw {
        let parsed = parse_config_override(entry)?;
        match parsed.target {
            ConfigOverrideTarget::SweepIntervalSecs => {
                let secs = parsed
                    .value
                    .parse::<u64>()
                    .map_err(|_| format!("sweep_interval_secs must be a number: '{}'", parsed.value))?;
                overrides.sweep_interval_secs = Some(secs);
            }
            ConfigOverrideTarget::StorePath => {
                overrides.store_path = Some(PathBuf::from(parsed.value));
            }
            ConfigOverrideTarget::Notifications => {
                let enabled = match parsed.value.to_ascii_lowercase().as_str() {
                    "true" | "on" | "yes" | "1" => true,
                    "false" | "off" | "no" | "0" => false,
                    other => return Err(format!("notifications must be true or false: '{other}'")),
                };
                overrides.notifications = Some(enabled);
            }
            ConfigOverrideTarget::LogFilter => {
                overrides.log_filter = Some(parsed.value);
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
