use crate::error::AppError;
use crate::reminder::{OverduePolicy, ReminderPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use time::UtcOffset;
use time::macros::format_description;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "DUEBOT_CONFIG_PATH";

pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 30;
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_UTC_OFFSET: &str = "-05:00";
pub const DEFAULT_PERIODIC_STEP_HOURS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_poll_interval_minutes")]
    pub poll_interval_minutes: u64,
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default)]
    pub overdue_policy: OverduePolicy,
    #[serde(default = "default_periodic_step_hours")]
    pub periodic_step_hours: u32,
    /// Owner id to display name. Empty accepts any owner.
    #[serde(default)]
    pub recipients: HashMap<String, String>,
}

fn default_poll_interval_minutes() -> u64 {
    DEFAULT_POLL_INTERVAL_MINUTES
}

fn default_utc_offset() -> String {
    DEFAULT_UTC_OFFSET.to_string()
}

fn default_periodic_step_hours() -> u32 {
    DEFAULT_PERIODIC_STEP_HOURS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            utc_offset: default_utc_offset(),
            overdue_policy: OverduePolicy::Once,
            periodic_step_hours: DEFAULT_PERIODIC_STEP_HOURS,
            recipients: HashMap::new(),
        }
    }
}

impl Config {
    pub fn offset(&self) -> Result<UtcOffset, AppError> {
        parse_utc_offset(&self.utc_offset)
    }

    pub fn reminder_policy(&self) -> ReminderPolicy {
        ReminderPolicy {
            overdue: self.overdue_policy,
            periodic_step_hours: self.periodic_step_hours.max(1),
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=MAX_POLL_INTERVAL_MINUTES).contains(&self.poll_interval_minutes) {
            return Err(AppError::invalid_data(format!(
                "poll_interval_minutes must be between 1 and {MAX_POLL_INTERVAL_MINUTES}"
            )));
        }
        if self.periodic_step_hours == 0 {
            return Err(AppError::invalid_data(
                "periodic_step_hours must be at least 1",
            ));
        }
        self.offset()?;
        Ok(())
    }
}

pub fn parse_utc_offset(raw: &str) -> Result<UtcOffset, AppError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return Ok(UtcOffset::UTC);
    }
    UtcOffset::parse(
        trimmed,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|_| AppError::invalid_data(format!("utc_offset must look like -05:00, got {trimmed}")))
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub poll_interval_minutes: Option<u64>,
    pub utc_offset: Option<String>,
    pub overdue_policy: Option<OverduePolicy>,
    pub periodic_step_hours: Option<u32>,
    pub recipients: HashMap<String, String>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("duebot").join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("duebot")
            .join(CONFIG_FILE_NAME))
    }
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(minutes) = overrides.poll_interval_minutes {
        merged.poll_interval_minutes = minutes;
    }
    if let Some(offset) = overrides.utc_offset.as_ref() {
        merged.utc_offset = offset.trim().to_string();
    }
    if let Some(policy) = overrides.overdue_policy {
        merged.overdue_policy = policy;
    }
    if let Some(step) = overrides.periodic_step_hours {
        merged.periodic_step_hours = step;
    }

    for (owner_id, name) in overrides.recipients.iter() {
        merged.recipients.insert(owner_id.clone(), name.clone());
    }

    merged
}
