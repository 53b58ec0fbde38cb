use serde::{Deserialize, Serialize};
use std::fmt;

/// Deadline-proximity category of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "hours")]
pub enum ReminderKind {
    TwentyFourHour,
    /// Periodic reminder keyed by whole hours remaining.
    Hourly(u32),
    OneHour,
    Overdue,
}

impl ReminderKind {
    pub fn label(self) -> String {
        match self {
            Self::TwentyFourHour => "due in 24 hours".to_string(),
            Self::Hourly(hours) => format!("due in {hours} hours"),
            Self::OneHour => "due within the hour".to_string(),
            Self::Overdue => "overdue".to_string(),
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TwentyFourHour => write!(f, "24h"),
            Self::Hourly(hours) => write!(f, "hourly:{hours}"),
            Self::OneHour => write!(f, "1h"),
            Self::Overdue => write!(f, "overdue"),
        }
    }
}

/// Reminders already delivered for a task.
///
/// Hour buckets count down as the deadline approaches, so a single integer is
/// enough to remember every periodic reminder sent so far.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMarkers {
    #[serde(default)]
    pub twenty_four_hour: bool,
    #[serde(default)]
    pub one_hour: bool,
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub last_hourly_bucket: Option<u32>,
}

impl ReminderMarkers {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn record(&mut self, kind: ReminderKind, hour_bucket: u32) {
        match kind {
            ReminderKind::TwentyFourHour => {
                self.twenty_four_hour = true;
                self.record_bucket(hour_bucket);
            }
            ReminderKind::Hourly(bucket) => self.record_bucket(bucket),
            ReminderKind::OneHour => self.one_hour = true,
            ReminderKind::Overdue => self.overdue = true,
        }
    }

    fn record_bucket(&mut self, bucket: u32) {
        self.last_hourly_bucket = Some(match self.last_hourly_bucket {
            Some(last) => last.min(bucket),
            None => bucket,
        });
    }
}
