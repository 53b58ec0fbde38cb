use crate::model::{ReminderKind, ReminderMarkers};
use serde::{Deserialize, Serialize};
use time::Duration;

/// What to do with a task that stays overdue across polls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverduePolicy {
    #[default]
    Once,
    EveryPoll,
}

impl OverduePolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "once" => Some(Self::Once),
            "every_poll" | "repeat" => Some(Self::EveryPoll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub overdue: OverduePolicy,
    /// Minimum number of hour buckets between two periodic reminders.
    pub periodic_step_hours: u32,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            overdue: OverduePolicy::Once,
            periodic_step_hours: 2,
        }
    }
}

fn day() -> Duration {
    Duration::hours(24)
}

fn hour() -> Duration {
    Duration::hours(1)
}

/// Whole hours left before the deadline, zero once it has passed.
pub fn hour_bucket(remaining: Duration) -> u32 {
    u32::try_from(remaining.whole_hours().max(0)).unwrap_or(u32::MAX)
}

/// Picks the single reminder a task should receive for `remaining` time left,
/// given what it was already sent.
pub fn due_reminder(
    markers: &ReminderMarkers,
    remaining: Duration,
    policy: &ReminderPolicy,
) -> Option<ReminderKind> {
    if remaining <= Duration::ZERO {
        return match policy.overdue {
            OverduePolicy::Once if markers.overdue => None,
            _ => Some(ReminderKind::Overdue),
        };
    }

    if remaining >= day() - hour() && remaining < day() && !markers.twenty_four_hour {
        return Some(ReminderKind::TwentyFourHour);
    }

    if remaining <= hour() {
        return (!markers.one_hour).then_some(ReminderKind::OneHour);
    }

    if remaining < day() {
        let bucket = hour_bucket(remaining);
        let step = policy.periodic_step_hours.max(1);
        let due = match markers.last_hourly_bucket {
            None => true,
            Some(last) => last.saturating_sub(bucket) >= step,
        };
        if due {
            return Some(ReminderKind::Hourly(bucket));
        }
    }

    None
}
