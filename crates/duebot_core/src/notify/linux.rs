use crate::error::AppError;
use crate::model::{ReminderKind, Task};
use crate::notify::{ReminderSink, reminder_body, reminder_title};
use notify_rust::{Notification, Urgency};

pub struct LinuxNotifier;

impl ReminderSink for LinuxNotifier {
    fn deliver(&self, recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        let urgency = match kind {
            ReminderKind::OneHour | ReminderKind::Overdue => Urgency::Critical,
            _ => Urgency::Normal,
        };

        Notification::new()
            .summary(&reminder_title(recipient))
            .body(&reminder_body(task, kind))
            .urgency(urgency)
            .show()
            .map_err(|err| AppError::delivery(err.to_string()))?;

        Ok(())
    }
}
