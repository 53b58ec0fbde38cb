use crate::error::AppError;
use crate::model::{ReminderKind, Task};
use std::collections::HashMap;
use tracing::debug;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsNotifier;

const DISABLE_ENV_VAR: &str = "DUEBOT_DISABLE_NOTIFICATIONS";
pub const SUMMARY: &str = "duebot";

/// Delivers a reminder to the owner of a task.
pub trait Notifier {
    fn notify(&self, task: &Task, kind: ReminderKind) -> Result<(), AppError>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        (**self).notify(task, kind)
    }
}

/// Output channel that shows a reminder to an already resolved recipient.
pub trait ReminderSink {
    fn deliver(&self, recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError>;
}

impl<S: ReminderSink + ?Sized> ReminderSink for Box<S> {
    fn deliver(&self, recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        (**self).deliver(recipient, task, kind)
    }
}

pub struct NoopNotifier;

impl ReminderSink for NoopNotifier {
    fn deliver(&self, recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        debug!(task_id = %task.id, recipient, %kind, "notifications disabled, reminder dropped");
        Ok(())
    }
}

/// Resolves owners against a configured roster and hands the reminder, with
/// the owner's display name, to the wrapped sink. An empty roster accepts
/// every owner under their id.
pub struct RecipientDirectory<S> {
    recipients: HashMap<String, String>,
    sink: S,
}

impl<S: ReminderSink> RecipientDirectory<S> {
    pub fn new(recipients: HashMap<String, String>, sink: S) -> Self {
        Self { recipients, sink }
    }

    pub fn display_name<'a>(&'a self, owner_id: &'a str) -> Option<&'a str> {
        if self.recipients.is_empty() {
            return Some(owner_id);
        }
        self.recipients.get(owner_id).map(String::as_str)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ReminderSink> Notifier for RecipientDirectory<S> {
    fn notify(&self, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        let name = self.display_name(&task.owner_id).ok_or_else(|| {
            AppError::unknown_recipient(format!("no recipient for owner {}", task.owner_id))
        })?;
        debug!(task_id = %task.id, recipient = name, %kind, "delivering reminder");
        self.sink.deliver(name, task, kind)
    }
}

/// Notification title naming who the reminder is for.
pub fn reminder_title(recipient: &str) -> String {
    format!("{SUMMARY}: {recipient}")
}

/// One-line reminder text shared by every desktop backend.
pub fn reminder_body(task: &Task, kind: ReminderKind) -> String {
    let due = task.due_at.as_deref().unwrap_or("-");
    format!(
        "{} ({}) is {} [due {}, {} priority]",
        task.description,
        task.id,
        kind.label(),
        due,
        task.priority.label()
    )
}

pub fn notifier_from_env(
    recipients: &HashMap<String, String>,
) -> Result<Box<dyn Notifier + Send>, AppError> {
    let sink: Box<dyn ReminderSink + Send> = if std::env::var(DISABLE_ENV_VAR).is_ok() {
        Box::new(NoopNotifier)
    } else {
        match platform_sink() {
            Ok(sink) => sink,
            Err(AppError::InvalidData(_)) => Box::new(NoopNotifier),
            Err(other) => return Err(other),
        }
    };

    Ok(Box::new(RecipientDirectory::new(recipients.clone(), sink)))
}

#[cfg(target_os = "linux")]
pub fn platform_sink() -> Result<Box<dyn ReminderSink + Send>, AppError> {
    Ok(Box::new(LinuxNotifier))
}

#[cfg(windows)]
pub fn platform_sink() -> Result<Box<dyn ReminderSink + Send>, AppError> {
    Ok(Box::new(WindowsNotifier))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_sink() -> Result<Box<dyn ReminderSink + Send>, AppError> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}
