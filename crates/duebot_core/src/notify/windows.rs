use crate::error::AppError;
use crate::model::{ReminderKind, Task};
use crate::notify::{ReminderSink, reminder_body, reminder_title};
use tauri_winrt_notification::Toast;

pub struct WindowsNotifier;

impl ReminderSink for WindowsNotifier {
    fn deliver(&self, recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
        Toast::new(Toast::POWERSHELL_APP_ID)
            .title(&reminder_title(recipient))
            .text1(&reminder_body(task, kind))
            .text2(&task.id)
            .show()
            .map_err(|err| AppError::delivery(err.to_string()))?;
        Ok(())
    }
}
