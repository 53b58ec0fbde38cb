use crate::error::AppError;
use crate::model::{ReminderMarkers, Task, TaskStatus};
use crate::storage::TaskStore;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

/// In-process [`TaskStore`], for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
    last_polled_at: Mutex<Option<OffsetDateTime>>,
}

impl MemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            last_polled_at: Mutex::new(None),
        }
    }

    pub fn insert(&self, task: Task) -> Result<(), AppError> {
        let mut tasks = self.lock()?;
        if tasks.iter().any(|existing| existing.id == task.id) {
            return Err(AppError::invalid_input(format!(
                "task {} already exists",
                task.id
            )));
        }
        tasks.push(task);
        Ok(())
    }

    pub fn get(&self, task_id: &str) -> Result<Option<Task>, AppError> {
        Ok(self.lock()?.iter().find(|task| task.id == task_id).cloned())
    }

    pub fn complete(&self, task_id: &str) -> Result<(), AppError> {
        self.with_task(task_id, |task| task.status = TaskStatus::Completed)
    }

    /// Moves the due date and clears the markers, like `update_task` does.
    pub fn reschedule(&self, task_id: &str, due_at: Option<String>) -> Result<(), AppError> {
        self.with_task(task_id, |task| {
            task.due_at = due_at;
            task.reminders = ReminderMarkers::default();
        })
    }

    pub fn snapshot(&self) -> Result<Vec<Task>, AppError> {
        Ok(self.lock()?.clone())
    }

    fn with_task(&self, task_id: &str, apply: impl FnOnce(&mut Task)) -> Result<(), AppError> {
        let mut tasks = self.lock()?;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| AppError::invalid_input(format!("task {task_id} not found")))?;
        apply(task);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Task>>, AppError> {
        self.tasks
            .lock()
            .map_err(|_| AppError::io("task store lock poisoned"))
    }

    fn lock_last_poll(&self) -> Result<MutexGuard<'_, Option<OffsetDateTime>>, AppError> {
        self.last_polled_at
            .lock()
            .map_err(|_| AppError::io("task store lock poisoned"))
    }
}

impl TaskStore for MemoryTaskStore {
    fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|task| task.is_reminder_eligible())
            .cloned()
            .collect())
    }

    fn save_markers(
        &self,
        task_id: &str,
        due_at: &str,
        markers: &ReminderMarkers,
    ) -> Result<(), AppError> {
        self.with_task(task_id, |task| {
            if task.status == TaskStatus::Pending && task.due_at.as_deref() == Some(due_at) {
                task.reminders = markers.clone();
            }
        })
    }

    fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
        Ok(*self.lock_last_poll()?)
    }

    fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError> {
        let mut last = self.lock_last_poll()?;
        if last.is_none_or(|last| at > last) {
            *last = Some(at);
        }
        Ok(())
    }
}
