use crate::error::AppError;
use crate::model::{ReminderMarkers, Task};
use time::OffsetDateTime;

pub mod json_store;
pub mod memory;

pub use json_store::JsonTaskStore;
pub use memory::MemoryTaskStore;

/// The slice of task storage the reminder engine needs.
pub trait TaskStore {
    /// Pending tasks that carry a due date.
    fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError>;

    /// Replaces the reminder markers of one task, as long as its due date is
    /// still `due_at`. A task rescheduled or completed in the meantime keeps
    /// what it has.
    fn save_markers(
        &self,
        task_id: &str,
        due_at: &str,
        markers: &ReminderMarkers,
    ) -> Result<(), AppError>;

    /// Latest instant a poll ran against this store.
    fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError>;

    /// Moves the last poll instant forward to `at`. Earlier instants are ignored.
    fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError>;
}

impl<S: TaskStore + ?Sized> TaskStore for &S {
    fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
        (**self).list_open_tasks_with_due_date()
    }

    fn save_markers(
        &self,
        task_id: &str,
        due_at: &str,
        markers: &ReminderMarkers,
    ) -> Result<(), AppError> {
        (**self).save_markers(task_id, due_at, markers)
    }

    fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
        (**self).last_polled_at()
    }

    fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError> {
        (**self).record_poll(at)
    }
}
