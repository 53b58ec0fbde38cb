mod reminder;
mod task;

pub use reminder::{ReminderKind, ReminderMarkers};
pub use task::{Priority, Task, TaskComment, TaskStatus};
