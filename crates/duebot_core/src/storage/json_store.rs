use crate::error::AppError;
use crate::model::{ReminderMarkers, Task, TaskStatus};
use crate::storage::TaskStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

pub const SCHEMA_VERSION: u32 = 2;
const STORE_FILE_NAME: &str = "tasks.json";
const STORE_ENV_VAR: &str = "DUEBOT_STORE_PATH";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_polled_at: Option<String>,
    tasks: Vec<Task>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub tasks: Vec<Task>,
    /// RFC3339 instant of the latest reminder poll.
    pub last_polled_at: Option<String>,
}

pub fn store_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(STORE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("duebot").join(STORE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("duebot")
            .join(STORE_FILE_NAME))
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>, AppError> {
    Ok(load_state(path)?.tasks)
}

pub fn load_state(path: &Path) -> Result<TaskState, AppError> {
    if !path.exists() {
        return Ok(TaskState::default());
    }

    let content = std::fs::read_to_string(path)?;
    let stored: StoredTasks =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if !(1..=SCHEMA_VERSION).contains(&stored.schema_version) {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    let mut seen = HashSet::new();
    for task in &stored.tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(AppError::invalid_data(format!(
                "duplicate task id {}",
                task.id
            )));
        }
    }

    Ok(TaskState {
        tasks: stored.tasks,
        last_polled_at: stored.last_polled_at,
    })
}

pub fn save_tasks(path: &Path, tasks: &[Task]) -> Result<(), AppError> {
    let mut state = load_state(path)?;
    state.tasks = tasks.to_vec();
    save_state(path, &state)
}

pub fn save_state(path: &Path, state: &TaskState) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let stored = StoredTasks {
        schema_version: SCHEMA_VERSION,
        last_polled_at: state.last_polled_at.clone(),
        tasks: state.tasks.to_vec(),
    };
    let content = serde_json::to_string_pretty(&stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    std::fs::write(path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, permissions)?;
    }

    Ok(())
}

/// File-backed [`TaskStore`]. Every call re-reads the file, so edits made by
/// the CLI between polls are picked up.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_env() -> Result<Self, AppError> {
        Ok(Self::new(store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonTaskStore {
    fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
        let state = load_state(&self.path)?;
        Ok(state
            .tasks
            .into_iter()
            .filter(Task::is_reminder_eligible)
            .collect())
    }

    fn save_markers(
        &self,
        task_id: &str,
        due_at: &str,
        markers: &ReminderMarkers,
    ) -> Result<(), AppError> {
        let mut state = load_state(&self.path)?;
        let task = state
            .tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| AppError::invalid_input(format!("task {task_id} not found")))?;

        if task.status == TaskStatus::Completed {
            debug!(task_id, "task completed since poll started, markers dropped");
            return Ok(());
        }
        if task.due_at.as_deref() != Some(due_at) {
            debug!(task_id, "due date moved since poll started, markers dropped");
            return Ok(());
        }

        task.reminders = markers.clone();
        save_state(&self.path, &state)
    }

    fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
        load_state(&self.path)?
            .last_polled_at
            .as_deref()
            .map(|raw| {
                OffsetDateTime::parse(raw, &Rfc3339)
                    .map_err(|_| AppError::invalid_data("last_polled_at must be RFC3339"))
            })
            .transpose()
    }

    fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError> {
        if self.last_polled_at()?.is_some_and(|last| at <= last) {
            return Ok(());
        }

        let mut state = load_state(&self.path)?;
        state.last_polled_at = Some(
            at.format(&Rfc3339)
                .map_err(|err| AppError::invalid_data(err.to_string()))?,
        );
        save_state(&self.path, &state)
    }
}
