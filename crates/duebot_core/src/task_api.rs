use crate::error::AppError;
use crate::model::{Priority, ReminderMarkers, Task, TaskComment, TaskStatus};
use crate::storage::json_store;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DueChange {
    Set(String),
    Clear,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskUpdate {
    pub description: Option<String>,
    pub due: Option<DueChange>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOutcome {
    pub task: Task,
    /// False when the task already carried the category, ignoring case.
    pub added: bool,
}

pub fn assign_task(
    owner_id: &str,
    description: &str,
    due: Option<&str>,
    priority: Priority,
    offset: UtcOffset,
) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    assign_task_with_path(&path, owner_id, description, due, priority, offset)
}

pub fn list_tasks(owner_id: Option<&str>) -> Result<Vec<Task>, AppError> {
    let path = json_store::store_path()?;
    list_tasks_with_path(&path, owner_id)
}

pub fn get_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    get_task_with_path(&path, id)
}

pub fn update_task(id: &str, update: &TaskUpdate, offset: UtcOffset) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    update_task_with_path(&path, id, update, offset)
}

pub fn complete_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    complete_task_with_path(&path, id)
}

pub fn remove_task(id: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    remove_task_with_path(&path, id)
}

/// Case-insensitive keyword search over task descriptions.
pub fn search_tasks(owner_id: Option<&str>, keyword: &str) -> Result<Vec<Task>, AppError> {
    let path = json_store::store_path()?;
    search_tasks_with_path(&path, owner_id, keyword)
}

pub fn add_category(id: &str, category: &str) -> Result<CategoryOutcome, AppError> {
    let path = json_store::store_path()?;
    add_category_with_path(&path, id, category)
}

pub fn comment_task(id: &str, author_id: &str, text: &str) -> Result<Task, AppError> {
    let path = json_store::store_path()?;
    comment_task_with_path(&path, id, author_id, text)
}

fn assign_task_with_path(
    path: &Path,
    owner_id: &str,
    description: &str,
    due: Option<&str>,
    priority: Priority,
    offset: UtcOffset,
) -> Result<Task, AppError> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(AppError::invalid_input("owner is required"));
    }

    let description = description.trim();
    if description.is_empty() {
        return Err(AppError::invalid_input("description is required"));
    }

    let due_at = due.map(|raw| parse_due_input(raw, offset)).transpose()?;
    let now = OffsetDateTime::now_utc();
    let created_at = now
        .to_offset(offset)
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;

    let task = Task {
        id: format!("task-{}", now.unix_timestamp_nanos()),
        owner_id: owner_id.to_string(),
        description: description.to_string(),
        priority,
        status: TaskStatus::Pending,
        created_at,
        due_at,
        completed_at: None,
        categories: Vec::new(),
        comments: Vec::new(),
        reminders: ReminderMarkers::default(),
    };

    let mut state = json_store::load_state(path)?;
    state.tasks.push(task.clone());
    json_store::save_state(path, &state)?;
    info!(task_id = %task.id, owner_id = %task.owner_id, "task assigned");

    Ok(task)
}

fn list_tasks_with_path(path: &Path, owner_id: Option<&str>) -> Result<Vec<Task>, AppError> {
    let tasks = json_store::load_tasks(path)?;
    let owner_id = owner_id.map(str::trim).filter(|owner| !owner.is_empty());
    Ok(match owner_id {
        Some(owner) => tasks
            .into_iter()
            .filter(|task| task.owner_id == owner)
            .collect(),
        None => tasks,
    })
}

fn get_task_with_path(path: &Path, id: &str) -> Result<Task, AppError> {
    let trimmed_id = require_id(id)?;
    json_store::load_tasks(path)?
        .into_iter()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))
}

fn update_task_with_path(
    path: &Path,
    id: &str,
    update: &TaskUpdate,
    offset: UtcOffset,
) -> Result<Task, AppError> {
    let trimmed_id = require_id(id)?;

    let description = match update.description.as_deref() {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(AppError::invalid_input("description is required"));
            }
            Some(trimmed.to_string())
        }
        None => None,
    };

    let due_at = match update.due.as_ref() {
        Some(DueChange::Set(raw)) => Some(Some(parse_due_input(raw, offset)?)),
        Some(DueChange::Clear) => Some(None),
        None => None,
    };

    let mut state = json_store::load_state(path)?;
    let task = state
        .tasks
        .iter_mut()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;

    if let Some(description) = description {
        task.description = description;
    }
    if let Some(priority) = update.priority {
        task.priority = priority;
    }
    if let Some(due_at) = due_at
        && !same_instant(task.due_at.as_deref(), due_at.as_deref())
    {
        task.due_at = due_at;
        task.reminders = ReminderMarkers::default();
        info!(task_id = %task.id, "due date changed, reminder markers cleared");
    }

    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn complete_task_with_path(path: &Path, id: &str) -> Result<Task, AppError> {
    let trimmed_id = require_id(id)?;

    let mut state = json_store::load_state(path)?;
    let task = state
        .tasks
        .iter_mut()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;

    if task.status == TaskStatus::Completed {
        return Err(AppError::invalid_input("task already completed"));
    }

    let completed_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    task.status = TaskStatus::Completed;
    task.completed_at = Some(completed_at);

    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn remove_task_with_path(path: &Path, id: &str) -> Result<Task, AppError> {
    let trimmed_id = require_id(id)?;

    let mut state = json_store::load_state(path)?;
    let index = state
        .tasks
        .iter()
        .position(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;

    let removed = state.tasks.remove(index);
    json_store::save_state(path, &state)?;

    Ok(removed)
}

fn search_tasks_with_path(
    path: &Path,
    owner_id: Option<&str>,
    keyword: &str,
) -> Result<Vec<Task>, AppError> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Err(AppError::invalid_input("keyword is required"));
    }

    Ok(list_tasks_with_path(path, owner_id)?
        .into_iter()
        .filter(|task| task.description.to_lowercase().contains(&needle))
        .collect())
}

fn add_category_with_path(
    path: &Path,
    id: &str,
    category: &str,
) -> Result<CategoryOutcome, AppError> {
    let trimmed_id = require_id(id)?;
    let category = category.trim();
    if category.is_empty() {
        return Err(AppError::invalid_input("category is required"));
    }

    let mut state = json_store::load_state(path)?;
    let task = state
        .tasks
        .iter_mut()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;

    let wanted = category.to_lowercase();
    if task
        .categories
        .iter()
        .any(|existing| existing.to_lowercase() == wanted)
    {
        return Ok(CategoryOutcome {
            task: task.clone(),
            added: false,
        });
    }

    task.categories.push(category.to_string());
    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(CategoryOutcome {
        task: updated,
        added: true,
    })
}

fn comment_task_with_path(
    path: &Path,
    id: &str,
    author_id: &str,
    text: &str,
) -> Result<Task, AppError> {
    let trimmed_id = require_id(id)?;
    let author_id = author_id.trim();
    if author_id.is_empty() {
        return Err(AppError::invalid_input("author is required"));
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::invalid_input("comment is required"));
    }

    let created_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;

    let mut state = json_store::load_state(path)?;
    let task = state
        .tasks
        .iter_mut()
        .find(|task| task.id == trimmed_id)
        .ok_or_else(|| AppError::invalid_input("task not found"))?;
    task.comments.push(TaskComment {
        author_id: author_id.to_string(),
        text: text.to_string(),
        created_at,
    });

    let updated = task.clone();
    json_store::save_state(path, &state)?;

    Ok(updated)
}

fn require_id(id: &str) -> Result<&str, AppError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("id is required"));
    }
    Ok(trimmed)
}

fn same_instant(current: Option<&str>, next: Option<&str>) -> bool {
    match (current, next) {
        (None, None) => true,
        (Some(a), Some(b)) => match (
            OffsetDateTime::parse(a, &Rfc3339),
            OffsetDateTime::parse(b, &Rfc3339),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        },
        _ => false,
    }
}

/// Accepts RFC3339 or a bare `YYYY-MM-DD`, which means midnight at `offset`.
pub fn parse_due_input(raw: &str, offset: UtcOffset) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("due date is required"));
    }

    let parsed = match OffsetDateTime::parse(trimmed, &Rfc3339) {
        Ok(parsed) => parsed,
        Err(_) => {
            let date = Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
                .map_err(|_| {
                    AppError::invalid_input("due date must be YYYY-MM-DD or RFC3339")
                })?;
            PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_offset(offset)
        }
    };

    parsed
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

pub fn task_overdue(task: &Task, now: OffsetDateTime) -> Result<bool, AppError> {
    if task.status == TaskStatus::Completed {
        return Ok(false);
    }
    let due_at = match task.due_at.as_deref() {
        Some(value) => value,
        None => return Ok(false),
    };
    let due = OffsetDateTime::parse(due_at, &Rfc3339)
        .map_err(|_| AppError::invalid_data("due_at must be RFC3339"))?;
    Ok(due <= now)
}
