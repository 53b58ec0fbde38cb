use clap::Parser;
use duebot_cli::cli::{CategoryAction, Cli, Command, collect_overrides};
use duebot_cli::daemon;
use duebot_core::clock::{Clock, SystemClock};
use duebot_core::config::{self, Config};
use duebot_core::error::AppError;
use duebot_core::model::{Priority, Task, TaskStatus};
use duebot_core::reminder::PollResult;
use duebot_core::task_api::{self, DueChange, TaskUpdate};
use tabled::{Table, Tabled};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Tabled)]
struct TaskRow {
    id: String,
    owner: String,
    description: String,
    priority: &'static str,
    status: String,
    due: String,
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Completed => "completed",
    }
}

fn status_with_overdue(task: &Task, now: OffsetDateTime) -> Result<String, AppError> {
    let status = status_label(task.status);
    if task_api::task_overdue(task, now)? {
        Ok(format!("{status} (overdue)"))
    } else {
        Ok(status.to_string())
    }
}

fn print_tasks_table(tasks: &[Task], now: OffsetDateTime) -> Result<(), AppError> {
    if tasks.is_empty() {
        println!("No tasks");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(tasks.len());
    for task in tasks {
        rows.push(TaskRow {
            id: task.id.clone(),
            owner: task.owner_id.clone(),
            description: task.description.clone(),
            priority: task.priority.label(),
            status: status_with_overdue(task, now)?,
            due: task.due_at.clone().unwrap_or_else(|| "-".to_string()),
        });
    }
    println!("{}", Table::new(rows));
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered =
        serde_json::to_string(value).map_err(|err| AppError::invalid_data(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn print_task_plain(task: &Task) {
    println!("id: {}", task.id);
    println!("owner: {}", task.owner_id);
    println!("description: {}", task.description);
    println!("priority: {}", task.priority.label());
    println!("status: {}", status_label(task.status));
    println!("due: {}", task.due_at.as_deref().unwrap_or("-"));
    if let Some(completed_at) = task.completed_at.as_deref() {
        println!("completed: {completed_at}");
    }
    if !task.categories.is_empty() {
        println!("categories: {}", task.categories.join(", "));
    }
    for comment in &task.comments {
        println!(
            "comment [{}] {}: {}",
            comment.created_at, comment.author_id, comment.text
        );
    }
}

fn print_poll_result(result: &PollResult, json: bool) {
    if json {
        let failures: Vec<_> = result
            .failures
            .iter()
            .map(|failure| {
                serde_json::json!({
                    "task_id": failure.task_id,
                    "code": failure.error.code(),
                    "message": failure.error.message(),
                })
            })
            .collect();
        let payload = serde_json::json!({
            "fired": result.fired_count(),
            "reminders": result.reminders,
            "failures": failures,
            "regressed": result.regressed,
        });
        println!("{payload}");
        return;
    }

    if result.regressed {
        println!("Clock is behind the last poll, nothing evaluated");
        return;
    }
    if result.reminders.is_empty() && result.failures.is_empty() {
        println!("No reminders due");
    }
    for reminder in &result.reminders {
        println!(
            "Reminded {}: {} ({}) is {}",
            reminder.owner_id,
            reminder.description,
            reminder.task_id,
            reminder.kind.label()
        );
    }
    for failure in &result.failures {
        println!("Reminder failed: {} - {}", failure.task_id, failure.error);
    }
}

fn parse_priority(raw: &str) -> Result<Priority, AppError> {
    Priority::parse(raw)
        .ok_or_else(|| AppError::invalid_input("priority must be low, normal or high"))
}

fn load_effective_config(cli: &Cli) -> Result<Config, AppError> {
    let loaded = config::load_config_with_fallback();
    if let Some(err) = loaded.error.as_ref() {
        warn!(error = %err, "config not loaded, using defaults");
    }

    let overrides = collect_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    let merged = config::merge_overrides(&loaded.config, &overrides);
    merged.validate()?;
    Ok(merged)
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let config = load_effective_config(&cli)?;
    let offset = config.offset()?;

    match cli.command {
        Command::Assign {
            owner,
            description,
            due,
            priority,
        } => {
            let priority = parse_priority(&priority)?;
            let task =
                task_api::assign_task(&owner, &description, due.as_deref(), priority, offset)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!(
                    "Assigned task: {} ({}) to {}",
                    task.description, task.id, task.owner_id
                );
            }
        }
        Command::List { owner } => {
            let tasks = task_api::list_tasks(owner.as_deref())?;
            if cli.json {
                print_json(&tasks)?;
            } else {
                print_tasks_table(&tasks, SystemClock::new(offset).now())?;
            }
        }
        Command::Show { id } => {
            let task = task_api::get_task(&id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                print_task_plain(&task);
            }
        }
        Command::Update {
            id,
            description,
            due,
            clear_due,
            priority,
        } => {
            let due = match (due, clear_due) {
                (Some(raw), _) => Some(DueChange::Set(raw)),
                (None, true) => Some(DueChange::Clear),
                (None, false) => None,
            };
            let update = TaskUpdate {
                description,
                due,
                priority: priority.as_deref().map(parse_priority).transpose()?,
            };
            let task = task_api::update_task(&id, &update, offset)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Updated task: {} ({})", task.description, task.id);
            }
        }
        Command::Complete { id } => {
            let task = task_api::complete_task(&id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Completed task: {} ({})", task.description, task.id);
            }
        }
        Command::Remove { id } => {
            let task = task_api::remove_task(&id)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Removed task: {} ({})", task.description, task.id);
            }
        }
        Command::Search { keyword, owner } => {
            let tasks = task_api::search_tasks(owner.as_deref(), &keyword)?;
            if cli.json {
                print_json(&tasks)?;
            } else if tasks.is_empty() {
                println!("No tasks matching '{}'", keyword.trim());
            } else {
                print_tasks_table(&tasks, SystemClock::new(offset).now())?;
            }
        }
        Command::Category {
            action: CategoryAction::Add { id, category },
        } => {
            let outcome = task_api::add_category(&id, &category)?;
            if cli.json {
                print_json(&outcome.task)?;
            } else if outcome.added {
                println!("Added category '{}' to {}", category.trim(), outcome.task.id);
            } else {
                println!("{} already has category '{}'", outcome.task.id, category.trim());
            }
        }
        Command::Comment { id, text, author } => {
            let author = match author {
                Some(author) => author,
                None => task_api::get_task(&id)?.owner_id,
            };
            let task = task_api::comment_task(&id, &author, &text)?;
            if cli.json {
                print_json(&task)?;
            } else {
                println!("Comment added to {} ({})", task.description, task.id);
            }
        }
        Command::Poll { at } => {
            let now = match at.as_deref() {
                Some(raw) => OffsetDateTime::parse(raw.trim(), &Rfc3339)
                    .map_err(|_| AppError::invalid_input("--at must be RFC3339"))?,
                None => SystemClock::new(offset).now(),
            };
            let mut engine = daemon::build_engine(&config)?;
            let result = engine.poll(now)?;
            print_poll_result(&result, cli.json);
        }
        Command::Run => daemon::run(&config)?,
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
