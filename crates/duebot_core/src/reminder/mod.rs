//! Due-date reminder engine.
//!
//! Each [`ReminderEngine::poll`] walks the open tasks of a [`TaskStore`],
//! picks at most one reminder per task from its remaining time and the
//! markers it already carries, hands that reminder to a [`Notifier`] and
//! writes the updated markers back one task at a time.

mod window;

pub use window::{OverduePolicy, ReminderPolicy, due_reminder, hour_bucket};

use crate::error::AppError;
use crate::model::{ReminderKind, Task};
use crate::notify::Notifier;
use crate::storage::TaskStore;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiredReminder {
    pub task_id: String,
    pub owner_id: String,
    pub description: String,
    pub kind: ReminderKind,
}

#[derive(Debug)]
pub struct PollFailure {
    pub task_id: String,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct PollResult {
    pub reminders: Vec<FiredReminder>,
    pub failures: Vec<PollFailure>,
    /// Set when `now` was behind the previous poll and nothing was evaluated.
    pub regressed: bool,
}

impl PollResult {
    pub fn fired_count(&self) -> usize {
        self.reminders.len()
    }
}

pub struct ReminderEngine<S, N> {
    store: S,
    notifier: N,
    policy: ReminderPolicy,
    last_poll: Option<OffsetDateTime>,
}

impl<S: TaskStore, N: Notifier> ReminderEngine<S, N> {
    pub fn new(store: S, notifier: N, policy: ReminderPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
            last_poll: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Runs one evaluation cycle at `now`.
    ///
    /// Only a failure to read the task list aborts the poll; everything that
    /// goes wrong for a single task is reported in [`PollResult::failures`].
    pub fn poll(&mut self, now: OffsetDateTime) -> Result<PollResult, AppError> {
        let stored_last = self
            .store
            .last_polled_at()
            .inspect_err(|err| error!(error = %err, "cannot read last poll, poll aborted"))?;
        if let Some(last) = self.last_poll.max(stored_last)
            && now < last
        {
            warn!(%now, %last, "clock went backwards, skipping poll");
            return Ok(PollResult {
                regressed: true,
                ..PollResult::default()
            });
        }

        let tasks = self
            .store
            .list_open_tasks_with_due_date()
            .inspect_err(|err| error!(error = %err, "cannot load tasks, poll aborted"))?;
        self.last_poll = Some(now);

        let mut result = PollResult::default();
        for task in &tasks {
            self.evaluate(task, now, &mut result);
        }

        if let Err(err) = self.store.record_poll(now) {
            warn!(error = %err, "cannot persist last poll time");
        }

        info!(
            tasks = tasks.len(),
            fired = result.fired_count(),
            failures = result.failures.len(),
            "poll finished"
        );
        Ok(result)
    }

    fn evaluate(&self, task: &Task, now: OffsetDateTime, result: &mut PollResult) {
        if !task.is_reminder_eligible() {
            return;
        }

        let (raw_due_at, due_at) = match parse_due_at(task) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "skipping task with malformed due date");
                result.failures.push(PollFailure {
                    task_id: task.id.clone(),
                    error: err,
                });
                return;
            }
        };

        let remaining = due_at - now;
        let Some(kind) = due_reminder(&task.reminders, remaining, &self.policy) else {
            debug!(task_id = %task.id, %remaining, "no reminder due");
            return;
        };

        let mut markers = task.reminders.clone();
        match self.notifier.notify(task, kind) {
            Ok(()) => {
                info!(task_id = %task.id, owner_id = %task.owner_id, %kind, "reminder sent");
                markers.record(kind, hour_bucket(remaining));
                result.reminders.push(FiredReminder {
                    task_id: task.id.clone(),
                    owner_id: task.owner_id.clone(),
                    description: task.description.clone(),
                    kind,
                });
            }
            Err(AppError::UnknownRecipient(_))
                if kind == ReminderKind::Overdue && task.reminders.overdue =>
            {
                debug!(task_id = %task.id, owner_id = %task.owner_id, "owner still unresolvable, repeat overdue skipped");
                return;
            }
            Err(err @ AppError::UnknownRecipient(_)) => {
                warn!(task_id = %task.id, owner_id = %task.owner_id, %kind, "owner unresolvable, reminder marked as handled");
                markers.record(kind, hour_bucket(remaining));
                result.failures.push(PollFailure {
                    task_id: task.id.clone(),
                    error: err,
                });
            }
            Err(err) => {
                warn!(task_id = %task.id, %kind, error = %err, "delivery failed, will retry next poll");
                result.failures.push(PollFailure {
                    task_id: task.id.clone(),
                    error: err,
                });
                return;
            }
        }

        if markers == task.reminders {
            return;
        }
        if let Err(err) = self.store.save_markers(&task.id, raw_due_at, &markers) {
            warn!(task_id = %task.id, error = %err, "cannot persist reminder markers");
            result.failures.push(PollFailure {
                task_id: task.id.clone(),
                error: err,
            });
        }
    }
}

fn parse_due_at(task: &Task) -> Result<(&str, OffsetDateTime), AppError> {
    let raw = task
        .due_at
        .as_deref()
        .ok_or_else(|| AppError::invalid_data(format!("task {} has no due date", task.id)))?;
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|_| AppError::invalid_data(format!("due_at of {} must be RFC3339", task.id)))?;
    Ok((raw, parsed))
}

#[cfg(test)]
mod tests {
    use super::{OverduePolicy, ReminderEngine, ReminderPolicy};
    use crate::clock::{Clock, FixedClock};
    use crate::error::AppError;
    use crate::model::{Priority, ReminderKind, ReminderMarkers, Task, TaskStatus};
    use crate::notify::{Notifier, RecipientDirectory, ReminderSink};
    use crate::storage::{MemoryTaskStore, TaskStore};
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use time::format_description::well_known::Rfc3339;
    use time::macros::datetime;
    use time::{Duration, OffsetDateTime};

    const START: OffsetDateTime = datetime!(2025-05-24 09:00 -5);

    #[derive(Default)]
    struct RecordingNotifier {
        sent: RefCell<Vec<(String, ReminderKind)>>,
        failing: Cell<bool>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(String, ReminderKind)> {
            self.sent.borrow().clone()
        }

        fn kinds_for(&self, task_id: &str) -> Vec<ReminderKind> {
            self.sent
                .borrow()
                .iter()
                .filter(|(id, _)| id == task_id)
                .map(|(_, kind)| *kind)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
            if self.failing.get() {
                return Err(AppError::delivery("recipient unreachable"));
            }
            self.sent.borrow_mut().push((task.id.clone(), kind));
            Ok(())
        }
    }

    impl ReminderSink for RecordingNotifier {
        fn deliver(&self, _recipient: &str, task: &Task, kind: ReminderKind) -> Result<(), AppError> {
            self.notify(task, kind)
        }
    }

    /// Returns every task, completed ones included.
    struct UnfilteredStore(MemoryTaskStore);

    impl TaskStore for UnfilteredStore {
        fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
            self.0.snapshot()
        }

        fn save_markers(
            &self,
            task_id: &str,
            due_at: &str,
            markers: &ReminderMarkers,
        ) -> Result<(), AppError> {
            self.0.save_markers(task_id, due_at, markers)
        }

        fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
            self.0.last_polled_at()
        }

        fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError> {
            self.0.record_poll(at)
        }
    }

    /// Simulates a CLI reschedule landing between the task read and the
    /// marker write of a poll.
    struct ReschedulingStore {
        inner: MemoryTaskStore,
        moved_to: String,
    }

    impl TaskStore for ReschedulingStore {
        fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
            let tasks = self.inner.list_open_tasks_with_due_date()?;
            for task in &tasks {
                self.inner.reschedule(&task.id, Some(self.moved_to.clone()))?;
            }
            Ok(tasks)
        }

        fn save_markers(
            &self,
            task_id: &str,
            due_at: &str,
            markers: &ReminderMarkers,
        ) -> Result<(), AppError> {
            self.inner.save_markers(task_id, due_at, markers)
        }

        fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
            self.inner.last_polled_at()
        }

        fn record_poll(&self, at: OffsetDateTime) -> Result<(), AppError> {
            self.inner.record_poll(at)
        }
    }

    struct BrokenStore {
        readable: bool,
        inner: MemoryTaskStore,
    }

    impl TaskStore for BrokenStore {
        fn list_open_tasks_with_due_date(&self) -> Result<Vec<Task>, AppError> {
            if !self.readable {
                return Err(AppError::io("disk unavailable"));
            }
            self.inner.list_open_tasks_with_due_date()
        }

        fn save_markers(
            &self,
            _task_id: &str,
            _due_at: &str,
            _markers: &ReminderMarkers,
        ) -> Result<(), AppError> {
            Err(AppError::io("read-only file system"))
        }

        fn last_polled_at(&self) -> Result<Option<OffsetDateTime>, AppError> {
            Ok(None)
        }

        fn record_poll(&self, _at: OffsetDateTime) -> Result<(), AppError> {
            Err(AppError::io("read-only file system"))
        }
    }

    fn task(id: &str, owner_id: &str, due_at: OffsetDateTime) -> Task {
        Task {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            description: format!("work item {id}"),
            priority: Priority::Normal,
            status: TaskStatus::Pending,
            created_at: "2025-05-20T00:00:00Z".to_string(),
            due_at: Some(due_at.format(&Rfc3339).unwrap()),
            completed_at: None,
            categories: Vec::new(),
            comments: Vec::new(),
            reminders: ReminderMarkers::default(),
        }
    }

    fn engine(tasks: Vec<Task>) -> ReminderEngine<MemoryTaskStore, RecordingNotifier> {
        ReminderEngine::new(
            MemoryTaskStore::new(tasks),
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        )
    }

    fn markers(engine: &ReminderEngine<MemoryTaskStore, RecordingNotifier>, id: &str) -> ReminderMarkers {
        engine.store().get(id).unwrap().unwrap().reminders
    }

    #[test]
    fn twenty_four_hour_reminder_fires_once_across_repeated_polls() {
        let due = START + Duration::hours(24) - Duration::minutes(5);
        let mut engine = engine(vec![task("task-1", "alice", due)]);

        let mut fired = 0;
        for minute in 0..50 {
            fired += engine
                .poll(START + Duration::minutes(minute))
                .unwrap()
                .fired_count();
        }

        assert_eq!(fired, 1);
        assert_eq!(
            engine.notifier().kinds_for("task-1"),
            vec![ReminderKind::TwentyFourHour]
        );
        assert!(markers(&engine, "task-1").twenty_four_hour);
    }

    #[test]
    fn marked_twenty_four_hour_is_not_sent_again() {
        let mut stored = task("task-1", "alice", START + Duration::hours(23) + Duration::minutes(30));
        stored.reminders.record(ReminderKind::TwentyFourHour, 23);
        let mut engine = engine(vec![stored]);

        engine.poll(START).unwrap();
        engine.poll(START + Duration::minutes(10)).unwrap();

        assert!(engine.notifier().sent().is_empty());
    }

    #[test]
    fn completed_tasks_are_never_notified() {
        let store = MemoryTaskStore::new(vec![
            task("task-1", "alice", START - Duration::hours(3)),
            task("task-2", "alice", START + Duration::minutes(20)),
        ]);
        store.complete("task-1").unwrap();
        store.complete("task-2").unwrap();

        let mut engine = ReminderEngine::new(
            UnfilteredStore(store),
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        );
        let result = engine.poll(START).unwrap();

        assert_eq!(result.fired_count(), 0);
        assert!(engine.notifier().sent().is_empty());
        assert!(engine.store().0.snapshot().unwrap().iter().all(|t| t.reminders.is_empty()));
    }

    #[test]
    fn overdue_fires_once_by_default() {
        let mut engine = engine(vec![task("task-1", "alice", START - Duration::hours(1))]);

        let first = engine.poll(START).unwrap();
        let second = engine.poll(START).unwrap();

        assert_eq!(first.fired_count(), 1);
        assert_eq!(first.reminders[0].kind, ReminderKind::Overdue);
        assert_eq!(second.fired_count(), 0);
        assert!(markers(&engine, "task-1").overdue);
    }

    #[test]
    fn overdue_repeats_every_poll_when_configured() {
        let mut engine = ReminderEngine::new(
            MemoryTaskStore::new(vec![task("task-1", "alice", START - Duration::hours(1))]),
            RecordingNotifier::default(),
            ReminderPolicy {
                overdue: OverduePolicy::EveryPoll,
                ..ReminderPolicy::default()
            },
        );

        for hour in 0..3 {
            engine.poll(START + Duration::hours(hour)).unwrap();
        }

        assert_eq!(
            engine.notifier().kinds_for("task-1"),
            vec![ReminderKind::Overdue; 3]
        );
    }

    #[test]
    fn failed_delivery_leaves_marker_unset_and_retries() {
        let mut engine = engine(vec![task("task-1", "alice", START + Duration::minutes(40))]);
        engine.notifier().failing.set(true);

        let failed = engine.poll(START).unwrap();
        assert_eq!(failed.fired_count(), 0);
        assert_eq!(failed.failures.len(), 1);
        assert_eq!(failed.failures[0].error.code(), "delivery_failed");
        assert!(markers(&engine, "task-1").is_empty());

        engine.notifier().failing.set(false);
        let retried = engine.poll(START + Duration::minutes(10)).unwrap();

        assert_eq!(retried.fired_count(), 1);
        assert_eq!(retried.reminders[0].kind, ReminderKind::OneHour);
        assert!(markers(&engine, "task-1").one_hour);
    }

    #[test]
    fn clock_regression_fires_nothing_and_keeps_markers() {
        let mut engine = engine(vec![task("task-1", "alice", START + Duration::minutes(23 * 60 + 30))]);
        let clock = FixedClock::new(START);

        assert_eq!(engine.poll(clock.now()).unwrap().fired_count(), 1);
        let before = markers(&engine, "task-1");

        clock.set(START - Duration::hours(2));
        let regressed = engine.poll(clock.now()).unwrap();
        assert!(regressed.regressed);
        assert_eq!(regressed.fired_count(), 0);
        assert_eq!(markers(&engine, "task-1"), before);

        clock.set(START + Duration::minutes(5));
        let resumed = engine.poll(clock.now()).unwrap();
        assert!(!resumed.regressed);
        assert_eq!(resumed.fired_count(), 0);
        assert_eq!(engine.notifier().sent().len(), 1);
    }

    #[test]
    fn countdown_from_twenty_five_hours_at_hourly_cadence() {
        let due = START + Duration::hours(25);
        let mut engine = engine(vec![task("task-1", "alice", due)]);
        let clock = FixedClock::new(START);

        let mut per_poll = Vec::new();
        for _ in 0..=25 {
            let result = engine.poll(clock.now()).unwrap();
            per_poll.push(result.reminders.iter().map(|r| r.kind).collect::<Vec<_>>());
            clock.advance(Duration::hours(1));
        }

        assert!(per_poll[0].is_empty());
        assert!(per_poll[1].is_empty());
        assert_eq!(per_poll[2], vec![ReminderKind::TwentyFourHour]);
        assert_eq!(per_poll[24], vec![ReminderKind::OneHour]);
        assert_eq!(per_poll[25], vec![ReminderKind::Overdue]);

        let kinds = engine.notifier().kinds_for("task-1");
        let count = |wanted: ReminderKind| kinds.iter().filter(|kind| **kind == wanted).count();
        assert_eq!(count(ReminderKind::TwentyFourHour), 1);
        assert_eq!(count(ReminderKind::OneHour), 1);

        let buckets: Vec<u32> = kinds
            .iter()
            .filter_map(|kind| match kind {
                ReminderKind::Hourly(hours) => Some(*hours),
                _ => None,
            })
            .collect();
        let distinct: HashSet<u32> = buckets.iter().copied().collect();
        assert_eq!(distinct.len(), buckets.len());
        assert_eq!(buckets.first(), Some(&21));
        assert_eq!(buckets.last(), Some(&3));
        assert!(per_poll.iter().all(|fired| fired.len() <= 1));
    }

    #[test]
    fn one_poll_handles_near_and_overdue_tasks_of_one_owner() {
        let mut engine = engine(vec![
            task("task-soon", "alice", START + Duration::minutes(30)),
            task("task-late", "alice", START - Duration::hours(2)),
        ]);

        let result = engine.poll(START).unwrap();

        assert_eq!(result.fired_count(), 2);
        assert_eq!(engine.notifier().kinds_for("task-soon"), vec![ReminderKind::OneHour]);
        assert_eq!(engine.notifier().kinds_for("task-late"), vec![ReminderKind::Overdue]);

        let soon = markers(&engine, "task-soon");
        let late = markers(&engine, "task-late");
        assert!(soon.one_hour && !soon.overdue);
        assert!(late.overdue && !late.one_hour);
    }

    #[test]
    fn malformed_due_date_is_isolated() {
        let mut broken = task("task-bad", "alice", START);
        broken.due_at = Some("next tuesday".to_string());
        let mut engine = engine(vec![broken, task("task-ok", "bob", START - Duration::hours(1))]);

        let result = engine.poll(START).unwrap();

        assert_eq!(result.fired_count(), 1);
        assert_eq!(result.reminders[0].task_id, "task-ok");
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].task_id, "task-bad");
        assert_eq!(result.failures[0].error.code(), "invalid_data");
    }

    #[test]
    fn unknown_recipient_is_marked_to_stop_retries() {
        let roster = [("alice".to_string(), "Alice".to_string())]
            .into_iter()
            .collect();
        let mut engine = ReminderEngine::new(
            MemoryTaskStore::new(vec![
                task("task-1", "ghost", START - Duration::hours(1)),
                task("task-2", "alice", START - Duration::hours(1)),
            ]),
            RecipientDirectory::new(roster, RecordingNotifier::default()),
            ReminderPolicy::default(),
        );

        let first = engine.poll(START).unwrap();
        let second = engine.poll(START + Duration::hours(1)).unwrap();

        assert_eq!(first.fired_count(), 1);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].error.code(), "unknown_recipient");
        assert!(engine.store().get("task-1").unwrap().unwrap().reminders.overdue);
        assert_eq!(second.fired_count(), 0);
        assert!(second.failures.is_empty());
    }

    #[test]
    fn store_read_failure_aborts_the_poll() {
        let mut engine = ReminderEngine::new(
            BrokenStore {
                readable: false,
                inner: MemoryTaskStore::default(),
            },
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        );

        let err = engine.poll(START).unwrap_err();

        assert_eq!(err.code(), "io_error");
        assert!(engine.notifier().sent().is_empty());
    }

    #[test]
    fn marker_write_failure_is_reported_but_delivery_counts() {
        let mut engine = ReminderEngine::new(
            BrokenStore {
                readable: true,
                inner: MemoryTaskStore::new(vec![task("task-1", "alice", START - Duration::hours(1))]),
            },
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        );

        let result = engine.poll(START).unwrap();

        assert_eq!(result.fired_count(), 1);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].error.message(), "read-only file system");
    }

    #[test]
    fn tasks_without_due_date_are_ignored() {
        let mut undated = task("task-1", "alice", START);
        undated.due_at = None;
        let mut engine = ReminderEngine::new(
            UnfilteredStore(MemoryTaskStore::new(vec![undated])),
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        );

        let result = engine.poll(START).unwrap();

        assert_eq!(result.fired_count(), 0);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn regression_is_detected_by_a_fresh_engine_on_the_same_store() {
        let store = MemoryTaskStore::new(vec![task("task-1", "alice", START + Duration::minutes(30))]);

        let mut first = ReminderEngine::new(&store, RecordingNotifier::default(), ReminderPolicy::default());
        let fired = first.poll(START).unwrap();
        assert_eq!(fired.reminders[0].kind, ReminderKind::OneHour);

        let mut restarted =
            ReminderEngine::new(&store, RecordingNotifier::default(), ReminderPolicy::default());
        let result = restarted.poll(START - Duration::hours(20)).unwrap();

        assert!(result.regressed);
        assert_eq!(result.fired_count(), 0);
        assert!(restarted.notifier().sent().is_empty());
        assert_eq!(store.last_polled_at().unwrap(), Some(START));
    }

    #[test]
    fn markers_are_not_written_back_over_a_reschedule() {
        let mut engine = ReminderEngine::new(
            ReschedulingStore {
                inner: MemoryTaskStore::new(vec![task("task-1", "alice", START - Duration::hours(1))]),
                moved_to: "2025-06-30T00:00:00-05:00".to_string(),
            },
            RecordingNotifier::default(),
            ReminderPolicy::default(),
        );

        let result = engine.poll(START).unwrap();
        let stored = engine.store().inner.get("task-1").unwrap().unwrap();

        assert_eq!(result.fired_count(), 1);
        assert!(result.failures.is_empty());
        assert_eq!(stored.due_at.as_deref(), Some("2025-06-30T00:00:00-05:00"));
        assert!(stored.reminders.is_empty());
    }

    #[test]
    fn task_assigned_between_polls_is_picked_up() {
        let mut engine = engine(vec![]);
        assert_eq!(engine.poll(START).unwrap().fired_count(), 0);

        engine
            .store()
            .insert(task("task-1", "alice", START + Duration::minutes(45)))
            .unwrap();
        let result = engine.poll(START + Duration::minutes(1)).unwrap();

        assert_eq!(result.reminders[0].kind, ReminderKind::OneHour);
    }

    #[test]
    fn unresolvable_owner_is_reported_once_under_every_poll() {
        let roster = [("alice".to_string(), "Alice".to_string())]
            .into_iter()
            .collect();
        let mut engine = ReminderEngine::new(
            MemoryTaskStore::new(vec![task("task-1", "ghost", START - Duration::hours(1))]),
            RecipientDirectory::new(roster, RecordingNotifier::default()),
            ReminderPolicy {
                overdue: OverduePolicy::EveryPoll,
                ..ReminderPolicy::default()
            },
        );

        let first = engine.poll(START).unwrap();
        let later: usize = (1..4)
            .map(|hour| engine.poll(START + Duration::hours(hour)).unwrap().failures.len())
            .sum();

        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].error.code(), "unknown_recipient");
        assert_eq!(later, 0);
    }
}
