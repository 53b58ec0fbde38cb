//! Long-running poll loop behind `duebot run`.
//!
//! This is the only place the reminder job is scheduled. Each tick runs a
//! full poll, persistence included, before the next tick is awaited, and
//! ticks missed while a poll was running are skipped rather than queued.

use duebot_core::clock::{Clock, SystemClock};
use duebot_core::config::Config;
use duebot_core::error::AppError;
use duebot_core::notify::{Notifier, notifier_from_env};
use duebot_core::reminder::ReminderEngine;
use duebot_core::storage::JsonTaskStore;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

pub type StoreEngine = ReminderEngine<JsonTaskStore, Box<dyn Notifier + Send>>;

pub fn build_engine(config: &Config) -> Result<StoreEngine, AppError> {
    let store = JsonTaskStore::from_env()?;
    let notifier = notifier_from_env(&config.recipients)?;
    Ok(ReminderEngine::new(store, notifier, config.reminder_policy()))
}

pub fn run(config: &Config) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(poll_loop(config))
}

async fn poll_loop(config: &Config) -> Result<(), AppError> {
    let clock = SystemClock::new(config.offset()?);
    let mut engine = build_engine(config)?;
    let mut interval = tokio::time::interval(config.poll_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        store = %engine.store().path().display(),
        interval_minutes = config.poll_interval_minutes,
        "reminder loop started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => poll_once(&mut engine, &clock),
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "cannot listen for ctrl-c");
                }
                info!("reminder loop stopped");
                return Ok(());
            }
        }
    }
}

fn poll_once(engine: &mut StoreEngine, clock: &impl Clock) {
    if let Err(err) = engine.poll(clock.now()) {
        error!(error = %err, "poll failed, retrying next tick");
    }
}
