use clap::Subcommand;
use focusquest_core::storage::{gamification_db, Config, Database};
use focusquest_core::timer::generate;
use focusquest_core::{Clock, Event, ManagerState, PomodoroManager, SystemClock};

use super::DEFAULT_USER_ID;

const MANAGER_KEY: &str = "pomodoro_manager";

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a cycle for a task
    Start {
        /// Task ID to work on
        #[arg(long)]
        task: i64,
        /// Estimated focus minutes for the cycle
        #[arg(long, default_value = "25")]
        estimate: i64,
    },
    /// Pause the running phase (counts one interruption)
    Pause,
    /// Resume a paused phase
    Resume,
    /// Confirm an expired phase and advance
    Confirm,
    /// Skip a break that just expired
    SkipBreak,
    /// Abandon the cycle, recording elapsed time
    Stop,
    /// Print current timer state as JSON
    Status,
}

fn load_manager(db: &Database) -> Option<PomodoroManager> {
    let json = db.kv_get(MANAGER_KEY).ok()??;
    let state: ManagerState = serde_json::from_str(&json).ok()?;
    Some(PomodoroManager::from_state(state))
}

/// The persisted manager, if it exists, is live, and belongs to `task_id`.
pub(crate) fn load_active_manager(db: &Database, task_id: i64) -> Option<PomodoroManager> {
    load_manager(db).filter(|m| m.task_id() == task_id && !m.state().is_idle())
}

pub(crate) fn discard_manager(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    db.kv_delete(MANAGER_KEY)?;
    Ok(())
}

fn save_manager(db: &Database, manager: &PomodoroManager) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(&manager.to_state())?;
    db.kv_set(MANAGER_KEY, &json)?;
    Ok(())
}

/// Persist or discard the manager depending on whether the cycle is
/// still alive.
fn store_or_clear(db: &Database, manager: &PomodoroManager) -> Result<(), Box<dyn std::error::Error>> {
    if manager.state().is_idle() {
        db.kv_delete(MANAGER_KEY)?;
    } else {
        save_manager(db, manager)?;
    }
    Ok(())
}

pub(crate) fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let clock = SystemClock;

    match action {
        TimerAction::Start { task, estimate } => {
            if load_manager(&db).is_some_and(|m| !m.state().is_idle()) {
                eprintln!("a cycle is already running; stop it first");
                std::process::exit(1);
            }
            // First run: the profile must exist before any focus pays out.
            gamification_db::ensure_profile(db.conn(), DEFAULT_USER_ID, clock.now())?;
            let config = Config::load()?;
            let schedule = generate(estimate, &config.schedule_params());
            let (manager, events) =
                PomodoroManager::start(&db, &clock, DEFAULT_USER_ID, task, schedule)?;
            save_manager(&db, &manager)?;
            print_events(&events)?;
        }
        TimerAction::Pause => {
            let mut manager = require_manager(&db)?;
            match manager.pause(&clock) {
                Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
                None => println!("{}", serde_json::to_string_pretty(&manager.snapshot())?),
            }
            save_manager(&db, &manager)?;
        }
        TimerAction::Resume => {
            let mut manager = require_manager(&db)?;
            match manager.resume(&clock) {
                Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
                None => println!("{}", serde_json::to_string_pretty(&manager.snapshot())?),
            }
            save_manager(&db, &manager)?;
        }
        TimerAction::Confirm => {
            let mut manager = require_manager(&db)?;
            let config = Config::load()?;
            let mut events = Vec::new();
            // Catch up with the wall clock so an expiry that happened
            // while no process was running is observed first.
            if let Some(event) = manager.tick(&clock) {
                events.push(event);
            }
            events.extend(manager.confirm(&db, &clock, &config.rewards)?);
            store_or_clear(&db, &manager)?;
            if events.is_empty() {
                println!("nothing to confirm");
            } else {
                print_events(&events)?;
            }
        }
        TimerAction::SkipBreak => {
            let mut manager = require_manager(&db)?;
            let config = Config::load()?;
            let mut events = Vec::new();
            if let Some(event) = manager.tick(&clock) {
                events.push(event);
            }
            events.extend(manager.skip_break(&db, &clock, &config.rewards)?);
            store_or_clear(&db, &manager)?;
            if events.is_empty() {
                println!("no break to skip");
            } else {
                print_events(&events)?;
            }
        }
        TimerAction::Stop => {
            let mut manager = require_manager(&db)?;
            let config = Config::load()?;
            let events = manager.stop(&db, &clock, &config.rewards)?;
            db.kv_delete(MANAGER_KEY)?;
            print_events(&events)?;
        }
        TimerAction::Status => match load_manager(&db) {
            Some(mut manager) => {
                let mut events = Vec::new();
                if let Some(event) = manager.tick(&clock) {
                    events.push(event);
                }
                events.push(manager.snapshot());
                save_manager(&db, &manager)?;
                print_events(&events)?;
            }
            None => {
                println!("{{\"type\": \"NoCycle\"}}");
            }
        },
    }

    Ok(())
}

fn require_manager(db: &Database) -> Result<PomodoroManager, Box<dyn std::error::Error>> {
    load_manager(db).ok_or_else(|| "no active cycle; run `timer start` first".into())
}
