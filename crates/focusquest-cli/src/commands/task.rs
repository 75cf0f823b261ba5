//! Task management commands for CLI.

use clap::Subcommand;
use focusquest_core::storage::{task_db, Config, Database};
use focusquest_core::{Clock, CompletionOrchestrator, SystemClock};

use super::DEFAULT_USER_ID;

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task title
        title: String,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// List tasks
    List,
    /// Get task details
    Get {
        /// Task ID
        id: i64,
    },
    /// Mark a task done, paying completion rewards
    Complete {
        /// Task ID
        id: i64,
    },
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let clock = SystemClock;

    match action {
        TaskAction::Add { title, tags } => {
            let tags: Vec<String> = tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_default();
            let task_id =
                task_db::insert_task(db.conn(), DEFAULT_USER_ID, &title, &tags, clock.now())?;
            let task = task_db::get_task(db.conn(), task_id)?
                .ok_or("task vanished after insert")?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List => {
            let tasks = task_db::list_tasks(db.conn())?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskAction::Get { id } => match task_db::get_task(db.conn(), id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => {
                eprintln!("no task with id {id}");
                std::process::exit(1);
            }
        },
        TaskAction::Complete { id } => {
            let config = Config::load()?;
            // When a cycle for this task is live, route through the
            // manager so its open phase is reconciled too.
            match super::timer::load_active_manager(&db, id) {
                Some(mut manager) => {
                    let (deltas, events) =
                        manager.force_complete_task(&db, &clock, &config.rewards, id)?;
                    super::timer::discard_manager(&db)?;
                    super::timer::print_events(&events)?;
                    println!("{}", serde_json::to_string_pretty(&deltas)?);
                }
                None => {
                    let orchestrator =
                        CompletionOrchestrator::new(&db, &clock, config.rewards.clone());
                    let deltas = orchestrator.force_complete_task(id, None)?;
                    println!("{}", serde_json::to_string_pretty(&deltas)?);
                }
            }
        }
    }
    Ok(())
}
