use clap::Subcommand;
use focusquest_core::storage::{stats_db, Database};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Per-task statistics
    Task {
        /// Task ID
        id: i64,
    },
    /// All-time global statistics
    Global,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        StatsAction::Task { id } => match stats_db::get_task_stats(db.conn(), id)? {
            Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
            None => {
                eprintln!("no statistics for task {id}");
                std::process::exit(1);
            }
        },
        StatsAction::Global => {
            let stats = stats_db::get_global_stats(db.conn())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
