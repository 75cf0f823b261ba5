use clap::Subcommand;
use focusquest_core::storage::{gamification_db, Database};

use super::DEFAULT_USER_ID;

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List recent reward history entries, newest first
    List {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        HistoryAction::List { limit } => {
            let entries = match gamification_db::get_profile_by_user(db.conn(), DEFAULT_USER_ID)? {
                Some(profile) => gamification_db::list_history(db.conn(), profile.id, limit)?,
                None => Vec::new(),
            };
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }
    Ok(())
}
