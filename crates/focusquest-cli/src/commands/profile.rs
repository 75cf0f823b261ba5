use clap::Subcommand;
use focusquest_core::storage::{gamification_db, Database};
use focusquest_core::{Clock, SystemClock};

use super::DEFAULT_USER_ID;

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Show the gamification profile (level, XP, coins)
    Show,
}

pub fn run(action: ProfileAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        ProfileAction::Show => {
            gamification_db::ensure_profile(db.conn(), DEFAULT_USER_ID, SystemClock.now())?;
            let profile = gamification_db::get_profile_by_user(db.conn(), DEFAULT_USER_ID)?
                .ok_or("profile missing after ensure")?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }
    Ok(())
}
