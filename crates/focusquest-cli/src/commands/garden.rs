use clap::Subcommand;
use focusquest_core::storage::{gamification_db, Database};

use super::DEFAULT_USER_ID;

#[derive(Subcommand)]
pub enum GardenAction {
    /// List unlocked plants
    List,
    /// Select the plant that receives growth points
    Select {
        /// Plant ID
        id: i64,
    },
}

pub fn run(action: GardenAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        GardenAction::List => {
            let plants = match gamification_db::get_profile_by_user(db.conn(), DEFAULT_USER_ID)? {
                Some(profile) => gamification_db::list_plants(db.conn(), profile.id)?,
                None => Vec::new(),
            };
            let selected = gamification_db::selected_plant_id(db.conn())?;
            println!("{}", serde_json::to_string_pretty(&plants)?);
            if let Some(id) = selected {
                println!("selected: {id}");
            }
        }
        GardenAction::Select { id } => {
            if gamification_db::get_plant(db.conn(), id)?.is_none() {
                eprintln!("no plant with id {id}");
                std::process::exit(1);
            }
            gamification_db::set_selected_plant(db.conn(), id)?;
            println!("ok");
        }
    }
    Ok(())
}
