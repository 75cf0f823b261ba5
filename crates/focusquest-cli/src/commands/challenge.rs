use clap::Subcommand;
use focusquest_core::storage::{gamification_db, Database};

#[derive(Subcommand)]
pub enum ChallengeAction {
    /// List challenges with their rules
    List,
    /// Install the built-in challenge and reward set
    Seed,
}

pub fn run(action: ChallengeAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        ChallengeAction::List => {
            let challenges = gamification_db::list_challenges(db.conn())?;
            let mut out = Vec::new();
            for challenge in challenges {
                let rules = gamification_db::rules_for_challenge(db.conn(), challenge.id)?;
                out.push(serde_json::json!({
                    "challenge": challenge,
                    "rules": rules,
                }));
            }
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        ChallengeAction::Seed => {
            let seeded = db.with_transaction(gamification_db::seed_builtin_content)?;
            if seeded {
                println!("built-in challenges installed");
            } else {
                println!("already seeded");
            }
        }
    }
    Ok(())
}
