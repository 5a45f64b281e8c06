use cadence_core::{CompletionOutcome, Config};
use chrono::Utc;

use super::{open_engine, CommandResult};

pub fn run(account: &str, item: usize, batch: usize) -> CommandResult {
    let config = Config::load()?;
    let mut engine = open_engine(&config)?;
    let now = Utc::now();
    if !engine.restore_plan(now) {
        let date = engine.calendar_date(now);
        return Err(format!("no plan for {date}, run `cadence generate` first").into());
    }

    match engine.complete(account, item, batch)? {
        CompletionOutcome::ItemMarked { remaining_in_group } => {
            println!("Marked item {item} of {account}; {remaining_in_group} left in group");
        }
        CompletionOutcome::GroupCompleted { entry } => {
            println!(
                "Completed {} for {} ({}), time_spent {}",
                entry.event_token, entry.account_name, entry.game_name, entry.time_spent
            );
        }
        CompletionOutcome::AlreadyCompleted => {
            println!("Item {item} of {account} was already completed");
        }
    }
    Ok(())
}

pub fn ledger(json: bool) -> CommandResult {
    let config = Config::load()?;
    let engine = open_engine(&config)?;
    let now = Utc::now();
    let entries = engine.ledger(now);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Nothing completed on {}.", engine.calendar_date(now));
    }
    for entry in &entries {
        println!(
            "{}  {} ({})  {}  t={}",
            entry.completed_at.format("%H:%M:%S"),
            entry.account_name,
            entry.game_name,
            entry.event_token,
            entry.time_spent
        );
    }
    Ok(())
}
