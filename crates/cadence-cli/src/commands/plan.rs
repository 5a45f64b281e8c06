use cadence_core::Config;
use chrono::Utc;

use super::{format_status, open_engine, CommandResult};

pub fn generate(json: bool) -> CommandResult {
    let config = Config::load()?;
    let mut engine = open_engine(&config)?;
    let report = engine.generate(Utc::now())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!(
        "Plan for {}: {} batches, {} tasks",
        report.date, report.batches, report.tasks
    );
    for skipped in report.skipped_games.iter().chain(&report.skipped_accounts) {
        println!("  skipped {}: {}", skipped.id, skipped.reason);
    }
    Ok(())
}

pub fn status(json: bool) -> CommandResult {
    let config = Config::load()?;
    let mut engine = open_engine(&config)?;
    let now = Utc::now();
    if !engine.restore_plan(now) {
        println!("No plan for {}. Run `cadence generate` first.", engine.calendar_date(now));
        return Ok(());
    }

    let statuses = engine.evaluate_plan(now);
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("All tasks done for {}.", engine.calendar_date(now));
    }
    for status in &statuses {
        println!("{}", format_status(status));
    }
    Ok(())
}
