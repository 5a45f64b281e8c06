use std::collections::HashMap;
use std::time::Duration;

use cadence_core::{Config, ReadinessState};
use chrono::Utc;

use super::{format_status, open_engine, CommandResult};

pub fn run(ticks: Option<u64>) -> CommandResult {
    let config = Config::load()?;
    let mut engine = open_engine(&config)?;
    let now = Utc::now();
    if !engine.restore_plan(now) {
        let report = engine.generate(now)?;
        tracing::info!("No saved plan, generated {} tasks", report.tasks);
    }

    let period = Duration::from_millis(config.engine.tick_interval_ms.max(1));
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let mut interval = tokio::time::interval(period);
        let mut last: HashMap<(usize, String), ReadinessState> = HashMap::new();
        let mut count = 0u64;

        loop {
            interval.tick().await;
            // Other runs of `complete` or `generate` rewrite the saved plan.
            let now = Utc::now();
            engine.restore_plan(now);
            let statuses = engine.evaluate_plan(now);
            last.retain(|(batch, account), _| {
                statuses
                    .iter()
                    .any(|s| s.batch_index == *batch && &s.account_id == account)
            });
            for status in &statuses {
                let key = (status.batch_index, status.account_id.clone());
                if last.get(&key) != Some(&status.readiness.state) {
                    println!("{}", format_status(status));
                    last.insert(key, status.readiness.state);
                }
            }

            count += 1;
            if ticks.is_some_and(|limit| count >= limit) {
                break;
            }
        }
    });
    Ok(())
}
