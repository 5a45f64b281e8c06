pub mod complete;
pub mod config;
pub mod plan;
pub mod watch;

use cadence_core::{Config, Engine, OperationalCache, SqliteStore, TaskStatus};

use crate::catalog::JsonCatalog;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Build an engine over the configured catalog and cache database.
pub fn open_engine(config: &Config) -> Result<Engine<JsonCatalog>, Box<dyn std::error::Error>> {
    let catalog = JsonCatalog::open(&config.catalog_path()?)?;
    let store = SqliteStore::open_default(&config.storage.database_file)?;
    let cache = OperationalCache::new(Box::new(store), config.engine.retention());
    Ok(Engine::new(catalog, cache, config.engine.clone()))
}

/// One human-readable line per task.
pub fn format_status(status: &TaskStatus) -> String {
    let readiness = &status.readiness;
    let state = if readiness.ready {
        "ready".to_string()
    } else if readiness.remaining_seconds > 0 {
        let eta = readiness
            .eta
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_default();
        format!("{} {}s (at {})", readiness.state, readiness.remaining_seconds, eta)
    } else {
        readiness.state.to_string()
    };
    format!(
        "[batch {}] {} ({}) {} t={} items {}/{}  {}",
        status.batch_index,
        status.account_name,
        status.game_id,
        status.event_token,
        status.time_spent,
        status.completed_items,
        status.item_count,
        state
    )
}
