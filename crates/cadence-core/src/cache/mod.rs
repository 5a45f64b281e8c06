//! Same-day operational cache.
//!
//! Typed records over a [`CacheStore`]:
//!
//! | Key | Record | Retention |
//! |-----|--------|-----------|
//! | `assignments:<account>` | `Vec<AccountTaskAssignment>` | 24 h per entry |
//! | `completion:<account>` | `AccountCompletionRecord` | 7 days |
//! | `start:<account>` | `AccountStartState` | kept, recomputed when absent |
//! | `ledger:<date>` | `Vec<CompletedDailyTask>` | that date only |
//! | `plan:<date>` | `Vec<GameBatch>` | that date only |
//!
//! Reads never fail: a missing, unreadable or undecodable record reads as
//! absent. Writes propagate store errors.

mod sqlite;
mod store;

pub use sqlite::SqliteStore;
pub use store::{CacheStore, MemoryStore};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;
use crate::model::{
    AccountCompletionRecord, AccountStartState, AccountTaskAssignment, CompletedDailyTask, GameBatch,
};
use crate::readiness::secs;

/// How long cached records stay relevant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRetention {
    pub assignment_hours: i64,
    pub completion_days: i64,
}

impl Default for CacheRetention {
    fn default() -> Self {
        Self {
            assignment_hours: 24,
            completion_days: 7,
        }
    }
}

pub struct OperationalCache {
    store: Box<dyn CacheStore>,
    retention: CacheRetention,
}

impl OperationalCache {
    pub fn new(store: Box<dyn CacheStore>, retention: CacheRetention) -> Self {
        Self { store, retention }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), CacheRetention::default())
    }

    /// Hand the store back, e.g. to reopen it with another cache.
    pub fn into_store(self) -> Box<dyn CacheStore> {
        self.store
    }

    // ── Assignments ──────────────────────────────────────────────────

    /// Assignment history, without entries older than the retention window.
    pub fn assignments(&self, account_id: &str, now: DateTime<Utc>) -> Vec<AccountTaskAssignment> {
        let cutoff = now - Duration::hours(self.retention.assignment_hours);
        self.read::<Vec<AccountTaskAssignment>>(&assignments_key(account_id))
            .unwrap_or_default()
            .into_iter()
            .filter(|a| a.assigned_at >= cutoff)
            .collect()
    }

    /// Adds a planning pass to the history. An earlier entry for the same
    /// pairing (batch, token, time) is replaced, so re-planning the same data
    /// does not grow the history.
    pub fn record_assignments(
        &mut self,
        assignments: &[AccountTaskAssignment],
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut accounts: Vec<&str> = assignments.iter().map(|a| a.account_id.as_str()).collect();
        accounts.sort_unstable();
        accounts.dedup();

        for account_id in accounts {
            let mut history = self.assignments(account_id, now);
            history.retain(|old| {
                !assignments.iter().any(|new| {
                    new.account_id == old.account_id
                        && new.batch_index == old.batch_index
                        && new.event_token == old.event_token
                        && new.time_spent == old.time_spent
                })
            });
            history.extend(
                assignments
                    .iter()
                    .filter(|a| a.account_id == account_id)
                    .cloned(),
            );
            self.write(&assignments_key(account_id), &history)?;
        }
        Ok(())
    }

    pub fn clear_assignments(&mut self, account_id: &str) -> Result<(), CacheError> {
        self.store.remove(&assignments_key(account_id))
    }

    // ── Completion records ───────────────────────────────────────────

    /// Latest completion, unless it is older than the retention window.
    pub fn completion_record(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Option<AccountCompletionRecord> {
        let cutoff = now - Duration::days(self.retention.completion_days);
        self.read::<AccountCompletionRecord>(&completion_key(account_id))
            .filter(|r| r.completed_at >= cutoff)
    }

    /// Cooldown anchor for an account whose next group targets `next_time_spent`.
    ///
    /// Like [`completion_record`](Self::completion_record), but a record past
    /// the retention window is kept while the cooldown it anchors still runs.
    pub fn completion_anchor(
        &self,
        account_id: &str,
        next_time_spent: u64,
        now: DateTime<Utc>,
    ) -> Option<AccountCompletionRecord> {
        let cutoff = now - Duration::days(self.retention.completion_days);
        self.read::<AccountCompletionRecord>(&completion_key(account_id))
            .filter(|r| {
                let wait = next_time_spent.saturating_sub(r.time_spent);
                r.completed_at >= cutoff || r.completed_at + secs(wait) > now
            })
    }

    /// Overwrites any previous record for the account.
    pub fn set_completion_record(&mut self, record: &AccountCompletionRecord) -> Result<(), CacheError> {
        self.write(&completion_key(&record.account_id), record)
    }

    // ── Start states ─────────────────────────────────────────────────

    pub fn start_state(&self, account_id: &str) -> Option<AccountStartState> {
        self.read::<AccountStartState>(&start_key(account_id))
            .filter(|s| s.initialized)
    }

    pub fn set_start_state(&mut self, state: &AccountStartState) -> Result<(), CacheError> {
        self.write(&start_key(&state.account_id), state)
    }

    // ── Ledger ───────────────────────────────────────────────────────

    /// Groups completed on `date`. Entries stamped with another date are ignored.
    pub fn ledger(&self, date: NaiveDate) -> Vec<CompletedDailyTask> {
        self.read::<Vec<CompletedDailyTask>>(&ledger_key(date))
            .unwrap_or_default()
            .into_iter()
            .filter(|e| e.date == date)
            .collect()
    }

    /// Appends `entry` unless the same group is already recorded for its date.
    pub fn append_ledger(&mut self, entry: &CompletedDailyTask) -> Result<(), CacheError> {
        let mut entries = self.ledger(entry.date);
        if entries.iter().any(|e| {
            e.account_id == entry.account_id
                && e.event_token == entry.event_token
                && e.time_spent == entry.time_spent
        }) {
            tracing::debug!(
                "Ledger already holds {} for {}",
                entry.event_token,
                entry.account_id
            );
            return Ok(());
        }
        entries.push(entry.clone());
        self.write(&ledger_key(entry.date), &entries)
    }

    // ── Plan snapshot ────────────────────────────────────────────────

    pub fn plan(&self, date: NaiveDate) -> Option<Vec<GameBatch>> {
        self.read(&plan_key(date))
    }

    pub fn save_plan(&mut self, date: NaiveDate, batches: &[GameBatch]) -> Result<(), CacheError> {
        self.write(&plan_key(date), batches)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.store.load(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry {}: {}", key, e);
                None
            }
        }
    }

    fn write<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Encode {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.save(key, &bytes)
    }
}

fn assignments_key(account_id: &str) -> String {
    format!("assignments:{account_id}")
}

fn completion_key(account_id: &str) -> String {
    format!("completion:{account_id}")
}

fn start_key(account_id: &str) -> String {
    format!("start:{account_id}")
}

fn ledger_key(date: NaiveDate) -> String {
    format!("ledger:{}", date.format("%Y-%m-%d"))
}

fn plan_key(date: NaiveDate) -> String {
    format!("plan:{}", date.format("%Y-%m-%d"))
}
