//! Readiness evaluation.
//!
//! `evaluate` is a pure function of the plan, the per-account anchors and
//! `now`. It holds no state and assumes no scheduling primitive; the host
//! decides how often to call it (the CLI `watch` command ticks once a second).
//!
//! ## Evaluation order
//!
//! ```text
//! Blocked (earlier batch holds the account)
//!   -> Cooldown (completion record exists)
//!   -> InitialDelay (no record yet)
//!   -> Ready
//! ```
//!
//! Waits compare in milliseconds and display in whole seconds, rounded up,
//! so a task never reports ready before its target instant.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Account, AccountCompletionRecord, AccountStartState, DailyTask, GameBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessState {
    Ready,
    /// Waiting on an earlier batch of the same account.
    Blocked,
    /// Waiting for the gap since the previous completion to elapse.
    Cooldown,
    /// Waiting for the account's first request to become eligible.
    InitialDelay,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReadinessState::Ready => "ready",
            ReadinessState::Blocked => "blocked",
            ReadinessState::Cooldown => "cooldown",
            ReadinessState::InitialDelay => "initial-delay",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub state: ReadinessState,
    pub ready: bool,
    /// Whole seconds left, rounded up. Zero when ready or blocked.
    pub remaining_seconds: u64,
    /// When the wait ends. `None` when ready or blocked.
    pub eta: Option<DateTime<Utc>>,
}

impl Readiness {
    fn ready() -> Self {
        Self {
            state: ReadinessState::Ready,
            ready: true,
            remaining_seconds: 0,
            eta: None,
        }
    }

    fn blocked() -> Self {
        Self {
            state: ReadinessState::Blocked,
            ready: false,
            remaining_seconds: 0,
            eta: None,
        }
    }

    /// Ready once `now` reaches `target`, otherwise waiting in `state`.
    fn waiting_until(state: ReadinessState, target: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let shortfall_ms = (target - now).num_milliseconds();
        if shortfall_ms <= 0 {
            return Self::ready();
        }
        Self {
            state,
            ready: false,
            remaining_seconds: ceil_secs(shortfall_ms),
            eta: Some(target),
        }
    }
}

/// A task's readiness plus what the operator needs to see next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub batch_index: usize,
    pub account_id: String,
    pub account_name: String,
    pub game_id: String,
    pub event_token: String,
    pub time_spent: u64,
    pub item_count: usize,
    pub completed_items: usize,
    pub readiness: Readiness,
}

/// Classify one task of the plan at `now`.
pub fn evaluate(
    task: &DailyTask,
    batch_index: usize,
    batches: &[GameBatch],
    now: DateTime<Utc>,
    records: &HashMap<String, AccountCompletionRecord>,
    start_states: &HashMap<String, AccountStartState>,
) -> Readiness {
    let account_id = task.account_id();

    if batches
        .iter()
        .any(|b| b.index < batch_index && b.contains_account(account_id))
    {
        return Readiness::blocked();
    }

    let Some(group) = task.pending_group() else {
        return Readiness::ready();
    };

    if let Some(record) = records.get(account_id) {
        let required_secs = group.time_spent.saturating_sub(record.time_spent);
        let target = record.completed_at + secs(required_secs);
        return Readiness::waiting_until(ReadinessState::Cooldown, target, now);
    }

    let allowed_at = match start_states.get(account_id).filter(|s| s.initialized) {
        Some(state) => Some(state.first_request_allowed_at),
        None => task
            .first_time_spent()
            .map(|t| first_request_allowed_at(&task.account, t)),
    };
    match allowed_at {
        Some(target) => Readiness::waiting_until(ReadinessState::InitialDelay, target, now),
        None => Readiness::ready(),
    }
}

/// Evaluate every task of every batch, in plan order.
pub fn evaluate_batches(
    batches: &[GameBatch],
    now: DateTime<Utc>,
    records: &HashMap<String, AccountCompletionRecord>,
    start_states: &HashMap<String, AccountStartState>,
) -> Vec<TaskStatus> {
    batches
        .iter()
        .flat_map(|batch| {
            batch.tasks.iter().map(move |task| {
                let group = task.pending_group();
                TaskStatus {
                    batch_index: batch.index,
                    account_id: task.account.id.clone(),
                    account_name: task.account.name.clone(),
                    game_id: task.account.game_id.clone(),
                    event_token: group.map(|g| g.event_token.clone()).unwrap_or_default(),
                    time_spent: group.map(|g| g.time_spent).unwrap_or(0),
                    item_count: task.item_count(),
                    completed_items: task.completed.len(),
                    readiness: evaluate(task, batch.index, batches, now, records, start_states),
                }
            })
        })
        .collect()
}

/// When an account's first group becomes eligible.
pub fn first_request_allowed_at(account: &Account, first_time_spent: u64) -> DateTime<Utc> {
    account.started_at + secs(first_time_spent)
}

/// Cap for second counts fed into chrono arithmetic (about a century).
const MAX_WAIT_SECS: u64 = 100 * 365 * 24 * 3600;

pub(crate) fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WAIT_SECS) as i64)
}

fn ceil_secs(ms: i64) -> u64 {
    ((ms + 999) / 1000) as u64
}
