//! Batch planning.
//!
//! Interleaves every account's request groups into ordered [`GameBatch`]es.
//! A batch is filled by sweeping the games round-robin; each sweep lets every
//! game contribute the first account (in input order) that still has groups
//! and is not yet in the batch. When a sweep adds nothing the batch closes.
//! Planning stops at the first empty batch.
//!
//! The result: batch N carries the N-th outstanding group of each account,
//! so an account's groups keep their order and never share a batch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AccountTaskAssignment, DailyTask, GameBatch};

/// Planner input for one game: its accounts' full daily tasks, in stable order.
#[derive(Debug, Clone)]
pub struct GameTasks {
    pub game_id: String,
    pub tasks: Vec<DailyTask>,
}

/// Output of a planning pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchPlan {
    pub batches: Vec<GameBatch>,
    /// One audit record per (account, group) pairing.
    pub assignments: Vec<AccountTaskAssignment>,
}

impl BatchPlan {
    pub fn task_count(&self) -> usize {
        self.batches.iter().map(|b| b.tasks.len()).sum()
    }
}

pub fn plan_batches(games: &[GameTasks], now: DateTime<Utc>) -> BatchPlan {
    let mut cursors: Vec<Vec<usize>> = games.iter().map(|g| vec![0; g.tasks.len()]).collect();
    let mut plan = BatchPlan::default();

    loop {
        let index = plan.batches.len();
        let mut tasks: Vec<DailyTask> = Vec::new();
        let mut in_batch: HashSet<String> = HashSet::new();

        loop {
            let mut added = false;
            for (gi, game) in games.iter().enumerate() {
                let next = game.tasks.iter().enumerate().find(|(ai, task)| {
                    cursors[gi][*ai] < task.groups.len() && !in_batch.contains(task.account_id())
                });
                let Some((ai, source)) = next else {
                    continue;
                };

                let group = source.groups[cursors[gi][ai]].clone();
                cursors[gi][ai] += 1;
                in_batch.insert(source.account_id().to_string());

                plan.assignments.push(AccountTaskAssignment {
                    account_id: source.account_id().to_string(),
                    batch_index: index,
                    event_token: group.event_token.clone(),
                    time_spent: group.time_spent,
                    assigned_at: now,
                });
                tasks.push(DailyTask::new(source.account.clone(), source.date, vec![group]));
                added = true;
            }
            if !added {
                break;
            }
        }

        if tasks.is_empty() {
            break;
        }
        plan.batches.push(GameBatch { index, tasks });
    }

    tracing::debug!(
        "Planned {} batches with {} tasks",
        plan.batches.len(),
        plan.task_count()
    );
    plan
}

/// Batch indices holding a task for the account, in plan order.
pub fn account_batch_indices(batches: &[GameBatch], account_id: &str) -> Vec<usize> {
    batches
        .iter()
        .filter(|b| b.contains_account(account_id))
        .map(|b| b.index)
        .collect()
}
