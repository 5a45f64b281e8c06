//! Catalog and plan data types.
//!
//! Catalog rows (`Game`, `Account`, `Level`, `PurchaseEvent`) are owned by the
//! external data service and are read-only here. Plan types (`RequestGroup`,
//! `DailyTask`, `GameBatch`) are rebuilt on every `generate`.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
}

/// A tracked game profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub game_id: String,
    pub name: String,
    /// When the account's in-game clock began.
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub id: String,
    pub game_id: String,
    pub number: u32,
    pub event_token: String,
    /// Account age (seconds) at which this level is reached.
    pub time_spent: u64,
}

/// A purchase milestone, placed between level `after_level` and the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub id: String,
    pub game_id: String,
    pub event_token: String,
    pub after_level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Session,
    Event,
}

/// One candidate action for an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    pub kind: RequestKind,
    pub event_token: String,
    /// Target account age in seconds.
    pub time_spent: u64,
    /// `None` marks a purchase-type milestone.
    #[serde(default)]
    pub level_id: Option<String>,
}

impl RequestItem {
    pub fn new(kind: RequestKind, event_token: &str, time_spent: u64, level_id: Option<&str>) -> Self {
        Self {
            kind,
            event_token: event_token.to_string(),
            time_spent,
            level_id: level_id.map(str::to_string),
        }
    }

    pub fn is_purchase(&self) -> bool {
        self.level_id.is_none()
    }
}

/// The catalog row a group completes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Milestone {
    Level(String),
    Purchase(String),
}

impl Milestone {
    pub fn id(&self) -> &str {
        match self {
            Milestone::Level(id) | Milestone::Purchase(id) => id,
        }
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Milestone::Level(_) => RequestType::Level,
            Milestone::Purchase(_) => RequestType::Purchase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Level,
    Purchase,
}

/// Requests sharing an event token and a timing target; completed as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGroup {
    pub event_token: String,
    pub time_spent: u64,
    pub milestone: Milestone,
    pub items: Vec<RequestItem>,
}

impl RequestGroup {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Level id recorded with completions; `None` for purchases.
    pub fn level_id(&self) -> Option<&str> {
        match &self.milestone {
            Milestone::Level(id) => Some(id),
            Milestone::Purchase(_) => None,
        }
    }
}

/// One account's groups for a date, plus the items completed today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTask {
    pub account: Account,
    pub date: NaiveDate,
    pub groups: Vec<RequestGroup>,
    /// Completed item indices, over the flattened item list.
    #[serde(default)]
    pub completed: BTreeSet<usize>,
}

impl DailyTask {
    pub fn new(account: Account, date: NaiveDate, groups: Vec<RequestGroup>) -> Self {
        Self {
            account,
            date,
            groups,
            completed: BTreeSet::new(),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(RequestGroup::len).sum()
    }

    pub fn items(&self) -> impl Iterator<Item = &RequestItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }

    /// Group index and the flattened index range of its items.
    pub fn group_of(&self, item_index: usize) -> Option<(usize, std::ops::Range<usize>)> {
        let mut start = 0;
        for (i, group) in self.groups.iter().enumerate() {
            let end = start + group.len();
            if item_index < end {
                return Some((i, start..end));
            }
            start = end;
        }
        None
    }

    pub fn is_item_completed(&self, item_index: usize) -> bool {
        self.completed.contains(&item_index)
    }

    pub fn is_group_completed(&self, group_index: usize) -> bool {
        let mut start = 0;
        for (i, group) in self.groups.iter().enumerate() {
            let end = start + group.len();
            if i == group_index {
                return (start..end).all(|idx| self.completed.contains(&idx));
            }
            start = end;
        }
        false
    }

    /// First group with an incomplete item.
    pub fn pending_group(&self) -> Option<&RequestGroup> {
        self.groups
            .iter()
            .enumerate()
            .find(|(i, _)| !self.is_group_completed(*i))
            .map(|(_, g)| g)
    }

    /// Earliest target among the task's groups.
    pub fn first_time_spent(&self) -> Option<u64> {
        self.items().map(|item| item.time_spent).min()
    }
}

/// One position in the plan. Holds at most one task per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBatch {
    pub index: usize,
    pub tasks: Vec<DailyTask>,
}

impl GameBatch {
    pub fn task_for(&self, account_id: &str) -> Option<&DailyTask> {
        self.tasks.iter().find(|t| t.account.id == account_id)
    }

    pub fn contains_account(&self, account_id: &str) -> bool {
        self.task_for(account_id).is_some()
    }
}

/// Anchor for the next group's cooldown. Overwritten on every completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCompletionRecord {
    pub account_id: String,
    pub time_spent: u64,
    pub completed_at: DateTime<Utc>,
    pub event_token: String,
    pub level_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStartState {
    pub account_id: String,
    pub first_request_allowed_at: DateTime<Utc>,
    pub initialized: bool,
}

/// Audit record of a group being put in front of the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTaskAssignment {
    pub account_id: String,
    pub batch_index: usize,
    pub event_token: String,
    pub time_spent: u64,
    pub assigned_at: DateTime<Utc>,
}

/// Ledger entry written when a group finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedDailyTask {
    pub id: String,
    pub account_id: String,
    pub account_name: String,
    pub game_id: String,
    pub game_name: String,
    pub event_token: String,
    pub time_spent: u64,
    pub completed_at: DateTime<Utc>,
    pub date: NaiveDate,
    pub request_type: RequestType,
}
