use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::CompletedDailyTask;

/// Every plan or ledger change produces an Event.
/// Subscribers registered on the engine receive them synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    PlanGenerated {
        date: NaiveDate,
        batches: usize,
        tasks: usize,
        skipped_accounts: usize,
        at: DateTime<Utc>,
    },
    /// An account was left out of planning because its data could not be fetched.
    AccountSkipped {
        account_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    /// One item was marked; its group still has open items.
    ItemMarked {
        account_id: String,
        batch_index: usize,
        item_index: usize,
        remaining_in_group: usize,
        at: DateTime<Utc>,
    },
    /// A group finished and was appended to today's ledger.
    LedgerEntryAdded { entry: CompletedDailyTask },
    /// The last task of a batch finished; the batch left the plan.
    BatchDrained {
        batch_index: usize,
        at: DateTime<Utc>,
    },
}
