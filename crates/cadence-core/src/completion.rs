//! Completion recording.
//!
//! Marks one item of a planned task as done. When that closes the item's
//! group, the completion is pushed to the gateway first; only after the
//! gateway accepts it does anything change in memory or in the cache:
//!
//! 1. the item's bit is set
//! 2. the account's completion record is overwritten (next cooldown anchor)
//! 3. the account's assignment history is cleared
//! 4. a ledger entry is appended for today
//! 5. the finished task leaves its batch, and an emptied batch leaves the plan
//!
//! A partial group only flips the bit.
//!
//! The plan is edited on a copy that replaces it only after every cache
//! write succeeded. A failed write leaves the plan as it was, so the
//! operator can retry; the gateway and ledger writes tolerate repeats.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::OperationalCache;
use crate::error::{CoreError, GatewayError, InvariantError, Result};
use crate::events::Event;
use crate::gateway::AccountGateway;
use crate::model::{AccountCompletionRecord, CompletedDailyTask, GameBatch, Milestone};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The item was marked; its group still has open items.
    ItemMarked { remaining_in_group: usize },
    /// The item closed its group.
    GroupCompleted { entry: CompletedDailyTask },
    /// The item was already marked; nothing changed.
    AlreadyCompleted,
}

/// Result of a completion plus the events it produced.
#[derive(Debug, Clone)]
pub struct Completion {
    pub outcome: CompletionOutcome,
    pub events: Vec<Event>,
}

/// Everything a completion touches, borrowed from the engine.
pub struct CompletionRecorder<'a, G: ?Sized> {
    pub batches: &'a mut Vec<GameBatch>,
    pub cache: &'a mut OperationalCache,
    pub gateway: &'a mut G,
    /// `game_id -> display name`, for ledger entries.
    pub game_names: &'a HashMap<String, String>,
    /// Date the plan snapshot is stored under.
    pub plan_date: NaiveDate,
}

impl<G: AccountGateway + ?Sized> CompletionRecorder<'_, G> {
    pub fn complete(
        &mut self,
        account_id: &str,
        item_index: usize,
        batch_index: usize,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<Completion> {
        let (batch_pos, task_pos) = self
            .locate(account_id, item_index, batch_index)
            .inspect_err(|e| tracing::error!("Rejected completion: {}", e))?;

        let task = &self.batches[batch_pos].tasks[task_pos];
        if task.is_item_completed(item_index) {
            return Ok(Completion {
                outcome: CompletionOutcome::AlreadyCompleted,
                events: Vec::new(),
            });
        }

        let Some((group_index, range)) = task.group_of(item_index) else {
            return Err(InvariantError::ItemOutOfBounds {
                account_id: account_id.to_string(),
                index: item_index,
                len: task.item_count(),
            }
            .into());
        };
        let remaining_in_group = range
            .filter(|idx| *idx != item_index && !task.is_item_completed(*idx))
            .count();

        if remaining_in_group > 0 {
            let mut next = self.batches.clone();
            next[batch_pos].tasks[task_pos].completed.insert(item_index);
            self.cache.save_plan(self.plan_date, &next)?;
            *self.batches = next;
            tracing::debug!(
                "Marked item {} of {} in batch {}, {} left in group",
                item_index,
                account_id,
                batch_index,
                remaining_in_group
            );
            return Ok(Completion {
                outcome: CompletionOutcome::ItemMarked { remaining_in_group },
                events: vec![Event::ItemMarked {
                    account_id: account_id.to_string(),
                    batch_index,
                    item_index,
                    remaining_in_group,
                    at: now,
                }],
            });
        }

        let group = task.groups[group_index].clone();
        let account = task.account.clone();
        self.persist_flag(&account.id, &group.milestone)?;

        // Work on a copy; the plan only changes once every cache write succeeded.
        let mut next = self.batches.clone();
        let mut events = Vec::new();
        let task = &mut next[batch_pos].tasks[task_pos];
        task.completed.insert(item_index);
        let task_finished = (0..task.groups.len()).all(|g| task.is_group_completed(g));

        let record = AccountCompletionRecord {
            account_id: account.id.clone(),
            time_spent: group.time_spent,
            completed_at: now,
            event_token: group.event_token.clone(),
            level_id: group.level_id().map(str::to_string),
        };
        let entry = CompletedDailyTask {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account.id.clone(),
            account_name: account.name.clone(),
            game_id: account.game_id.clone(),
            game_name: self
                .game_names
                .get(&account.game_id)
                .cloned()
                .unwrap_or_else(|| account.game_id.clone()),
            event_token: group.event_token.clone(),
            time_spent: group.time_spent,
            completed_at: now,
            date: today,
            request_type: group.milestone.request_type(),
        };

        if task_finished {
            next[batch_pos].tasks.remove(task_pos);
            if next[batch_pos].tasks.is_empty() {
                next.remove(batch_pos);
                events.push(Event::BatchDrained {
                    batch_index,
                    at: now,
                });
            }
        }

        self.cache.set_completion_record(&record)?;
        self.cache.clear_assignments(&account.id)?;
        self.cache.append_ledger(&entry)?;
        self.cache.save_plan(self.plan_date, &next)?;
        *self.batches = next;

        tracing::info!(
            "Completed {} for {} (time_spent {}) in batch {}",
            entry.event_token,
            entry.account_id,
            entry.time_spent,
            batch_index
        );
        events.insert(0, Event::LedgerEntryAdded { entry: entry.clone() });
        Ok(Completion {
            outcome: CompletionOutcome::GroupCompleted { entry },
            events,
        })
    }

    /// Positions of the batch and the account's task inside it.
    fn locate(
        &self,
        account_id: &str,
        item_index: usize,
        batch_index: usize,
    ) -> Result<(usize, usize), InvariantError> {
        let batch_pos = self
            .batches
            .iter()
            .position(|b| b.index == batch_index)
            .ok_or(InvariantError::UnknownBatch(batch_index))?;
        let task_pos = self.batches[batch_pos]
            .tasks
            .iter()
            .position(|t| t.account.id == account_id)
            .ok_or_else(|| InvariantError::NoTaskForAccount {
                account_id: account_id.to_string(),
                batch_index,
            })?;
        let len = self.batches[batch_pos].tasks[task_pos].item_count();
        if item_index >= len {
            return Err(InvariantError::ItemOutOfBounds {
                account_id: account_id.to_string(),
                index: item_index,
                len,
            });
        }
        Ok((batch_pos, task_pos))
    }

    fn persist_flag(&mut self, account_id: &str, milestone: &Milestone) -> Result<()> {
        match self.gateway.ensure_progress_row(account_id, milestone) {
            Ok(()) | Err(GatewayError::AlreadyExists { .. }) => {}
            Err(e) => {
                tracing::warn!("Could not create progress row for {}: {}", account_id, e);
                return Err(CoreError::Gateway(e));
            }
        }
        self.gateway
            .set_completed(account_id, milestone, true)
            .map_err(|e| {
                tracing::warn!("Could not persist completion for {}: {}", account_id, e);
                CoreError::Gateway(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::model::{Account, DailyTask, RequestGroup, RequestItem, RequestKind, RequestType};
    use crate::cache::{CacheRetention, CacheStore, MemoryStore};
    use crate::error::CacheError;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap()
    }

    fn today() -> NaiveDate {
        now().date_naive()
    }

    fn pair_task(account_id: &str, time_spent: u64) -> DailyTask {
        let account = Account {
            id: account_id.into(),
            game_id: "g1".into(),
            name: format!("Name {account_id}"),
            started_at: now(),
        };
        let group = RequestGroup {
            event_token: "buy".into(),
            time_spent,
            milestone: Milestone::Purchase("p1".into()),
            items: vec![
                RequestItem::new(RequestKind::Session, "buy", time_spent, None),
                RequestItem::new(RequestKind::Event, "buy", time_spent, None),
            ],
        };
        DailyTask::new(account, today(), vec![group])
    }

    /// Memory store whose saves fail for keys under a switchable prefix.
    struct FlakyStore {
        inner: MemoryStore,
        failing: Rc<RefCell<Option<&'static str>>>,
    }

    impl CacheStore for FlakyStore {
        fn load(&self, key: &str) -> std::result::Result<Option<Vec<u8>>, CacheError> {
            self.inner.load(key)
        }

        fn save(&mut self, key: &str, bytes: &[u8]) -> std::result::Result<(), CacheError> {
            if self.failing.borrow().is_some_and(|prefix| key.starts_with(prefix)) {
                return Err(CacheError::Locked);
            }
            self.inner.save(key, bytes)
        }

        fn remove(&mut self, key: &str) -> std::result::Result<(), CacheError> {
            self.inner.remove(key)
        }
    }

    struct Fixture {
        batches: Vec<GameBatch>,
        cache: OperationalCache,
        gateway: InMemoryGateway,
        names: HashMap<String, String>,
    }

    impl Fixture {
        fn new(batches: Vec<GameBatch>) -> Self {
            Self {
                batches,
                cache: OperationalCache::in_memory(),
                gateway: InMemoryGateway::new(),
                names: HashMap::from([("g1".to_string(), "Game One".to_string())]),
            }
        }

        fn flaky(batches: Vec<GameBatch>) -> (Self, Rc<RefCell<Option<&'static str>>>) {
            let failing = Rc::new(RefCell::new(None));
            let store = FlakyStore {
                inner: MemoryStore::new(),
                failing: Rc::clone(&failing),
            };
            let mut fx = Self::new(batches);
            fx.cache = OperationalCache::new(Box::new(store), CacheRetention::default());
            (fx, failing)
        }

        fn complete(&mut self, account: &str, item: usize, batch: usize) -> Result<Completion> {
            CompletionRecorder {
                batches: &mut self.batches,
                cache: &mut self.cache,
                gateway: &mut self.gateway,
                game_names: &self.names,
                plan_date: today(),
            }
            .complete(account, item, batch, now(), today())
        }
    }

    #[test]
    fn half_a_pair_only_marks_the_bit() {
        let mut fx = Fixture::new(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        let done = fx.complete("x", 0, 0).unwrap();

        assert_eq!(done.outcome, CompletionOutcome::ItemMarked { remaining_in_group: 1 });
        assert!(fx.batches[0].tasks[0].is_item_completed(0));
        assert!(fx.cache.completion_record("x", now()).is_none());
        assert!(fx.cache.ledger(today()).is_empty());
        assert!(!fx.gateway.is_completed("x", "p1"));
    }

    #[test]
    fn closing_the_group_records_and_drains() {
        let mut fx = Fixture::new(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        fx.complete("x", 1, 0).unwrap();
        let done = fx.complete("x", 0, 0).unwrap();

        let CompletionOutcome::GroupCompleted { entry } = done.outcome else {
            panic!("expected group completion");
        };
        assert_eq!(entry.request_type, RequestType::Purchase);
        assert_eq!(entry.game_name, "Game One");
        assert_eq!(entry.time_spent, 100);
        assert!(fx.batches.is_empty());
        assert!(matches!(done.events[0], Event::LedgerEntryAdded { .. }));
        assert!(matches!(done.events[1], Event::BatchDrained { batch_index: 0, .. }));

        let record = fx.cache.completion_record("x", now()).unwrap();
        assert_eq!(record.time_spent, 100);
        assert_eq!(record.completed_at, now());
        assert_eq!(record.level_id, None);
        assert_eq!(fx.cache.ledger(today()).len(), 1);
        assert!(fx.gateway.is_completed("x", "p1"));
    }

    #[test]
    fn batch_with_other_tasks_survives() {
        let mut fx = Fixture::new(vec![GameBatch {
            index: 3,
            tasks: vec![pair_task("x", 100), pair_task("y", 100)],
        }]);
        fx.complete("x", 0, 3).unwrap();
        fx.complete("x", 1, 3).unwrap();
        assert_eq!(fx.batches.len(), 1);
        assert_eq!(fx.batches[0].tasks.len(), 1);
        assert_eq!(fx.batches[0].tasks[0].account_id(), "y");
    }

    #[test]
    fn gateway_failure_leaves_state_untouched() {
        let mut fx = Fixture::new(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        fx.complete("x", 0, 0).unwrap();
        fx.gateway.set_fail_writes(true);

        let before = fx.batches.clone();
        let err = fx.complete("x", 1, 0).unwrap_err();
        assert!(matches!(err, CoreError::Gateway(_)));
        assert_eq!(fx.batches, before);
        assert!(fx.cache.ledger(today()).is_empty());

        fx.gateway.set_fail_writes(false);
        let retry = fx.complete("x", 1, 0).unwrap();
        assert!(matches!(retry.outcome, CompletionOutcome::GroupCompleted { .. }));
    }

    #[test]
    fn repeated_mark_is_idempotent() {
        let mut fx = Fixture::new(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        fx.complete("x", 0, 0).unwrap();
        let again = fx.complete("x", 0, 0).unwrap();
        assert_eq!(again.outcome, CompletionOutcome::AlreadyCompleted);
        assert!(again.events.is_empty());
    }

    #[test]
    fn bad_references_are_rejected_without_mutation() {
        let mut fx = Fixture::new(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        let before = fx.batches.clone();

        assert!(matches!(
            fx.complete("x", 5, 0),
            Err(CoreError::Invariant(InvariantError::ItemOutOfBounds { len: 2, .. }))
        ));
        assert!(matches!(
            fx.complete("x", 0, 9),
            Err(CoreError::Invariant(InvariantError::UnknownBatch(9)))
        ));
        assert!(matches!(
            fx.complete("nobody", 0, 0),
            Err(CoreError::Invariant(InvariantError::NoTaskForAccount { .. }))
        ));
        assert_eq!(fx.batches, before);
    }

    #[test]
    fn failed_record_write_keeps_plan_for_retry() {
        let (mut fx, failing) = Fixture::flaky(vec![
            GameBatch { index: 0, tasks: vec![pair_task("x", 100)] },
            GameBatch { index: 1, tasks: vec![pair_task("x", 300)] },
        ]);
        fx.complete("x", 0, 0).unwrap();
        let before = fx.batches.clone();

        *failing.borrow_mut() = Some("completion:");
        let err = fx.complete("x", 1, 0).unwrap_err();
        assert!(matches!(err, CoreError::Cache(CacheError::Locked)));
        assert_eq!(fx.batches, before);
        assert!(fx.cache.completion_record("x", now()).is_none());
        assert!(fx.cache.ledger(today()).is_empty());
        // The gateway already holds the flag.
        assert!(fx.gateway.is_completed("x", "p1"));

        *failing.borrow_mut() = None;
        let retry = fx.complete("x", 1, 0).unwrap();
        assert!(matches!(retry.outcome, CompletionOutcome::GroupCompleted { .. }));
        assert_eq!(fx.batches.len(), 1);
        assert_eq!(fx.batches[0].index, 1);
        assert_eq!(fx.cache.completion_record("x", now()).unwrap().time_spent, 100);

        let next = crate::readiness::evaluate(
            &fx.batches[0].tasks[0],
            1,
            &fx.batches,
            now(),
            &HashMap::from([("x".to_string(), fx.cache.completion_record("x", now()).unwrap())]),
            &HashMap::new(),
        );
        assert_eq!(next.state, crate::readiness::ReadinessState::Cooldown);
        assert_eq!(next.remaining_seconds, 200);
    }

    #[test]
    fn failed_plan_save_retry_records_ledger_once() {
        let (mut fx, failing) =
            Fixture::flaky(vec![GameBatch { index: 0, tasks: vec![pair_task("x", 100)] }]);
        fx.complete("x", 0, 0).unwrap();

        *failing.borrow_mut() = Some("plan:");
        assert!(fx.complete("x", 1, 0).is_err());
        assert_eq!(fx.batches[0].tasks.len(), 1);
        assert_eq!(fx.cache.ledger(today()).len(), 1);

        *failing.borrow_mut() = None;
        fx.complete("x", 1, 0).unwrap();
        assert!(fx.batches.is_empty());
        assert_eq!(fx.cache.ledger(today()).len(), 1);
    }
}
