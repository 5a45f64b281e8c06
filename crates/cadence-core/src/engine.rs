//! Scheduling engine.
//!
//! Owns the gateway, the operational cache, the current plan and the event
//! subscribers. There are no globals: hosts create one engine and drive it.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = Engine::new(gateway, OperationalCache::in_memory(), EngineConfig::default());
//! engine.generate(Utc::now())?;
//! // In the host's loop, once a second or on demand:
//! let statuses = engine.evaluate_plan(Utc::now());
//! // On operator action:
//! engine.complete("account", 0, 0)?;
//! ```
//!
//! `generate` and `complete` take `&mut self`, so one of them runs at a time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::OperationalCache;
use crate::completion::{CompletionOutcome, CompletionRecorder};
use crate::error::Result;
use crate::events::Event;
use crate::gateway::{AccountGateway, GameCatalog};
use crate::grouper::{group_requests, JitterSource};
use crate::model::{
    AccountCompletionRecord, AccountStartState, CompletedDailyTask, DailyTask, GameBatch,
};
use crate::planner::{plan_batches, GameTasks};
use crate::readiness::{evaluate, evaluate_batches, first_request_allowed_at, Readiness, TaskStatus};
use crate::storage::EngineConfig;

/// Something left out of a planning pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    pub id: String,
    pub reason: String,
}

/// Summary of a `generate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateReport {
    pub date: NaiveDate,
    pub batches: usize,
    pub tasks: usize,
    pub skipped_games: Vec<Skipped>,
    pub skipped_accounts: Vec<Skipped>,
}

type Subscriber = Box<dyn FnMut(&Event)>;

pub struct Engine<G: AccountGateway> {
    gateway: G,
    cache: OperationalCache,
    config: EngineConfig,
    batches: Vec<GameBatch>,
    plan_date: Option<NaiveDate>,
    game_names: HashMap<String, String>,
    subscribers: Vec<Subscriber>,
}

impl<G: AccountGateway> Engine<G> {
    pub fn new(gateway: G, cache: OperationalCache, config: EngineConfig) -> Self {
        Self {
            gateway,
            cache,
            config,
            batches: Vec::new(),
            plan_date: None,
            game_names: HashMap::new(),
            subscribers: Vec::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn batches(&self) -> &[GameBatch] {
        &self.batches
    }

    pub fn plan_date(&self) -> Option<NaiveDate> {
        self.plan_date
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn cache(&self) -> &OperationalCache {
        &self.cache
    }

    pub fn into_cache(self) -> OperationalCache {
        self.cache
    }

    /// Calendar date of `now`, honouring the configured day boundary.
    pub fn calendar_date(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + Duration::hours(i64::from(self.config.utc_offset_hours))).date_naive()
    }

    /// Groups completed today.
    pub fn ledger(&self, now: DateTime<Utc>) -> Vec<CompletedDailyTask> {
        self.cache.ledger(self.calendar_date(now))
    }

    /// Readiness of every planned task at `now`.
    pub fn evaluate_plan(&self, now: DateTime<Utc>) -> Vec<TaskStatus> {
        let (records, starts) = self.anchors(now);
        evaluate_batches(&self.batches, now, &records, &starts)
    }

    /// Readiness of one account's task in one batch, if it is planned.
    pub fn evaluate(&self, account_id: &str, batch_index: usize, now: DateTime<Utc>) -> Option<Readiness> {
        let batch = self.batches.iter().find(|b| b.index == batch_index)?;
        let task = batch.task_for(account_id)?;
        let (records, starts) = self.anchors(now);
        Some(evaluate(task, batch_index, &self.batches, now, &records, &starts))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Register a callback for every event the engine emits.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&Event) + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    /// Rebuild today's plan from gateway data, replacing the current one.
    ///
    /// # Errors
    /// Fails only when the game list itself cannot be fetched or the cache
    /// cannot be written. Per-game and per-account fetch failures are
    /// reported in the returned summary and skipped.
    pub fn generate(&mut self, now: DateTime<Utc>) -> Result<GenerateReport> {
        let date = self.calendar_date(now);
        let games = self.gateway.list_games()?;

        let done_today: HashSet<(String, String, u64)> = self
            .cache
            .ledger(date)
            .into_iter()
            .map(|e| (e.account_id, e.event_token, e.time_spent))
            .collect();

        let mut skipped_games = Vec::new();
        let mut skipped_accounts = Vec::new();
        let mut inputs = Vec::with_capacity(games.len());
        self.game_names = games.iter().map(|g| (g.id.clone(), g.name.clone())).collect();

        for game in &games {
            let fetched = self
                .gateway
                .list_accounts(&game.id)
                .and_then(|accounts| Ok((accounts, GameCatalog::fetch(&self.gateway, &game.id)?)));
            let (accounts, catalog) = match fetched {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!("Skipping game {} during planning: {}", game.id, e);
                    skipped_games.push(Skipped {
                        id: game.id.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut tasks = Vec::with_capacity(accounts.len());
            for account in accounts {
                let items = match self.gateway.list_candidate_requests(&account.id, date) {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!("Skipping account {} during planning: {}", account.id, e);
                        skipped_accounts.push(Skipped {
                            id: account.id.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                let mut jitter = JitterSource::seeded(
                    &account.id,
                    date,
                    &self.config.jitter_salt,
                    self.config.purchase_jitter_secs,
                );
                let mut groups = group_requests(&account, &items, &catalog, &mut jitter);
                groups.retain(|g| {
                    !done_today.contains(&(account.id.clone(), g.event_token.clone(), g.time_spent))
                });

                if let Some(first) = groups.first() {
                    if self.cache.start_state(&account.id).is_none() {
                        self.cache.set_start_state(&AccountStartState {
                            account_id: account.id.clone(),
                            first_request_allowed_at: first_request_allowed_at(&account, first.time_spent),
                            initialized: true,
                        })?;
                    }
                }
                tasks.push(DailyTask::new(account, date, groups));
            }
            inputs.push(GameTasks {
                game_id: game.id.clone(),
                tasks,
            });
        }

        let plan = plan_batches(&inputs, now);
        self.cache.record_assignments(&plan.assignments, now)?;
        self.cache.save_plan(date, &plan.batches)?;
        self.batches = plan.batches;
        self.plan_date = Some(date);

        let report = GenerateReport {
            date,
            batches: self.batches.len(),
            tasks: plan.assignments.len(),
            skipped_games,
            skipped_accounts,
        };
        tracing::info!(
            "Generated plan for {}: {} batches, {} tasks, {} accounts skipped",
            date,
            report.batches,
            report.tasks,
            report.skipped_accounts.len()
        );

        for skipped in report.skipped_accounts.clone() {
            self.emit(&Event::AccountSkipped {
                account_id: skipped.id,
                reason: skipped.reason,
                at: now,
            });
        }
        self.emit(&Event::PlanGenerated {
            date,
            batches: report.batches,
            tasks: report.tasks,
            skipped_accounts: report.skipped_accounts.len(),
            at: now,
        });
        Ok(report)
    }

    /// Load today's saved plan, if any. Returns whether one was found.
    pub fn restore_plan(&mut self, now: DateTime<Utc>) -> bool {
        let date = self.calendar_date(now);
        let Some(batches) = self.cache.plan(date) else {
            return false;
        };
        self.batches = batches;
        self.plan_date = Some(date);
        match self.gateway.list_games() {
            Ok(games) => {
                self.game_names = games.into_iter().map(|g| (g.id, g.name)).collect();
            }
            Err(e) => tracing::warn!("Game names unavailable, ledger will show ids: {}", e),
        }
        true
    }

    /// Mark one item done at the current time.
    pub fn complete(
        &mut self,
        account_id: &str,
        item_index: usize,
        batch_index: usize,
    ) -> Result<CompletionOutcome> {
        self.complete_at(account_id, item_index, batch_index, Utc::now())
    }

    /// Mark one item done as of `now`.
    ///
    /// # Errors
    /// Gateway write failures and unknown references leave the plan unchanged.
    pub fn complete_at(
        &mut self,
        account_id: &str,
        item_index: usize,
        batch_index: usize,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome> {
        let today = self.calendar_date(now);
        let completion = CompletionRecorder {
            batches: &mut self.batches,
            cache: &mut self.cache,
            gateway: &mut self.gateway,
            game_names: &self.game_names,
            plan_date: self.plan_date.unwrap_or(today),
        }
        .complete(account_id, item_index, batch_index, now, today)?;

        for event in &completion.events {
            self.emit(event);
        }
        Ok(completion.outcome)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn emit(&mut self, event: &Event) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }

    /// Completion records and start states of every planned account.
    fn anchors(
        &self,
        now: DateTime<Utc>,
    ) -> (
        HashMap<String, AccountCompletionRecord>,
        HashMap<String, AccountStartState>,
    ) {
        let mut seen = HashSet::new();
        let mut records = HashMap::new();
        let mut starts = HashMap::new();
        for task in self.batches.iter().flat_map(|b| b.tasks.iter()) {
            let id = task.account_id();
            if !seen.insert(id) {
                continue;
            }
            // The account's earliest task carries the group its cooldown gates.
            let next = task.pending_group().map_or(0, |g| g.time_spent);
            if let Some(record) = self.cache.completion_anchor(id, next, now) {
                records.insert(id.to_string(), record);
            }
            if let Some(state) = self.cache.start_state(id) {
                starts.insert(id.to_string(), state);
            }
        }
        (records, starts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::model::{Account, Game, Level, RequestItem, RequestKind};
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap()
    }

    fn gateway() -> InMemoryGateway {
        let started = now() - Duration::days(1);
        InMemoryGateway::new()
            .with_game(Game { id: "g1".into(), name: "Game One".into() })
            .with_account(Account {
                id: "x".into(),
                game_id: "g1".into(),
                name: "X".into(),
                started_at: started,
            })
            .with_level(Level {
                id: "l1".into(),
                game_id: "g1".into(),
                number: 1,
                event_token: "lv1".into(),
                time_spent: 60,
            })
            .with_requests("x", vec![RequestItem::new(RequestKind::Session, "lv1", 60, Some("l1"))])
    }

    #[test]
    fn calendar_date_respects_offset() {
        let mut config = EngineConfig::default();
        config.utc_offset_hours = 16;
        let engine = Engine::new(gateway(), OperationalCache::in_memory(), config);
        assert_eq!(engine.calendar_date(now()), NaiveDate::from_ymd_opt(2026, 8, 4).unwrap());
    }

    #[test]
    fn subscribers_see_plan_and_ledger_events() {
        let mut engine = Engine::new(gateway(), OperationalCache::in_memory(), EngineConfig::default());
        let seen: Rc<RefCell<Vec<Event>>> = Rc::default();
        let sink = Rc::clone(&seen);
        engine.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        engine.generate(now()).unwrap();
        engine.complete_at("x", 0, 0, now()).unwrap();

        let seen = seen.borrow();
        assert!(matches!(seen[0], Event::PlanGenerated { batches: 1, tasks: 1, .. }));
        assert!(seen.iter().any(|e| matches!(e, Event::LedgerEntryAdded { entry } if entry.game_name == "Game One")));
    }

    #[test]
    fn generate_initializes_start_state_once() {
        let mut engine = Engine::new(gateway(), OperationalCache::in_memory(), EngineConfig::default());
        engine.generate(now()).unwrap();
        let first = engine.cache().start_state("x").unwrap();
        assert_eq!(first.first_request_allowed_at, now() - Duration::days(1) + Duration::seconds(60));

        engine.generate(now() + Duration::hours(1)).unwrap();
        assert_eq!(engine.cache().start_state("x").unwrap(), first);
    }

    #[test]
    fn evaluate_single_task() {
        let mut engine = Engine::new(gateway(), OperationalCache::in_memory(), EngineConfig::default());
        engine.generate(now()).unwrap();
        assert!(engine.evaluate("x", 0, now()).unwrap().ready);
        assert!(engine.evaluate("x", 1, now()).is_none());
        assert!(engine.evaluate("y", 0, now()).is_none());
    }
}
