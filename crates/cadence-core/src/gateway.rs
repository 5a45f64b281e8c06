//! Account data gateway port.
//!
//! The engine never owns catalog data. Everything it knows about games,
//! accounts, levels and outstanding requests arrives through this trait, and
//! completion flags leave through it.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::error::GatewayError;
use crate::model::{Account, Game, Level, Milestone, PurchaseEvent, RequestItem};

/// Request/response access to the external catalog.
pub trait AccountGateway {
    fn list_games(&self) -> Result<Vec<Game>, GatewayError>;

    /// Accounts of a game, in stable display order.
    fn list_accounts(&self, game_id: &str) -> Result<Vec<Account>, GatewayError>;

    fn list_levels(&self, game_id: &str) -> Result<Vec<Level>, GatewayError>;

    fn list_purchase_events(&self, game_id: &str) -> Result<Vec<PurchaseEvent>, GatewayError>;

    /// Outstanding requests for the account on `date`.
    fn list_candidate_requests(
        &self,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<RequestItem>, GatewayError>;

    /// Create the progress row if missing. May fail with `AlreadyExists`.
    fn ensure_progress_row(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
    ) -> Result<(), GatewayError>;

    fn set_completed(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
        completed: bool,
    ) -> Result<(), GatewayError>;
}

/// Levels and purchase events of one game, used for staleness filtering
/// and purchase timing interpolation.
#[derive(Debug, Clone, Default)]
pub struct GameCatalog {
    pub levels: Vec<Level>,
    pub purchase_events: Vec<PurchaseEvent>,
}

impl GameCatalog {
    pub fn fetch<G: AccountGateway + ?Sized>(gateway: &G, game_id: &str) -> Result<Self, GatewayError> {
        Ok(Self {
            levels: gateway.list_levels(game_id)?,
            purchase_events: gateway.list_purchase_events(game_id)?,
        })
    }

    pub fn level_by_token(&self, token: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.event_token == token)
    }

    pub fn purchase_by_token(&self, token: &str) -> Option<&PurchaseEvent> {
        self.purchase_events.iter().find(|p| p.event_token == token)
    }

    pub fn level_by_number(&self, number: u32) -> Option<&Level> {
        self.levels.iter().find(|l| l.number == number)
    }
}

/// Gateway backed by process memory, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryGateway {
    pub games: Vec<Game>,
    pub accounts: Vec<Account>,
    pub levels: Vec<Level>,
    pub purchase_events: Vec<PurchaseEvent>,
    pub requests: HashMap<String, Vec<RequestItem>>,
    /// `(account_id, milestone_id) -> completed`
    pub progress: HashMap<(String, String), bool>,
    failing_accounts: HashSet<String>,
    fail_writes: bool,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_game(mut self, game: Game) -> Self {
        self.games.push(game);
        self
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.levels.push(level);
        self
    }

    pub fn with_purchase_event(mut self, event: PurchaseEvent) -> Self {
        self.purchase_events.push(event);
        self
    }

    pub fn with_requests(mut self, account_id: &str, items: Vec<RequestItem>) -> Self {
        self.requests.entry(account_id.to_string()).or_default().extend(items);
        self
    }

    /// Make candidate fetches for this account fail.
    pub fn fail_account(&mut self, account_id: &str) {
        self.failing_accounts.insert(account_id.to_string());
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn is_completed(&self, account_id: &str, milestone_id: &str) -> bool {
        self.progress
            .get(&(account_id.to_string(), milestone_id.to_string()))
            .copied()
            .unwrap_or(false)
    }
}

impl AccountGateway for InMemoryGateway {
    fn list_games(&self) -> Result<Vec<Game>, GatewayError> {
        Ok(self.games.clone())
    }

    fn list_accounts(&self, game_id: &str) -> Result<Vec<Account>, GatewayError> {
        Ok(self
            .accounts
            .iter()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect())
    }

    fn list_levels(&self, game_id: &str) -> Result<Vec<Level>, GatewayError> {
        Ok(self
            .levels
            .iter()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect())
    }

    fn list_purchase_events(&self, game_id: &str) -> Result<Vec<PurchaseEvent>, GatewayError> {
        Ok(self
            .purchase_events
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    fn list_candidate_requests(
        &self,
        account_id: &str,
        _date: NaiveDate,
    ) -> Result<Vec<RequestItem>, GatewayError> {
        if self.failing_accounts.contains(account_id) {
            return Err(GatewayError::Unavailable(format!(
                "requests for '{account_id}' could not be fetched"
            )));
        }
        Ok(self.requests.get(account_id).cloned().unwrap_or_default())
    }

    fn ensure_progress_row(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
    ) -> Result<(), GatewayError> {
        if self.fail_writes {
            return Err(GatewayError::Unavailable("write refused".into()));
        }
        let key = (account_id.to_string(), milestone.id().to_string());
        if self.progress.contains_key(&key) {
            return Err(GatewayError::AlreadyExists {
                kind: "progress".into(),
                id: milestone.id().to_string(),
            });
        }
        self.progress.insert(key, false);
        Ok(())
    }

    fn set_completed(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
        completed: bool,
    ) -> Result<(), GatewayError> {
        if self.fail_writes {
            return Err(GatewayError::Unavailable("write refused".into()));
        }
        let key = (account_id.to_string(), milestone.id().to_string());
        match self.progress.get_mut(&key) {
            Some(flag) => {
                *flag = completed;
                Ok(())
            }
            None => Err(GatewayError::NotFound {
                kind: "progress".into(),
                id: milestone.id().to_string(),
            }),
        }
    }
}
