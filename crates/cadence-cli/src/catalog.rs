//! File-backed account gateway.
//!
//! The catalog is one JSON document holding games, accounts, levels,
//! purchase events, outstanding requests and progress rows. Completion
//! flags are written back to the same file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use cadence_core::{
    Account, AccountGateway, Game, GatewayError, Level, Milestone, PurchaseEvent, RequestItem,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRow {
    pub account_id: String,
    pub milestone_id: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub games: Vec<Game>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub levels: Vec<Level>,
    #[serde(default)]
    pub purchase_events: Vec<PurchaseEvent>,
    /// Outstanding requests keyed by account id.
    #[serde(default)]
    pub requests: HashMap<String, Vec<RequestItem>>,
    #[serde(default)]
    pub progress: Vec<ProgressRow>,
}

pub struct JsonCatalog {
    path: PathBuf,
    data: CatalogData,
}

impl JsonCatalog {
    pub fn open(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Unavailable(format!("cannot read catalog {}: {e}", path.display()))
        })?;
        let data = serde_json::from_str(&content).map_err(|e| {
            GatewayError::Unavailable(format!("cannot parse catalog {}: {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            data,
        })
    }

    fn save(&self) -> Result<(), GatewayError> {
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| {
            GatewayError::Unavailable(format!("cannot write catalog {}: {e}", self.path.display()))
        })
    }

    fn account(&self, account_id: &str) -> Result<&Account, GatewayError> {
        self.data
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| GatewayError::NotFound {
                kind: "account".into(),
                id: account_id.to_string(),
            })
    }

    fn row(&self, account_id: &str, milestone_id: &str) -> Option<&ProgressRow> {
        self.data
            .progress
            .iter()
            .find(|r| r.account_id == account_id && r.milestone_id == milestone_id)
    }

    fn is_done(&self, account_id: &str, milestone_id: &str) -> bool {
        self.row(account_id, milestone_id).is_some_and(|r| r.completed)
    }

    /// Milestone an item completes, if the catalog knows it.
    fn milestone_of(&self, game_id: &str, item: &RequestItem) -> Option<String> {
        match &item.level_id {
            Some(level_id) => Some(level_id.clone()),
            None => self
                .data
                .purchase_events
                .iter()
                .find(|p| p.game_id == game_id && p.event_token == item.event_token)
                .map(|p| p.id.clone()),
        }
    }
}

impl AccountGateway for JsonCatalog {
    fn list_games(&self) -> Result<Vec<Game>, GatewayError> {
        Ok(self.data.games.clone())
    }

    fn list_accounts(&self, game_id: &str) -> Result<Vec<Account>, GatewayError> {
        Ok(self
            .data
            .accounts
            .iter()
            .filter(|a| a.game_id == game_id)
            .cloned()
            .collect())
    }

    fn list_levels(&self, game_id: &str) -> Result<Vec<Level>, GatewayError> {
        Ok(self
            .data
            .levels
            .iter()
            .filter(|l| l.game_id == game_id)
            .cloned()
            .collect())
    }

    fn list_purchase_events(&self, game_id: &str) -> Result<Vec<PurchaseEvent>, GatewayError> {
        Ok(self
            .data
            .purchase_events
            .iter()
            .filter(|p| p.game_id == game_id)
            .cloned()
            .collect())
    }

    /// Requests whose milestone is not yet flagged complete.
    fn list_candidate_requests(
        &self,
        account_id: &str,
        _date: NaiveDate,
    ) -> Result<Vec<RequestItem>, GatewayError> {
        let game_id = self.account(account_id)?.game_id.clone();
        Ok(self
            .data
            .requests
            .get(account_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| {
                        self.milestone_of(&game_id, item)
                            .map_or(true, |m| !self.is_done(account_id, &m))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn ensure_progress_row(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
    ) -> Result<(), GatewayError> {
        self.account(account_id)?;
        if self.row(account_id, milestone.id()).is_some() {
            return Err(GatewayError::AlreadyExists {
                kind: "progress".into(),
                id: milestone.id().to_string(),
            });
        }
        self.data.progress.push(ProgressRow {
            account_id: account_id.to_string(),
            milestone_id: milestone.id().to_string(),
            completed: false,
        });
        self.save()
    }

    fn set_completed(
        &mut self,
        account_id: &str,
        milestone: &Milestone,
        completed: bool,
    ) -> Result<(), GatewayError> {
        let row = self
            .data
            .progress
            .iter_mut()
            .find(|r| r.account_id == account_id && r.milestone_id == milestone.id())
            .ok_or_else(|| GatewayError::NotFound {
                kind: "progress".into(),
                id: milestone.id().to_string(),
            })?;
        row.completed = completed;
        self.save()
    }
}
