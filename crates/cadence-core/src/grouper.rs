//! Request grouping.
//!
//! Turns one account's raw candidate requests into ordered [`RequestGroup`]s:
//! - malformed items are skipped with a warning
//! - items whose token no longer matches the game's catalog are dropped silently
//! - duplicates by `(kind, token, time_spent)` collapse into one
//! - level items sharing `(token, time_spent)` form one group
//! - purchase milestones become a synthesized `session` + `event` pair sharing
//!   one interpolated, jittered `time_spent`
//!
//! Groups come out sorted ascending by `time_spent`.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_pcg::Mcg128Xsl64;
use sha2::{Digest, Sha256};

use crate::gateway::GameCatalog;
use crate::model::{Account, Milestone, PurchaseEvent, RequestGroup, RequestItem, RequestKind};

/// Bounded random offset applied to synthesized purchase timings.
///
/// Seeded from the account and date so that planning the same day twice
/// yields the same timings.
#[derive(Debug, Clone)]
pub struct JitterSource {
    rng: Mcg128Xsl64,
    bound_secs: u64,
}

impl JitterSource {
    pub fn seeded(account_id: &str, date: NaiveDate, salt: &str, bound_secs: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(account_id.as_bytes());
        hasher.update(b"|");
        hasher.update(date.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(salt.as_bytes());
        let digest = hasher.finalize();

        let mut seed = [0u8; 16];
        seed.copy_from_slice(&digest[..16]);
        Self {
            rng: Mcg128Xsl64::from_seed(seed),
            bound_secs,
        }
    }

    /// No jitter at all.
    pub fn disabled() -> Self {
        Self {
            rng: Mcg128Xsl64::from_seed([0u8; 16]),
            bound_secs: 0,
        }
    }

    pub fn bound_secs(&self) -> u64 {
        self.bound_secs
    }

    /// Signed offset in `[-bound, +bound]` seconds.
    pub fn sample(&mut self) -> i64 {
        if self.bound_secs == 0 {
            return 0;
        }
        let bound = self.bound_secs as i64;
        self.rng.gen_range(-bound..=bound)
    }
}

/// Build the ordered request groups for one account.
pub fn group_requests(
    account: &Account,
    items: &[RequestItem],
    catalog: &GameCatalog,
    jitter: &mut JitterSource,
) -> Vec<RequestGroup> {
    let mut seen: HashSet<(RequestKind, &str, u64)> = HashSet::new();
    let mut groups: Vec<RequestGroup> = Vec::new();
    let mut group_index: HashMap<(String, u64), usize> = HashMap::new();
    // Purchase milestones in first-seen order, with the largest raw timing seen.
    let mut purchases: Vec<(&PurchaseEvent, u64)> = Vec::new();

    for item in items {
        if item.event_token.trim().is_empty() {
            tracing::warn!(
                "Skipping malformed request for account {}: empty event token",
                account.id
            );
            continue;
        }
        if !seen.insert((item.kind, item.event_token.as_str(), item.time_spent)) {
            continue;
        }

        let level = catalog.level_by_token(&item.event_token);
        let purchase = catalog.purchase_by_token(&item.event_token);

        match (level, purchase) {
            (Some(level), _) if !item.is_purchase() || purchase.is_none() => {
                let key = (item.event_token.clone(), item.time_spent);
                let idx = *group_index.entry(key).or_insert_with(|| {
                    groups.push(RequestGroup {
                        event_token: item.event_token.clone(),
                        time_spent: item.time_spent,
                        milestone: Milestone::Level(level.id.clone()),
                        items: Vec::new(),
                    });
                    groups.len() - 1
                });
                groups[idx].items.push(RequestItem {
                    level_id: Some(level.id.clone()),
                    ..item.clone()
                });
            }
            (_, Some(purchase)) => {
                match purchases.iter_mut().find(|(p, _)| p.id == purchase.id) {
                    Some((_, max_time)) => *max_time = (*max_time).max(item.time_spent),
                    None => purchases.push((purchase, item.time_spent)),
                }
            }
            _ => {
                tracing::debug!(
                    "Dropping stale request {} for account {}",
                    item.event_token,
                    account.id
                );
            }
        }
    }

    for (purchase, raw_time) in purchases {
        let base = interpolate_purchase_time(catalog, purchase).unwrap_or(raw_time);
        let time_spent = (base as i64 + jitter.sample()).max(0) as u64;
        groups.push(RequestGroup {
            event_token: purchase.event_token.clone(),
            time_spent,
            milestone: Milestone::Purchase(purchase.id.clone()),
            items: vec![
                RequestItem::new(RequestKind::Session, &purchase.event_token, time_spent, None),
                RequestItem::new(RequestKind::Event, &purchase.event_token, time_spent, None),
            ],
        });
    }

    for group in &mut groups {
        group.items.sort_by_key(|item| item.kind);
    }
    groups.sort_by_key(|g| g.time_spent);
    groups
}

/// Rounded midpoint of the levels around a purchase milestone.
///
/// Falls back to whichever neighbour exists; `None` when neither does.
pub fn interpolate_purchase_time(catalog: &GameCatalog, purchase: &PurchaseEvent) -> Option<u64> {
    let prev = catalog.level_by_number(purchase.after_level).map(|l| l.time_spent);
    let next = catalog
        .level_by_number(purchase.after_level + 1)
        .map(|l| l.time_spent);
    match (prev, next) {
        (Some(a), Some(b)) => Some(((a as f64 + b as f64) / 2.0).round() as u64),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}
