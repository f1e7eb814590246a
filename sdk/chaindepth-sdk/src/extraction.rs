//! Run-end summaries.
//!
//! Exit and death transactions settle eventually: the player's score and the
//! carried inventory can lag the confirmed signature by several reads. The
//! reconciler polls until the deltas look settled (or gives up and uses the
//! last snapshot) and then freezes the result into an `ExtractionSummary`.

use crate::cache::AccountCache;
use crate::config::ReconcileSettings;
use crate::types::{InventoryAccount, PlayerAccount};
use solana_sdk::pubkey::Pubkey;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Item ids that carry extraction score (and are lost on death).
pub const SCORED_LOOT_IDS: RangeInclusive<u16> = 200..=299;

pub fn is_scored_loot(item_id: u16) -> bool {
    SCORED_LOOT_IDS.contains(&item_id)
}

/// Score per extracted unit.
pub fn unit_score(item_id: u16) -> u64 {
    match item_id {
        200 => 1,
        201 => 3,
        202 => 8,
        203 => 12,
        204 => 10,
        205 => 9,
        206 => 9,
        207 => 20,
        208 => 2,
        209 => 15,
        210 => 11,
        211 => 4,
        212 => 7,
        213 => 14,
        215 => 13,
        216 => 3,
        217 => 8,
        218 => 18,
        219 => 16,
        _ => 0,
    }
}

/// Positive change in the amount held of one item kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemDelta {
    pub item_id: u16,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionItem {
    pub item_id: u16,
    pub amount: u64,
    pub unit_score: u64,
    pub stack_score: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Extraction,
    Death,
}

/// Immutable summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Sorted by stack score, highest first
    pub items: Vec<ExtractionItem>,
    pub loot_score: u64,
    /// Run score not explained by loot
    pub time_score: u64,
    pub run_score: u64,
    pub total_score_after: u64,
    pub end_reason: EndReason,
}

fn amounts(inventory: Option<&InventoryAccount>) -> BTreeMap<u16, u64> {
    let mut totals = BTreeMap::new();
    for item in inventory.map(|inv| inv.items.as_slice()).unwrap_or_default() {
        if item.amount > 0 {
            *totals.entry(item.item_id).or_insert(0) += item.amount as u64;
        }
    }
    totals
}

/// Per-item increase from `before` to `after`, in item id order.
pub fn inventory_gains(before: Option<&InventoryAccount>, after: Option<&InventoryAccount>) -> Vec<ItemDelta> {
    let before = amounts(before);
    amounts(after)
        .into_iter()
        .filter_map(|(item_id, after_amount)| {
            let before_amount = before.get(&item_id).copied().unwrap_or(0);
            (after_amount > before_amount).then(|| ItemDelta {
                item_id,
                amount: after_amount - before_amount,
            })
        })
        .collect()
}

/// Scored loot that left the inventory between `before` and `after`.
pub fn scored_loot_removed(
    before: Option<&InventoryAccount>,
    after: Option<&InventoryAccount>,
) -> Vec<ItemDelta> {
    let after = amounts(after);
    amounts(before)
        .into_iter()
        .filter(|(item_id, _)| is_scored_loot(*item_id))
        .filter_map(|(item_id, before_amount)| {
            let after_amount = after.get(&item_id).copied().unwrap_or(0);
            (before_amount > after_amount).then(|| ItemDelta {
                item_id,
                amount: before_amount - after_amount,
            })
        })
        .collect()
}

pub fn build_summary(
    before: Option<&InventoryAccount>,
    after: Option<&InventoryAccount>,
    score_before: u64,
    score_after: u64,
    end_reason: EndReason,
) -> ExtractionSummary {
    let extracted = end_reason == EndReason::Extraction;
    let mut items: Vec<ExtractionItem> = scored_loot_removed(before, after)
        .into_iter()
        .map(|delta| {
            let unit = if extracted { unit_score(delta.item_id) } else { 0 };
            ExtractionItem {
                item_id: delta.item_id,
                amount: delta.amount,
                unit_score: unit,
                stack_score: unit.saturating_mul(delta.amount),
            }
        })
        .collect();
    items.sort_by(|a, b| b.stack_score.cmp(&a.stack_score).then(a.item_id.cmp(&b.item_id)));

    let loot_score: u64 = items.iter().map(|item| item.stack_score).sum();
    let mut run_score = if extracted {
        score_after.saturating_sub(score_before)
    } else {
        0
    };
    // Score read can still be stale while the loot already left the inventory
    if extracted && run_score == 0 {
        run_score = loot_score;
    }
    let time_score = if extracted { run_score.saturating_sub(loot_score) } else { 0 };
    let total_score_after = if extracted {
        score_after.max(score_before.saturating_add(run_score))
    } else {
        score_after
    };

    ExtractionSummary {
        items,
        loot_score,
        time_score,
        run_score,
        total_score_after,
        end_reason,
    }
}

/// Single pending summary slot. Last write wins; consuming empties it.
#[derive(Debug, Default)]
pub struct ExtractionSummaryStore {
    pending: Mutex<Option<ExtractionSummary>>,
}

impl ExtractionSummaryStore {
    pub async fn set_pending(&self, summary: ExtractionSummary) {
        *self.pending.lock().await = Some(summary);
    }

    pub async fn has_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    pub async fn consume_pending(&self) -> Option<ExtractionSummary> {
        self.pending.lock().await.take()
    }
}

//=============================================================================
// Reconciler
//=============================================================================

/// Pre-transaction state the summary is measured against.
#[derive(Debug, Clone)]
pub struct RunBaseline {
    pub inventory: Option<InventoryAccount>,
    pub total_score: u64,
    pub end_reason: EndReason,
}

impl RunBaseline {
    pub fn new(player: Option<&PlayerAccount>, inventory: Option<InventoryAccount>, end_reason: EndReason) -> Self {
        Self {
            inventory,
            total_score: player.map(|p| p.total_score).unwrap_or(0),
            end_reason,
        }
    }
}

pub struct ExtractionReconciler {
    cache: Arc<AccountCache>,
    settings: ReconcileSettings,
}

impl ExtractionReconciler {
    pub fn new(cache: Arc<AccountCache>, settings: ReconcileSettings) -> Self {
        Self { cache, settings }
    }

    /// Poll player, inventory and storage until the run looks settled.
    ///
    /// Stops when the cumulative score advanced or a run score is
    /// computable (once loot shows up, if any scored loot was carried), or
    /// when the removed-loot set is unchanged across two consecutive polls.
    /// An empty set only counts when no scored loot was carried. Gives up after `max_attempts` polls or on
    /// `cancel`, and summarizes whatever the cache holds then.
    pub async fn reconcile(
        &self,
        wallet: &Pubkey,
        baseline: &RunBaseline,
        cancel: &mut watch::Receiver<bool>,
    ) -> ExtractionSummary {
        let had_scored_loot = !scored_loot_removed(baseline.inventory.as_ref(), None).is_empty();
        let mut previous_removed: Option<Vec<ItemDelta>> = None;

        for attempt in 1..=self.settings.max_attempts {
            if *cancel.borrow() {
                info!(attempt, "reconciliation cancelled");
                break;
            }

            self.poll(wallet).await;
            let summary = self.current_summary(baseline).await;
            let score_after = self.cache.player().await.map(|p| p.total_score).unwrap_or(baseline.total_score);
            let removed = scored_loot_removed(baseline.inventory.as_ref(), self.cache.inventory().await.as_ref());

            let score_advanced = score_after > baseline.total_score;
            let has_run_score = summary.run_score > 0;
            let has_items = !removed.is_empty();
            let score_settled = if had_scored_loot {
                has_items && (score_advanced || has_run_score)
            } else {
                score_advanced || has_run_score
            };
            // Nothing scored was carried, so an unchanged empty delta is final too
            let items_stable = (has_items || !had_scored_loot) && previous_removed.as_ref() == Some(&removed);

            debug!(attempt, score_advanced, has_run_score, items = removed.len(), items_stable, "reconcile poll");
            if score_settled || items_stable {
                return summary;
            }
            previous_removed = Some(removed);

            if attempt < self.settings.max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval()) => {},
                    changed = cancel.changed() => {
                        if changed.is_err() || *cancel.borrow() {
                            info!(attempt, "reconciliation cancelled");
                            break;
                        }
                    },
                }
            }
        }

        warn!("run summary did not settle, using latest snapshots");
        self.current_summary(baseline).await
    }

    async fn poll(&self, wallet: &Pubkey) {
        if let Err(error) = self.cache.refresh_player(wallet).await {
            warn!(%error, "player refresh failed during reconciliation");
        }
        if let Err(error) = self.cache.refresh_inventory(wallet).await {
            warn!(%error, "inventory refresh failed during reconciliation");
        }
        if let Err(error) = self.cache.refresh_storage(wallet).await {
            warn!(%error, "storage refresh failed during reconciliation");
        }
    }

    async fn current_summary(&self, baseline: &RunBaseline) -> ExtractionSummary {
        let score_after = self
            .cache
            .player()
            .await
            .map(|p| p.total_score)
            .unwrap_or(baseline.total_score);
        let inventory = self.cache.inventory().await;
        build_summary(
            baseline.inventory.as_ref(),
            inventory.as_ref(),
            baseline.total_score,
            score_after,
            baseline.end_reason,
        )
    }
}
