mod common;

use chaindepth_sdk::cache::AccountCache;
use chaindepth_sdk::config::ReconcileSettings;
use chaindepth_sdk::core::constants::DEFAULT_PROGRAM_ID;
use chaindepth_sdk::events::EventBus;
use chaindepth_sdk::extraction::{unit_score, EndReason, ExtractionReconciler, RunBaseline};
use chaindepth_sdk::utils::AddressDeriver;
use common::{encode_account, inventory, player_at, MockConnection};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::watch;

/// Reads per poll: player, inventory, storage.
const READS_PER_POLL: usize = 3;

struct Fixture {
    reconciler: ExtractionReconciler,
    connection: Arc<MockConnection>,
    deriver: AddressDeriver,
    wallet: Pubkey,
}

fn fixture(max_attempts: u32) -> Fixture {
    let connection = Arc::new(MockConnection::new("mock://reconcile"));
    let deriver = AddressDeriver::new(DEFAULT_PROGRAM_ID);
    let cache = Arc::new(AccountCache::new(connection.clone(), deriver, EventBus::default()));
    let settings = ReconcileSettings {
        max_attempts,
        poll_interval_ms: 1,
        ..ReconcileSettings::default()
    };
    Fixture {
        reconciler: ExtractionReconciler::new(cache, settings),
        connection,
        deriver,
        wallet: Pubkey::new_unique(),
    }
}

fn carried(wallet: Pubkey) -> chaindepth_sdk::types::InventoryAccount {
    inventory(wallet, &[(200, 3), (207, 1), (203, 2)])
}

#[test_log::test(tokio::test)]
async fn converges_once_inventory_settles() -> anyhow::Result<()> {
    let f = fixture(20);
    let before = carried(f.wallet);
    let baseline = RunBaseline::new(Some(&player_at(f.wallet, 5, 5)), Some(before.clone()), EndReason::Extraction);

    // Stale for two polls, then the loot leaves the inventory
    let stale = encode_account(&before);
    let settled = encode_account(&inventory(f.wallet, &[]));
    f.connection.queue_account(
        f.deriver.inventory(&f.wallet)?,
        vec![Some(stale.clone()), Some(stale), Some(settled)],
    );
    f.connection
        .set_account(f.deriver.player(&f.wallet)?, encode_account(&player_at(f.wallet, 5, 5)));

    let (_tx, mut cancel) = watch::channel(false);
    let summary = f.reconciler.reconcile(&f.wallet, &baseline, &mut cancel).await;

    let n = 3;
    assert!(f.connection.read_count() <= READS_PER_POLL * (n + 1));
    let expected: u64 = [(200u16, 3u64), (207, 1), (203, 2)]
        .iter()
        .map(|&(id, amount)| unit_score(id) * amount)
        .sum();
    assert_eq!(summary.loot_score, expected);
    assert_eq!(summary.loot_score, summary.items.iter().map(|i| i.stack_score).sum::<u64>());
    assert_eq!(summary.items.len(), 3);
    assert!(summary.items.windows(2).all(|w| w[0].stack_score >= w[1].stack_score));
    // Score not yet visible: the run is credited with the loot
    assert_eq!(summary.run_score, expected);
    assert_eq!(summary.time_score, 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn score_advance_splits_loot_and_time() -> anyhow::Result<()> {
    let f = fixture(20);
    let mut start = player_at(f.wallet, 5, 5);
    start.total_score = 100;
    let before = carried(f.wallet);
    let baseline = RunBaseline::new(Some(&start), Some(before), EndReason::Extraction);

    let mut end = start.clone();
    end.total_score = 160;
    f.connection
        .set_account(f.deriver.player(&f.wallet)?, encode_account(&end));
    f.connection
        .set_account(f.deriver.inventory(&f.wallet)?, encode_account(&inventory(f.wallet, &[])));

    let (_tx, mut cancel) = watch::channel(false);
    let summary = f.reconciler.reconcile(&f.wallet, &baseline, &mut cancel).await;

    assert_eq!(f.connection.read_count(), READS_PER_POLL);
    assert_eq!(summary.run_score, 60);
    assert_eq!(summary.loot_score, 3 + 20 + 24);
    assert_eq!(summary.time_score, 60 - 47);
    assert_eq!(summary.total_score_after, 160);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn unchanged_empty_delta_settles_without_scored_loot() -> anyhow::Result<()> {
    let f = fixture(20);
    let before = inventory(f.wallet, &[(1, 1)]);
    let baseline = RunBaseline::new(Some(&player_at(f.wallet, 5, 5)), Some(before.clone()), EndReason::Death);
    f.connection
        .set_account(f.deriver.player(&f.wallet)?, encode_account(&player_at(f.wallet, 5, 5)));
    f.connection
        .set_account(f.deriver.inventory(&f.wallet)?, encode_account(&before));

    let (_tx, mut cancel) = watch::channel(false);
    let summary = f.reconciler.reconcile(&f.wallet, &baseline, &mut cancel).await;

    assert_eq!(f.connection.read_count(), READS_PER_POLL * 2);
    assert!(summary.items.is_empty());
    assert_eq!(summary.run_score, 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn gives_up_after_max_attempts_with_latest_snapshot() -> anyhow::Result<()> {
    let f = fixture(4);
    let before = carried(f.wallet);
    let baseline = RunBaseline::new(Some(&player_at(f.wallet, 5, 5)), Some(before.clone()), EndReason::Extraction);
    f.connection
        .set_account(f.deriver.inventory(&f.wallet)?, encode_account(&before));

    let (_tx, mut cancel) = watch::channel(false);
    let summary = f.reconciler.reconcile(&f.wallet, &baseline, &mut cancel).await;

    assert_eq!(f.connection.read_count(), READS_PER_POLL * 4);
    assert!(summary.items.is_empty());
    assert_eq!(summary.loot_score, 0);
    assert_eq!(summary.run_score, 0);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancellation_stops_polling() -> anyhow::Result<()> {
    let f = fixture(1_000);
    let before = carried(f.wallet);
    let baseline = RunBaseline::new(None, Some(before), EndReason::Extraction);

    let (_tx, mut cancel) = watch::channel(true);
    let summary = f.reconciler.reconcile(&f.wallet, &baseline, &mut cancel).await;

    assert_eq!(f.connection.read_count(), 0);
    assert!(summary.items.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn cancellation_during_wait_ends_the_loop() -> anyhow::Result<()> {
    let connection = Arc::new(MockConnection::new("mock://reconcile"));
    let deriver = AddressDeriver::new(DEFAULT_PROGRAM_ID);
    let cache = Arc::new(AccountCache::new(connection.clone(), deriver, EventBus::default()));
    let settings = ReconcileSettings {
        max_attempts: 1_000,
        poll_interval_ms: 60_000,
        ..ReconcileSettings::default()
    };
    let reconciler = ExtractionReconciler::new(cache, settings);
    let wallet = Pubkey::new_unique();
    let baseline = RunBaseline::new(None, Some(carried(wallet)), EndReason::Extraction);

    let (tx, mut cancel) = watch::channel(false);
    let cancel_task = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send_replace(true);
        tx
    });

    let summary = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        reconciler.reconcile(&wallet, &baseline, &mut cancel),
    )
    .await?;
    let _tx = cancel_task.await?;

    assert_eq!(connection.read_count(), READS_PER_POLL);
    assert!(summary.items.is_empty());
    Ok(())
}
