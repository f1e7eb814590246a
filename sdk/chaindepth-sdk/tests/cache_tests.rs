mod common;

use chaindepth_sdk::cache::AccountCache;
use chaindepth_sdk::core::constants::DEFAULT_PROGRAM_ID;
use chaindepth_sdk::events::{EventBus, GameEvent};
use chaindepth_sdk::types::{PlayerAccount, ProgramAccount, RoomAccount};
use chaindepth_sdk::utils::AddressDeriver;
use common::{encode_account, global_account, player_at, room_at, MockConnection, SEASON_SEED};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

struct Fixture {
    cache: AccountCache,
    connection: Arc<MockConnection>,
    deriver: AddressDeriver,
    events: EventBus,
}

fn fixture() -> Fixture {
    let connection = Arc::new(MockConnection::new("mock://cache"));
    let deriver = AddressDeriver::new(DEFAULT_PROGRAM_ID);
    let events = EventBus::default();
    let cache = AccountCache::new(connection.clone(), deriver, events.clone());
    Fixture {
        cache,
        connection,
        deriver,
        events,
    }
}

#[test_log::test(tokio::test)]
async fn missing_account_is_none() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    assert!(f.cache.refresh_player(&wallet).await?.is_none());
    assert!(f.cache.player().await.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn empty_account_is_none() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    f.connection.set_account(f.deriver.player(&wallet)?, Vec::new());
    assert!(f.cache.refresh_player(&wallet).await?.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn incompatible_layout_is_none_not_error() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    let address = f.deriver.player(&wallet)?;

    // Right discriminator, truncated body
    let mut data = PlayerAccount::discriminator().to_vec();
    data.extend_from_slice(&[1, 2, 3]);
    f.connection.set_account(address, data);
    assert!(f.cache.refresh_player(&wallet).await?.is_none());

    // Another account kind stored at the address
    f.connection.set_account(address, encode_account(&room_at(0, 0)));
    assert!(f.cache.peek::<PlayerAccount>(&address).await?.is_none());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn trailing_bytes_are_ignored() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    let player = player_at(wallet, 5, 5);
    let mut data = encode_account(&player);
    data.extend_from_slice(&[0; 64]);
    f.connection.set_account(f.deriver.player(&wallet)?, data);
    assert_eq!(f.cache.refresh_player(&wallet).await?, Some(player));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn fetch_replaces_snapshot_and_notifies() -> anyhow::Result<()> {
    let f = fixture();
    let mut events = f.events.subscribe();
    let wallet = Pubkey::new_unique();
    let address = f.deriver.player(&wallet)?;

    let player = player_at(wallet, 4, 6);
    f.connection.set_account(address, encode_account(&player));
    f.cache.refresh_player(&wallet).await?;
    assert_eq!(f.cache.player().await, Some(player.clone()));
    match events.try_recv()? {
        GameEvent::PlayerUpdated(Some(p)) => assert_eq!(p, player),
        other => panic!("unexpected event {:?}", other),
    }

    // Account closed: slot cleared and a None update published
    f.connection.set_account(address, Vec::new());
    f.cache.refresh_player(&wallet).await?;
    assert!(f.cache.player().await.is_none());
    assert!(matches!(events.try_recv()?, GameEvent::PlayerUpdated(None)));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn transport_error_keeps_last_snapshot() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    let player = player_at(wallet, 5, 5);
    f.connection.set_account(f.deriver.player(&wallet)?, encode_account(&player));
    f.cache.refresh_player(&wallet).await?;

    f.connection.set_reads_failing(true);
    assert!(f.cache.refresh_player(&wallet).await.is_err());
    assert_eq!(f.cache.player().await, Some(player));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn current_room_follows_player_position() -> anyhow::Result<()> {
    let f = fixture();
    let wallet = Pubkey::new_unique();
    f.connection.set_account(f.deriver.global()?, encode_account(&global_account()));
    f.connection
        .set_account(f.deriver.player(&wallet)?, encode_account(&player_at(wallet, 3, 7)));
    let room = room_at(3, 7);
    f.connection
        .set_account(f.deriver.room(SEASON_SEED, 3, 7)?, encode_account(&room));

    f.cache.refresh_all(&wallet).await?;
    let snapshots = f.cache.snapshots().await;
    assert_eq!(snapshots.room, Some(room));
    assert!(snapshots.inventory.is_none());
    assert!(snapshots.profile.is_none());

    f.cache.clear().await;
    let cleared: Option<RoomAccount> = f.cache.room().await;
    assert!(cleared.is_none());
    Ok(())
}
