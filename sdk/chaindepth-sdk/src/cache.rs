use crate::core::connection::SolConnection;
use crate::core::constants::{START_X, START_Y};
use crate::error::{ChainDepthSdkError, Result};
use crate::events::{EventBus, GameEvent};
use crate::types::{
    BossFightAccount, GlobalAccount, InventoryAccount, PlayerAccount, PlayerProfile,
    ProgramAccount, RoomAccount, RoomPresence, StorageAccount,
};
use crate::utils::{fetch_account_data, AddressDeriver};
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Last decoded value of each tracked account kind.
#[derive(Debug, Clone, Default)]
pub struct Snapshots {
    pub global: Option<GlobalAccount>,
    pub player: Option<PlayerAccount>,
    pub room: Option<RoomAccount>,
    pub inventory: Option<InventoryAccount>,
    pub storage: Option<StorageAccount>,
    pub profile: Option<PlayerProfile>,
    pub boss_fight: Option<BossFightAccount>,
    pub presence: Option<RoomPresence>,
}

/// Account kinds with a slot in `Snapshots`.
pub trait CachedAccount: ProgramAccount {
    fn slot(snapshots: &mut Snapshots) -> &mut Option<Self>;
    fn event(value: Option<Self>) -> GameEvent;
}

macro_rules! cached_account {
    ($ty:ty, $field:ident, $event:ident) => {
        impl CachedAccount for $ty {
            fn slot(snapshots: &mut Snapshots) -> &mut Option<Self> {
                &mut snapshots.$field
            }

            fn event(value: Option<Self>) -> GameEvent {
                GameEvent::$event(value)
            }
        }
    };
}

cached_account!(GlobalAccount, global, GlobalUpdated);
cached_account!(PlayerAccount, player, PlayerUpdated);
cached_account!(RoomAccount, room, RoomUpdated);
cached_account!(InventoryAccount, inventory, InventoryUpdated);
cached_account!(StorageAccount, storage, StorageUpdated);
cached_account!(PlayerProfile, profile, ProfileUpdated);
cached_account!(BossFightAccount, boss_fight, BossFightUpdated);
cached_account!(RoomPresence, presence, PresenceUpdated);

/// Typed snapshots of the player's remote accounts.
///
/// A fetch that finds no account, an empty account, or data that does not
/// decode with the local layout clears the slot and reports `None`. Only
/// transport failures are errors, and they leave the slot untouched.
pub struct AccountCache {
    connection: Arc<dyn SolConnection>,
    deriver: AddressDeriver,
    events: EventBus,
    snapshots: RwLock<Snapshots>,
}

impl AccountCache {
    pub fn new(connection: Arc<dyn SolConnection>, deriver: AddressDeriver, events: EventBus) -> Self {
        Self {
            connection,
            deriver,
            events,
            snapshots: RwLock::new(Snapshots::default()),
        }
    }

    /// Fetch and decode `address` without touching the cache.
    pub async fn peek<T: ProgramAccount>(&self, address: &Pubkey) -> Result<Option<T>> {
        let Some(data) = fetch_account_data(self.connection.as_ref(), address).await? else {
            debug!(account = T::ACCOUNT_NAME, %address, "account not initialized");
            return Ok(None);
        };
        match T::decode(&data) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                warn!(
                    account = T::ACCOUNT_NAME,
                    %address,
                    data_len = data.len(),
                    %error,
                    "decode skipped due to incompatible layout"
                );
                Ok(None)
            },
        }
    }

    /// Fetch, replace the cached snapshot wholesale and publish the change.
    pub async fn fetch_and_cache<T: CachedAccount>(&self, address: &Pubkey) -> Result<Option<T>> {
        let value = self.peek::<T>(address).await?;
        {
            let mut snapshots = self.snapshots.write().await;
            *T::slot(&mut snapshots) = value.clone();
        }
        self.events.emit(T::event(value.clone()));
        Ok(value)
    }

    pub async fn snapshots(&self) -> Snapshots {
        self.snapshots.read().await.clone()
    }

    pub async fn global(&self) -> Option<GlobalAccount> {
        self.snapshots.read().await.global.clone()
    }

    pub async fn player(&self) -> Option<PlayerAccount> {
        self.snapshots.read().await.player.clone()
    }

    pub async fn room(&self) -> Option<RoomAccount> {
        self.snapshots.read().await.room.clone()
    }

    pub async fn inventory(&self) -> Option<InventoryAccount> {
        self.snapshots.read().await.inventory.clone()
    }

    pub async fn storage(&self) -> Option<StorageAccount> {
        self.snapshots.read().await.storage.clone()
    }

    pub async fn profile(&self) -> Option<PlayerProfile> {
        self.snapshots.read().await.profile.clone()
    }

    pub async fn clear(&self) {
        *self.snapshots.write().await = Snapshots::default();
    }

    //=========================================================================
    // Refresh helpers
    //=========================================================================

    pub async fn refresh_global(&self) -> Result<Option<GlobalAccount>> {
        let address = self.deriver.global()?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_player(&self, wallet: &Pubkey) -> Result<Option<PlayerAccount>> {
        let address = self.deriver.player(wallet)?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_profile(&self, wallet: &Pubkey) -> Result<Option<PlayerProfile>> {
        let address = self.deriver.profile(wallet)?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_inventory(&self, wallet: &Pubkey) -> Result<Option<InventoryAccount>> {
        let address = self.deriver.inventory(wallet)?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_storage(&self, wallet: &Pubkey) -> Result<Option<StorageAccount>> {
        let address = self.deriver.storage(wallet)?;
        self.fetch_and_cache(&address).await
    }

    /// Season seed from the cached global account, fetching it first if absent.
    pub async fn season_seed(&self) -> Result<u64> {
        if let Some(global) = self.global().await {
            return Ok(global.season_seed);
        }
        self.refresh_global()
            .await?
            .map(|global| global.season_seed)
            .ok_or_else(|| {
                ChainDepthSdkError::InvalidAccountData("global account not initialized".to_string())
            })
    }

    /// Cached player position, or the start room when no player is cached.
    pub async fn player_position(&self) -> (i8, i8) {
        self.player()
            .await
            .map(|p| (p.current_room_x, p.current_room_y))
            .unwrap_or((START_X, START_Y))
    }

    /// Refresh the room the cached player stands in.
    pub async fn refresh_current_room(&self) -> Result<Option<RoomAccount>> {
        let season_seed = self.season_seed().await?;
        let (x, y) = self.player_position().await;
        let address = self.deriver.room(season_seed, x, y)?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_boss_fight(&self, wallet: &Pubkey) -> Result<Option<BossFightAccount>> {
        let season_seed = self.season_seed().await?;
        let (x, y) = self.player_position().await;
        let room = self.deriver.room(season_seed, x, y)?;
        let address = self.deriver.boss_fight(&room, wallet)?;
        self.fetch_and_cache(&address).await
    }

    pub async fn refresh_presence(&self, wallet: &Pubkey) -> Result<Option<RoomPresence>> {
        let season_seed = self.season_seed().await?;
        let (x, y) = self.player_position().await;
        let address = self.deriver.presence(season_seed, x, y, wallet)?;
        self.fetch_and_cache(&address).await
    }

    /// Global, player, profile, current room, inventory and storage, in that order.
    pub async fn refresh_all(&self, wallet: &Pubkey) -> Result<()> {
        self.refresh_global().await?;
        self.refresh_player(wallet).await?;
        self.refresh_profile(wallet).await?;
        self.refresh_current_room().await?;
        self.refresh_inventory(wallet).await?;
        self.refresh_storage(wallet).await?;
        Ok(())
    }
}
