use crate::extraction::{ExtractionSummary, ItemDelta};
use crate::types::{
    BossFightAccount, GlobalAccount, InventoryAccount, PlayerAccount, PlayerProfile,
    RoomAccount, RoomPresence, StorageAccount,
};
use solana_sdk::signature::Signature;
use tokio::sync::broadcast;

/// Notifications published by the client.
///
/// Account events carry the new snapshot, `None` when the account was found
/// to be missing, empty, or undecodable.
#[derive(Debug, Clone)]
pub enum GameEvent {
    GlobalUpdated(Option<GlobalAccount>),
    PlayerUpdated(Option<PlayerAccount>),
    RoomUpdated(Option<RoomAccount>),
    InventoryUpdated(Option<InventoryAccount>),
    StorageUpdated(Option<StorageAccount>),
    ProfileUpdated(Option<PlayerProfile>),
    BossFightUpdated(Option<BossFightAccount>),
    PresenceUpdated(Option<RoomPresence>),
    TransactionSent {
        action: String,
        signature: Signature,
    },
    /// Short human-readable failure
    Error(String),
    SessionFeeFundingRequired(String),
    SessionStarted {
        session_key: solana_sdk::pubkey::Pubkey,
    },
    SessionEnded,
    ItemsGained(Vec<ItemDelta>),
    ExtractionCompleted(ExtractionSummary),
}

/// Fan-out of `GameEvent`s to any number of subscribers.
///
/// Slow subscribers lag and lose the oldest events rather than blocking
/// publishers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GameEvent>,
}

impl EventBus {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: GameEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
