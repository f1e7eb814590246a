use crate::core::constants::*;
use crate::error::{ChainDepthSdkError, Result};
use crate::utils::anchor_discriminator;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::pubkey::Pubkey;

//=============================================================================
// Account Decoding
//=============================================================================

/// An Anchor account owned by the dungeon program.
///
/// Layout: `[0..8]` discriminator (`sha256("account:<Name>")[..8]`), then the
/// borsh body. Accounts are allocated at their maximum size, so trailing bytes
/// after the body are expected and ignored.
pub trait ProgramAccount: BorshDeserialize + Clone + Send + Sync + 'static {
    const ACCOUNT_NAME: &'static str;

    fn discriminator() -> [u8; 8] {
        anchor_discriminator("account", Self::ACCOUNT_NAME)
    }

    fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(ChainDepthSdkError::InvalidAccountData(format!(
                "{} data shorter than discriminator",
                Self::ACCOUNT_NAME
            )));
        }
        if data[..8] != Self::discriminator() {
            return Err(ChainDepthSdkError::InvalidAccountData(format!(
                "{} discriminator mismatch",
                Self::ACCOUNT_NAME
            )));
        }
        let mut body = &data[8..];
        Self::deserialize(&mut body).map_err(|e| {
            ChainDepthSdkError::InvalidAccountData(format!(
                "{} layout mismatch: {}",
                Self::ACCOUNT_NAME,
                e
            ))
        })
    }
}

//=============================================================================
// Domain Codes
//=============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            DIRECTION_NORTH => Some(Direction::North),
            DIRECTION_SOUTH => Some(Direction::South),
            DIRECTION_EAST => Some(Direction::East),
            DIRECTION_WEST => Some(Direction::West),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Direction::North => DIRECTION_NORTH,
            Direction::South => DIRECTION_SOUTH,
            Direction::East => DIRECTION_EAST,
            Direction::West => DIRECTION_WEST,
        }
    }

    pub fn index(self) -> usize {
        self.as_u8() as usize
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// Coordinates of the room behind this door. North is `y + 1`.
    pub fn adjacent(self, x: i8, y: i8) -> (i8, i8) {
        match self {
            Direction::North => (x, y.wrapping_add(1)),
            Direction::South => (x, y.wrapping_sub(1)),
            Direction::East => (x.wrapping_add(1), y),
            Direction::West => (x.wrapping_sub(1), y),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::North => "North",
            Direction::South => "South",
            Direction::East => "East",
            Direction::West => "West",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallState {
    Solid,
    Rubble,
    Open,
    Locked,
    EntranceStairs,
    Unknown(u8),
}

impl From<u8> for WallState {
    fn from(value: u8) -> Self {
        match value {
            WALL_SOLID => WallState::Solid,
            WALL_RUBBLE => WallState::Rubble,
            WALL_OPEN => WallState::Open,
            WALL_LOCKED => WallState::Locked,
            WALL_ENTRANCE_STAIRS => WallState::EntranceStairs,
            other => WallState::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CenterType {
    Empty,
    Chest,
    Boss,
    Unknown(u8),
}

impl From<u8> for CenterType {
    fn from(value: u8) -> Self {
        match value {
            CENTER_EMPTY => CenterType::Empty,
            CENTER_CHEST => CenterType::Chest,
            CENTER_BOSS => CenterType::Boss,
            other => CenterType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    None,
    Skeleton,
    Unknown(u8),
}

impl LockKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            LOCK_KIND_NONE => LockKind::None,
            LOCK_KIND_SKELETON => LockKind::Skeleton,
            other => LockKind::Unknown(other),
        }
    }

    /// Item consumed when unlocking. Unknown kinds fall back to the skeleton key.
    pub fn required_key_item(self) -> u16 {
        SKELETON_KEY_ITEM_ID
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LockKind::None => "Unlocked",
            LockKind::Skeleton | LockKind::Unknown(_) => "Skeleton Lock",
        }
    }
}

pub fn item_display_name(item_id: u16) -> String {
    match item_id {
        SKELETON_KEY_ITEM_ID => "Skeleton Key".to_string(),
        other => format!("Item #{}", other),
    }
}

/// What a player is doing in the room, as published on their presence record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    DoorJob,
    BossFight,
    Unknown(u8),
}

impl From<u8> for Activity {
    fn from(value: u8) -> Self {
        match value {
            0 => Activity::Idle,
            1 => Activity::DoorJob,
            2 => Activity::BossFight,
            other => Activity::Unknown(other),
        }
    }
}

//=============================================================================
// Account Layouts
//=============================================================================

/// Season-wide configuration. PDA seeds: `["global"]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct GlobalAccount {
    /// Seed for the current season; part of every room address
    pub season_seed: u64,
    pub depth: u32,
    pub skr_mint: Pubkey,
    /// Prize pool token account
    pub prize_pool: Pubkey,
    pub admin: Pubkey,
    pub end_slot: u64,
    pub jobs_completed: u64,
    pub bump: u8,
}

impl ProgramAccount for GlobalAccount {
    const ACCOUNT_NAME: &'static str = "GlobalAccount";
}

/// A job the player holds on a door
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct ActiveJob {
    pub room_x: i8,
    pub room_y: i8,
    pub direction: u8,
}

/// One per wallet. PDA seeds: `["player", wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PlayerAccount {
    pub owner: Pubkey,
    pub current_room_x: i8,
    pub current_room_y: i8,
    pub active_jobs: Vec<ActiveJob>,
    pub jobs_completed: u64,
    pub chests_looted: u64,
    /// Item id equipped for combat (0 = none)
    pub equipped_item_id: u16,
    pub season_seed: u64,
    /// Cumulative score banked by extractions
    pub total_score: u64,
    pub current_hp: u16,
    pub max_hp: u16,
    pub in_dungeon: bool,
    pub bump: u8,
}

impl ProgramAccount for PlayerAccount {
    const ACCOUNT_NAME: &'static str = "PlayerAccount";
}

impl PlayerAccount {
    pub fn has_active_job(&self, room_x: i8, room_y: i8, direction: u8) -> bool {
        self.active_jobs
            .iter()
            .any(|job| job.room_x == room_x && job.room_y == room_y && job.direction == direction)
    }
}

/// One per coordinate per season.
/// PDA seeds: `["room", season_seed (8 bytes LE), x (1 byte), y (1 byte)]`
///
/// Per-door arrays are indexed by direction (N, S, E, W).
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoomAccount {
    pub x: i8,
    pub y: i8,
    pub season_seed: u64,
    pub walls: [u8; 4],
    pub door_lock_kinds: [u8; 4],
    pub helper_counts: [u32; 4],
    /// Accumulated work per door, in slots
    pub progress: [u64; 4],
    pub start_slot: [u64; 4],
    /// Work required to clear each door, in slots
    pub base_slots: [u64; 4],
    pub total_staked: [u64; 4],
    pub job_completed: [bool; 4],
    pub center_type: u8,
    pub center_id: u16,
    pub boss_max_hp: u64,
    pub boss_current_hp: u64,
    pub boss_last_update_slot: u64,
    pub boss_total_dps: u64,
    pub boss_fighter_count: u32,
    pub boss_defeated: bool,
    pub looted_count: u32,
    pub created_by: Pubkey,
    pub bump: u8,
}

impl ProgramAccount for RoomAccount {
    const ACCOUNT_NAME: &'static str = "RoomAccount";
}

impl RoomAccount {
    pub fn wall(&self, direction: Direction) -> WallState {
        WallState::from(self.walls[direction.index()])
    }

    pub fn lock_kind(&self, direction: Direction) -> LockKind {
        LockKind::from_u8(self.door_lock_kinds[direction.index()])
    }

    pub fn center(&self) -> CenterType {
        CenterType::from(self.center_type)
    }

    pub fn is_job_ready(&self, direction: Direction) -> bool {
        let i = direction.index();
        self.progress[i] >= self.base_slots[i]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InventoryItem {
    pub item_id: u16,
    pub amount: u32,
    pub durability: u16,
}

/// Items carried in the dungeon. PDA seeds: `["inventory", wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InventoryAccount {
    pub owner: Pubkey,
    pub items: Vec<InventoryItem>,
    pub bump: u8,
}

impl ProgramAccount for InventoryAccount {
    const ACCOUNT_NAME: &'static str = "InventoryAccount";
}

impl InventoryAccount {
    pub fn total_amount(&self, item_id: u16) -> u64 {
        self.items
            .iter()
            .filter(|item| item.item_id == item_id)
            .map(|item| item.amount as u64)
            .sum()
    }
}

/// Items banked by extraction. PDA seeds: `["storage", wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct StorageAccount {
    pub owner: Pubkey,
    pub items: Vec<InventoryItem>,
    pub bump: u8,
}

impl ProgramAccount for StorageAccount {
    const ACCOUNT_NAME: &'static str = "StorageAccount";
}

/// PDA seeds: `["profile", wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PlayerProfile {
    pub owner: Pubkey,
    pub skin_id: u16,
    pub display_name: String,
    pub starter_pickaxe_granted: bool,
    pub bump: u8,
}

impl ProgramAccount for PlayerProfile {
    const ACCOUNT_NAME: &'static str = "PlayerProfile";
}

/// PDA seeds: `["boss_fight", room, wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct BossFightAccount {
    pub player: Pubkey,
    pub room: Pubkey,
    pub dps: u64,
    pub joined_slot: u64,
    pub last_damage_slot: u64,
    pub is_active: bool,
    pub bump: u8,
}

impl ProgramAccount for BossFightAccount {
    const ACCOUNT_NAME: &'static str = "BossFightAccount";
}

/// PDA seeds: `["presence", season_seed, x, y, wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RoomPresence {
    pub player: Pubkey,
    pub season_seed: u64,
    pub room_x: i8,
    pub room_y: i8,
    pub skin_id: u16,
    pub equipped_item_id: u16,
    pub activity: u8,
    pub activity_direction: u8,
    pub is_current: bool,
    pub bump: u8,
}

impl ProgramAccount for RoomPresence {
    const ACCOUNT_NAME: &'static str = "RoomPresence";
}

impl RoomPresence {
    pub fn activity(&self) -> Activity {
        Activity::from(self.activity)
    }
}

/// PDA seeds: `["stake", room, direction (1 byte), wallet]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct HelperStake {
    pub player: Pubkey,
    pub room: Pubkey,
    pub direction: u8,
    pub amount: u64,
    pub joined_slot: u64,
    pub bump: u8,
}

impl ProgramAccount for HelperStake {
    const ACCOUNT_NAME: &'static str = "HelperStake";
}

/// PDA seeds: `["session", wallet, session_key]`
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SessionAuthority {
    pub player: Pubkey,
    pub session_key: Pubkey,
    pub expires_at_slot: u64,
    pub expires_at_unix_timestamp: i64,
    pub instruction_allowlist: u64,
    pub max_token_spend: u64,
    pub spent_token_amount: u64,
    pub is_active: bool,
    pub bump: u8,
}

impl ProgramAccount for SessionAuthority {
    const ACCOUNT_NAME: &'static str = "SessionAuthority";
}
