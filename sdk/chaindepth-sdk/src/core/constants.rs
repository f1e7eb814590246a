use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;

// Deployed dungeon program (devnet)
pub const DEFAULT_PROGRAM_ID: Pubkey = pubkey!("3Ctc2FgnNHQtGAcZftMS4ykLhJYjLzBD3hELKy55DnKo");

// SKR token mint used for job stakes and session spend caps
pub const DEFAULT_SKR_MINT: Pubkey = pubkey!("Dkpjmf6mUxxLyw9HmbdkBKhVf7zjGZZ6jNjruhjYpkiN");

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

//=============================================================================
// PDA Seeds
//=============================================================================

pub const GLOBAL_SEED: &[u8] = b"global";
pub const PLAYER_SEED: &[u8] = b"player";
pub const ROOM_SEED: &[u8] = b"room";
pub const ESCROW_SEED: &[u8] = b"escrow";
pub const HELPER_STAKE_SEED: &[u8] = b"stake";
pub const INVENTORY_SEED: &[u8] = b"inventory";
pub const STORAGE_SEED: &[u8] = b"storage";
pub const PROFILE_SEED: &[u8] = b"profile";
pub const PRESENCE_SEED: &[u8] = b"presence";
pub const BOSS_FIGHT_SEED: &[u8] = b"boss_fight";
pub const LOOT_RECEIPT_SEED: &[u8] = b"loot_receipt";
pub const PRIZE_POOL_SEED: &[u8] = b"prize_pool";
pub const SESSION_SEED: &[u8] = b"session";

//=============================================================================
// Dungeon Layout Codes
//=============================================================================

/// Start room coordinates
pub const START_X: i8 = 5;
pub const START_Y: i8 = 5;

pub const DIRECTION_NORTH: u8 = 0;
pub const DIRECTION_SOUTH: u8 = 1;
pub const DIRECTION_EAST: u8 = 2;
pub const DIRECTION_WEST: u8 = 3;

pub const WALL_SOLID: u8 = 0;
pub const WALL_RUBBLE: u8 = 1;
pub const WALL_OPEN: u8 = 2;
pub const WALL_LOCKED: u8 = 3;
pub const WALL_ENTRANCE_STAIRS: u8 = 4;

pub const CENTER_EMPTY: u8 = 0;
pub const CENTER_CHEST: u8 = 1;
pub const CENTER_BOSS: u8 = 2;

pub const LOCK_KIND_NONE: u8 = 0;
pub const LOCK_KIND_SKELETON: u8 = 1;

pub const SKELETON_KEY_ITEM_ID: u16 = 214;

/// Maximum concurrent jobs tracked on a player account
pub const MAX_ACTIVE_JOBS: usize = 4;

//=============================================================================
// Session Delegation
//=============================================================================

/// Instruction allowlist bits understood by the session authority account
pub mod session_instruction_bits {
    pub const BOOST_JOB: u64 = 1 << 0;
    pub const ABANDON_JOB: u64 = 1 << 1;
    pub const CLAIM_JOB_REWARD: u64 = 1 << 2;
    pub const EQUIP_ITEM: u64 = 1 << 3;
    pub const SET_PLAYER_SKIN: u64 = 1 << 4;
    pub const REMOVE_INVENTORY_ITEM: u64 = 1 << 5;
    pub const MOVE_PLAYER: u64 = 1 << 6;
    pub const JOIN_JOB: u64 = 1 << 7;
    pub const COMPLETE_JOB: u64 = 1 << 8;
    pub const CREATE_PLAYER_PROFILE: u64 = 1 << 9;
    pub const JOIN_BOSS_FIGHT: u64 = 1 << 10;
    pub const LOOT_CHEST: u64 = 1 << 11;
    pub const LOOT_BOSS: u64 = 1 << 12;
    pub const UNLOCK_DOOR: u64 = 1 << 13;

    pub const ALL_GAMEPLAY: u64 = BOOST_JOB
        | ABANDON_JOB
        | CLAIM_JOB_REWARD
        | EQUIP_ITEM
        | SET_PLAYER_SKIN
        | REMOVE_INVENTORY_ITEM
        | MOVE_PLAYER
        | JOIN_JOB
        | COMPLETE_JOB
        | CREATE_PLAYER_PROFILE
        | JOIN_BOSS_FIGHT
        | LOOT_CHEST
        | LOOT_BOSS
        | UNLOCK_DOOR;
}

pub const DEFAULT_SESSION_MINUTES: u64 = 60;
pub const DEFAULT_SESSION_MAX_TOKEN_SPEND: u64 = 200_000_000;
pub const SLOTS_PER_MINUTE: u64 = 150;
