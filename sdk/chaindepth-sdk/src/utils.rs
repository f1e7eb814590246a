use crate::core::connection::SolConnection;
use crate::core::constants::*;
use crate::error::{ChainDepthSdkError, Result};
use crate::types::Direction;
use sha2::{Digest, Sha256};
use solana_sdk::account::Account;
use solana_sdk::pubkey::Pubkey;

//=============================================================================
// PDA Derivation Helpers
//=============================================================================

/// Deterministic program-address derivation for every dungeon account.
///
/// Seeds are encoded as: UTF-8 literal prefix, season seed as 8 bytes
/// little-endian, coordinates as one signed byte reinterpreted unsigned,
/// direction as one byte. Derivation that finds no valid bump is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    program_id: Pubkey,
}

impl AddressDeriver {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// Derive an address and bump from an ordered seed list.
    pub fn derive(&self, label: &'static str, seeds: &[&[u8]]) -> Result<(Pubkey, u8)> {
        Pubkey::try_find_program_address(seeds, &self.program_id)
            .ok_or(ChainDepthSdkError::Derivation(label))
    }

    fn address(&self, label: &'static str, seeds: &[&[u8]]) -> Result<Pubkey> {
        self.derive(label, seeds).map(|(address, _)| address)
    }

    pub fn global(&self) -> Result<Pubkey> {
        self.address("global", &[GLOBAL_SEED])
    }

    pub fn player(&self, wallet: &Pubkey) -> Result<Pubkey> {
        self.address("player", &[PLAYER_SEED, wallet.as_ref()])
    }

    pub fn room(&self, season_seed: u64, x: i8, y: i8) -> Result<Pubkey> {
        self.address(
            "room",
            &[
                ROOM_SEED,
                &season_seed.to_le_bytes(),
                &[coord_byte(x)],
                &[coord_byte(y)],
            ],
        )
    }

    pub fn escrow(&self, room: &Pubkey, direction: Direction) -> Result<Pubkey> {
        self.address("escrow", &[ESCROW_SEED, room.as_ref(), &[direction.as_u8()]])
    }

    pub fn helper_stake(
        &self,
        room: &Pubkey,
        direction: Direction,
        wallet: &Pubkey,
    ) -> Result<Pubkey> {
        self.address(
            "helper_stake",
            &[
                HELPER_STAKE_SEED,
                room.as_ref(),
                &[direction.as_u8()],
                wallet.as_ref(),
            ],
        )
    }

    pub fn inventory(&self, wallet: &Pubkey) -> Result<Pubkey> {
        self.address("inventory", &[INVENTORY_SEED, wallet.as_ref()])
    }

    pub fn storage(&self, wallet: &Pubkey) -> Result<Pubkey> {
        self.address("storage", &[STORAGE_SEED, wallet.as_ref()])
    }

    pub fn profile(&self, wallet: &Pubkey) -> Result<Pubkey> {
        self.address("profile", &[PROFILE_SEED, wallet.as_ref()])
    }

    pub fn presence(&self, season_seed: u64, x: i8, y: i8, wallet: &Pubkey) -> Result<Pubkey> {
        self.address(
            "presence",
            &[
                PRESENCE_SEED,
                &season_seed.to_le_bytes(),
                &[coord_byte(x)],
                &[coord_byte(y)],
                wallet.as_ref(),
            ],
        )
    }

    pub fn loot_receipt(&self, season_seed: u64, x: i8, y: i8, wallet: &Pubkey) -> Result<Pubkey> {
        self.address(
            "loot_receipt",
            &[
                LOOT_RECEIPT_SEED,
                &season_seed.to_le_bytes(),
                &[coord_byte(x)],
                &[coord_byte(y)],
                wallet.as_ref(),
            ],
        )
    }

    pub fn boss_fight(&self, room: &Pubkey, wallet: &Pubkey) -> Result<Pubkey> {
        self.address("boss_fight", &[BOSS_FIGHT_SEED, room.as_ref(), wallet.as_ref()])
    }

    pub fn prize_pool(&self, global: &Pubkey) -> Result<Pubkey> {
        self.address("prize_pool", &[PRIZE_POOL_SEED, global.as_ref()])
    }

    pub fn session_authority(&self, wallet: &Pubkey, session_key: &Pubkey) -> Result<Pubkey> {
        self.address(
            "session_authority",
            &[SESSION_SEED, wallet.as_ref(), session_key.as_ref()],
        )
    }
}

/// Signed coordinate as the single seed byte the program uses.
pub fn coord_byte(value: i8) -> u8 {
    value as u8
}

/// Associated token account of `owner` for `mint` under the classic token program.
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Result<Pubkey> {
    Pubkey::try_find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _)| address)
    .ok_or(ChainDepthSdkError::Derivation("associated_token_account"))
}

/// Anchor 8-byte discriminator: `sha256("<namespace>:<name>")[..8]`.
pub fn anchor_discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(name.as_bytes());
    let hash = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

//=============================================================================
// Account Fetching
//=============================================================================

/// An account that exists and holds at least one byte.
pub fn account_has_data(account: Option<&Account>) -> bool {
    account.map(|a| !a.data.is_empty()).unwrap_or(false)
}

/// Fetch raw account data, `None` when the account is missing or empty.
pub async fn fetch_account_data(
    connection: &dyn SolConnection,
    address: &Pubkey,
) -> Result<Option<Vec<u8>>> {
    let account = connection
        .get_account(address)
        .await
        .map_err(|e| ChainDepthSdkError::Connection(e.to_string()))?;

    if !account_has_data(account.as_ref()) {
        return Ok(None);
    }
    Ok(account.map(|a| a.data))
}

/// Whether an initialized account lives at `address`.
pub async fn account_exists(connection: &dyn SolConnection, address: &Pubkey) -> Result<bool> {
    Ok(fetch_account_data(connection, address).await?.is_some())
}
