use crate::core::constants::{START_X, START_Y, TOKEN_PROGRAM_ID};
use crate::error::Result;
use crate::session::SigningContext;
use crate::types::{Direction, GlobalAccount};
use crate::utils::{anchor_discriminator, associated_token_address, AddressDeriver};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

/// Every remote operation the client issues, with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameInstruction {
    InitPlayer,
    EnterDungeon,
    MovePlayer { new_x: i8, new_y: i8 },
    JoinJob { direction: u8 },
    JoinJobWithSession { direction: u8 },
    TickJob { direction: u8 },
    BoostJob { direction: u8, boost_amount: u64 },
    CompleteJob { direction: u8 },
    AbandonJob { direction: u8 },
    ClaimJobReward { direction: u8 },
    UnlockDoor { direction: u8 },
    LootChest,
    LootBoss,
    JoinBossFight,
    TickBossFight,
    LeaveBossFight,
    ExitDungeon,
    ForceExitOnDeath,
    EquipItem { item_id: u16 },
    SetPlayerSkin { skin_id: u16 },
    CreatePlayerProfile { skin_id: u16, display_name: String },
    BeginSession {
        expires_at_slot: u64,
        expires_at_unix_timestamp: i64,
        instruction_allowlist: u64,
        max_token_spend: u64,
    },
    EndSession,
    ResetMyPlayer,
}

impl GameInstruction {
    /// Program-side handler name
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitPlayer => "init_player",
            Self::EnterDungeon => "enter_dungeon",
            Self::MovePlayer { .. } => "move_player",
            Self::JoinJob { .. } => "join_job",
            Self::JoinJobWithSession { .. } => "join_job_with_session",
            Self::TickJob { .. } => "tick_job",
            Self::BoostJob { .. } => "boost_job",
            Self::CompleteJob { .. } => "complete_job",
            Self::AbandonJob { .. } => "abandon_job",
            Self::ClaimJobReward { .. } => "claim_job_reward",
            Self::UnlockDoor { .. } => "unlock_door",
            Self::LootChest => "loot_chest",
            Self::LootBoss => "loot_boss",
            Self::JoinBossFight => "join_boss_fight",
            Self::TickBossFight => "tick_boss_fight",
            Self::LeaveBossFight => "leave_boss_fight",
            Self::ExitDungeon => "exit_dungeon",
            Self::ForceExitOnDeath => "force_exit_on_death",
            Self::EquipItem { .. } => "equip_item",
            Self::SetPlayerSkin { .. } => "set_player_skin",
            Self::CreatePlayerProfile { .. } => "create_player_profile",
            Self::BeginSession { .. } => "begin_session",
            Self::EndSession => "end_session",
            Self::ResetMyPlayer => "reset_my_player",
        }
    }

    /// Borsh-encoded argument list, in declaration order.
    pub fn encode_args(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::MovePlayer { new_x, new_y } => borsh::to_vec(&(*new_x, *new_y))?,
            Self::JoinJob { direction }
            | Self::JoinJobWithSession { direction }
            | Self::TickJob { direction }
            | Self::CompleteJob { direction }
            | Self::AbandonJob { direction }
            | Self::ClaimJobReward { direction }
            | Self::UnlockDoor { direction } => borsh::to_vec(direction)?,
            Self::BoostJob {
                direction,
                boost_amount,
            } => borsh::to_vec(&(*direction, *boost_amount))?,
            Self::EquipItem { item_id } => borsh::to_vec(item_id)?,
            Self::SetPlayerSkin { skin_id } => borsh::to_vec(skin_id)?,
            Self::CreatePlayerProfile {
                skin_id,
                display_name,
            } => borsh::to_vec(&(*skin_id, display_name.clone()))?,
            Self::BeginSession {
                expires_at_slot,
                expires_at_unix_timestamp,
                instruction_allowlist,
                max_token_spend,
            } => borsh::to_vec(&(
                *expires_at_slot,
                *expires_at_unix_timestamp,
                *instruction_allowlist,
                *max_token_spend,
            ))?,
            _ => Vec::new(),
        };
        Ok(bytes)
    }
}

/// Turns a named operation plus its accounts into an unsigned instruction.
///
/// The orchestration layer only talks to this trait, so the wire encoding can
/// be swapped (or faked in tests) without touching it.
pub trait InstructionBuilder: Send + Sync {
    fn build(
        &self,
        program_id: &Pubkey,
        instruction: &GameInstruction,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction>;
}

/// Anchor wire format: `sha256("global:<name>")[..8]` followed by borsh args.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorInstructionBuilder;

impl InstructionBuilder for AnchorInstructionBuilder {
    fn build(
        &self,
        program_id: &Pubkey,
        instruction: &GameInstruction,
        accounts: Vec<AccountMeta>,
    ) -> Result<Instruction> {
        let mut data = anchor_discriminator("global", instruction.name()).to_vec();
        data.extend(instruction.encode_args()?);
        Ok(Instruction {
            program_id: *program_id,
            accounts,
            data,
        })
    }
}

//=============================================================================
// Account Lists
//=============================================================================

/// Anchor encodes an absent optional account as the program id itself.
fn optional_account(program_id: &Pubkey, account: Option<Pubkey>) -> AccountMeta {
    match account {
        Some(address) => AccountMeta::new(address, false),
        None => AccountMeta::new_readonly(*program_id, false),
    }
}

fn signer_accounts(ctx: &SigningContext) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(ctx.authority, true),
        AccountMeta::new_readonly(ctx.player, false),
    ]
}

/// Room coordinates within a season.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomRef {
    pub season_seed: u64,
    pub x: i8,
    pub y: i8,
}

impl RoomRef {
    pub fn new(season_seed: u64, x: i8, y: i8) -> Self {
        Self { season_seed, x, y }
    }

    pub fn address(&self, deriver: &AddressDeriver) -> Result<Pubkey> {
        deriver.room(self.season_seed, self.x, self.y)
    }

    pub fn presence(&self, deriver: &AddressDeriver, wallet: &Pubkey) -> Result<Pubkey> {
        deriver.presence(self.season_seed, self.x, self.y, wallet)
    }

    pub fn adjacent(&self, direction: Direction) -> Self {
        let (x, y) = direction.adjacent(self.x, self.y);
        Self { x, y, ..*self }
    }
}

pub fn init_player(deriver: &AddressDeriver, wallet: &Pubkey, season_seed: u64) -> Result<Vec<AccountMeta>> {
    let start = RoomRef::new(season_seed, START_X, START_Y);
    Ok(vec![
        AccountMeta::new(*wallet, true),
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(wallet)?, false),
        AccountMeta::new(deriver.profile(wallet)?, false),
        AccountMeta::new(start.presence(deriver, wallet)?, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ])
}

pub fn enter_dungeon(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    season_seed: u64,
) -> Result<Vec<AccountMeta>> {
    let start = RoomRef::new(season_seed, START_X, START_Y);
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(deriver.profile(&ctx.player)?, false),
        AccountMeta::new(start.address(deriver)?, false),
        AccountMeta::new(start.presence(deriver, &ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn move_player(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    current: RoomRef,
    target: RoomRef,
) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new_readonly(deriver.profile(&ctx.player)?, false),
        AccountMeta::new(current.address(deriver)?, false),
        AccountMeta::new(target.address(deriver)?, false),
        AccountMeta::new(current.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(target.presence(deriver, &ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

/// `JoinJob` when the wallet signs, `JoinJobWithSession` when a session does.
pub fn join_job(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    global: &GlobalAccount,
    room: RoomRef,
    direction: Direction,
) -> Result<(GameInstruction, Vec<AccountMeta>)> {
    let room_address = room.address(deriver)?;
    let job_accounts = [
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room_address, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.escrow(&room_address, direction)?, false),
        AccountMeta::new(deriver.helper_stake(&room_address, direction, &ctx.player)?, false),
        AccountMeta::new(associated_token_address(&ctx.player, &global.skr_mint)?, false),
        AccountMeta::new_readonly(global.skr_mint, false),
    ];

    if ctx.uses_session {
        let mut accounts = signer_accounts(ctx);
        accounts.extend(job_accounts);
        accounts.extend([
            optional_account(deriver.program_id(), ctx.session_authority),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ]);
        let ix = GameInstruction::JoinJobWithSession {
            direction: direction.as_u8(),
        };
        return Ok((ix, accounts));
    }

    let mut accounts = vec![AccountMeta::new(ctx.player, true)];
    accounts.extend(job_accounts);
    accounts.extend([
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    let ix = GameInstruction::JoinJob {
        direction: direction.as_u8(),
    };
    Ok((ix, accounts))
}

pub fn tick_job(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    Ok(vec![
        AccountMeta::new(ctx.authority, true),
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(room.address(deriver)?, false),
    ])
}

pub fn boost_job(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    global: &GlobalAccount,
    room: RoomRef,
) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(room.address(deriver)?, false),
        AccountMeta::new(global.prize_pool, false),
        AccountMeta::new(associated_token_address(&ctx.player, &global.skr_mint)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
    ]);
    Ok(accounts)
}

pub fn complete_job(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    global: &GlobalAccount,
    room: RoomRef,
    direction: Direction,
) -> Result<Vec<AccountMeta>> {
    let room_address = room.address(deriver)?;
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room_address, false),
        AccountMeta::new(room.adjacent(direction).address(deriver)?, false),
        AccountMeta::new(deriver.escrow(&room_address, direction)?, false),
        AccountMeta::new(deriver.helper_stake(&room_address, direction, &ctx.player)?, false),
        AccountMeta::new(global.prize_pool, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

/// Shared by `AbandonJob` and `ClaimJobReward`. `job_room` is where the job
/// lives, `current` is where the player stands (presence is updated there).
pub fn settle_job(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    global: &GlobalAccount,
    job_room: RoomRef,
    current: RoomRef,
    direction: Direction,
) -> Result<Vec<AccountMeta>> {
    let room_address = job_room.address(deriver)?;
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room_address, false),
        AccountMeta::new(current.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.escrow(&room_address, direction)?, false),
        AccountMeta::new(deriver.helper_stake(&room_address, direction, &ctx.player)?, false),
        AccountMeta::new(global.prize_pool, false),
        AccountMeta::new(associated_token_address(&ctx.player, &global.skr_mint)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
    ]);
    Ok(accounts)
}

pub fn unlock_door(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    room: RoomRef,
    direction: Direction,
) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new_readonly(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room.address(deriver)?, false),
        AccountMeta::new(room.adjacent(direction).address(deriver)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn loot_chest(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room.address(deriver)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        AccountMeta::new(
            deriver.loot_receipt(room.season_seed, room.x, room.y, &ctx.player)?,
            false,
        ),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn loot_boss(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let room_address = room.address(deriver)?;
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room_address, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.boss_fight(&room_address, &ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        AccountMeta::new(
            deriver.loot_receipt(room.season_seed, room.x, room.y, &ctx.player)?,
            false,
        ),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

/// Shared by `JoinBossFight`, `TickBossFight` and `LeaveBossFight`.
pub fn boss_fight(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let room_address = room.address(deriver)?;
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new_readonly(deriver.profile(&ctx.player)?, false),
        AccountMeta::new(room_address, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.boss_fight(&room_address, &ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn exit_dungeon(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room.address(deriver)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        AccountMeta::new(deriver.storage(&ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn force_exit_on_death(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    room: RoomRef,
) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new(room.address(deriver)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

pub fn equip_item(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.player(&ctx.player)?, false),
        AccountMeta::new_readonly(deriver.inventory(&ctx.player)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
    ]);
    Ok(accounts)
}

pub fn set_player_skin(deriver: &AddressDeriver, ctx: &SigningContext, room: RoomRef) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new(deriver.profile(&ctx.player)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
    ]);
    Ok(accounts)
}

pub fn create_player_profile(
    deriver: &AddressDeriver,
    ctx: &SigningContext,
    room: RoomRef,
) -> Result<Vec<AccountMeta>> {
    let mut accounts = signer_accounts(ctx);
    accounts.extend([
        AccountMeta::new_readonly(deriver.player(&ctx.player)?, false),
        AccountMeta::new(deriver.profile(&ctx.player)?, false),
        AccountMeta::new(deriver.inventory(&ctx.player)?, false),
        AccountMeta::new(room.presence(deriver, &ctx.player)?, false),
        optional_account(deriver.program_id(), ctx.session_authority),
        AccountMeta::new_readonly(system_program::id(), false),
    ]);
    Ok(accounts)
}

/// Co-signed by the wallet and the fresh session key.
pub fn begin_session(
    deriver: &AddressDeriver,
    wallet: &Pubkey,
    session_key: &Pubkey,
    skr_mint: &Pubkey,
) -> Result<Vec<AccountMeta>> {
    Ok(vec![
        AccountMeta::new(*wallet, true),
        AccountMeta::new_readonly(*session_key, true),
        AccountMeta::new_readonly(deriver.player(wallet)?, false),
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(associated_token_address(wallet, skr_mint)?, false),
        AccountMeta::new(deriver.session_authority(wallet, session_key)?, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ])
}

pub fn end_session(
    deriver: &AddressDeriver,
    wallet: &Pubkey,
    session_key: &Pubkey,
    skr_mint: &Pubkey,
) -> Result<Vec<AccountMeta>> {
    Ok(vec![
        AccountMeta::new(*wallet, true),
        AccountMeta::new_readonly(*session_key, false),
        AccountMeta::new(deriver.session_authority(wallet, session_key)?, false),
        AccountMeta::new_readonly(deriver.global()?, false),
        AccountMeta::new(associated_token_address(wallet, skr_mint)?, false),
        AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
    ])
}

/// `existing` lists which of profile, inventory and storage are initialized;
/// only those are appended, writable, so the program can close them.
pub fn reset_my_player(
    deriver: &AddressDeriver,
    wallet: &Pubkey,
    existing: &[Pubkey],
) -> Result<Vec<AccountMeta>> {
    let mut accounts = vec![
        AccountMeta::new(*wallet, true),
        AccountMeta::new(deriver.player(wallet)?, false),
        AccountMeta::new_readonly(system_program::id(), false),
    ];
    accounts.extend(existing.iter().map(|address| AccountMeta::new(*address, false)));
    Ok(accounts)
}
