//! One method per remote operation.
//!
//! Each method submits exactly one instruction through the executor and
//! refreshes the snapshots it touched on success. Multi-step flows (door and
//! center interactions, run transitions) live in the resolver.

use crate::advanced::instructions::{self, GameInstruction, RoomRef};
use crate::basic::client::{try_outcome, GameClient};
use crate::error::{ChainDepthSdkError, Result};
use crate::events::GameEvent;
use crate::extraction::{inventory_gains, ItemDelta};
use crate::session::{SessionLease, SigningContext};
use crate::transport::TxOutcome;
use crate::types::{Direction, InventoryAccount};
use crate::utils::account_exists;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::{debug, info, warn};

impl GameClient {
    fn instruction(&self, ix: &GameInstruction, accounts: Vec<AccountMeta>) -> Result<Instruction> {
        self.builder.build(self.deriver.program_id(), ix, accounts)
    }

    /// Submit `ix` with the accounts `accounts` builds for each signer.
    async fn submit_one<A>(
        &self,
        action: &str,
        ix: GameInstruction,
        ensure_session: bool,
        allow_session: bool,
        accounts: A,
    ) -> TxOutcome
    where
        A: Fn(&SigningContext) -> Result<Vec<AccountMeta>> + Send + Sync,
    {
        self.executor
            .execute(
                action,
                |ctx| Ok(vec![self.instruction(&ix, accounts(ctx)?)?]),
                ensure_session,
                allow_session,
            )
            .await
    }

    async fn refresh_logged<T, F>(&self, what: &str, refresh: F)
    where
        F: std::future::Future<Output = Result<T>>,
    {
        if let Err(error) = refresh.await {
            warn!(what, %error, "refresh after action failed");
        }
    }

    //=========================================================================
    // Player lifecycle
    //=========================================================================

    pub async fn init_player(&self) -> TxOutcome {
        const ACTION: &str = "InitPlayer";
        let wallet = try_outcome!(self, ACTION, self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected));
        let season_seed = try_outcome!(self, ACTION, self.cache.season_seed().await);

        let outcome = self
            .submit_one(ACTION, GameInstruction::InitPlayer, false, false, |_| {
                instructions::init_player(&self.deriver, &wallet, season_seed)
            })
            .await;
        if outcome.success {
            self.refresh_all_logged().await;
        }
        outcome
    }

    pub async fn create_player_profile(&self, skin_id: u16, display_name: &str) -> TxOutcome {
        const ACTION: &str = "CreatePlayerProfile";
        let wallet = try_outcome!(self, ACTION, self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected));
        let season_seed = try_outcome!(self, ACTION, self.cache.season_seed().await);
        let (x, y) = self.cache.player_position().await;
        let room = RoomRef::new(season_seed, x, y);

        let ix = GameInstruction::CreatePlayerProfile {
            skin_id,
            display_name: display_name.to_string(),
        };
        let outcome = self
            .submit_one(ACTION, ix, true, true, |ctx| {
                instructions::create_player_profile(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("profile", self.cache.refresh_profile(&wallet)).await;
            self.refresh_logged("inventory", self.cache.refresh_inventory(&wallet)).await;
        }
        outcome
    }

    /// Enter the start room when the player exists but is outside the dungeon.
    pub async fn enter_dungeon(&self) -> TxOutcome {
        const ACTION: &str = "EnterDungeon";
        let season_seed = try_outcome!(self, ACTION, self.cache.season_seed().await);

        let outcome = self
            .submit_one(ACTION, GameInstruction::EnterDungeon, true, true, |ctx| {
                instructions::enter_dungeon(&self.deriver, ctx, season_seed)
            })
            .await;
        if outcome.success {
            self.refresh_all_logged().await;
        }
        outcome
    }

    /// Close the player's accounts. Profile, inventory and storage are only
    /// passed when they exist.
    pub async fn reset_my_player(&self) -> TxOutcome {
        const ACTION: &str = "ResetMyPlayer";
        let wallet = try_outcome!(self, ACTION, self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected));

        let candidates = [
            try_outcome!(self, ACTION, self.deriver.profile(&wallet)),
            try_outcome!(self, ACTION, self.deriver.inventory(&wallet)),
            try_outcome!(self, ACTION, self.deriver.storage(&wallet)),
        ];
        let mut existing = Vec::new();
        for address in candidates {
            if try_outcome!(self, ACTION, account_exists(self.connection.as_ref(), &address).await) {
                existing.push(address);
            }
        }
        debug!(existing = existing.len(), "reset accounts");

        let outcome = self
            .submit_one(ACTION, GameInstruction::ResetMyPlayer, false, false, |_| {
                instructions::reset_my_player(&self.deriver, &wallet, &existing)
            })
            .await;
        if outcome.success {
            self.cache.clear().await;
            self.refresh_all_logged().await;
        }
        outcome
    }

    //=========================================================================
    // Movement and run end
    //=========================================================================

    /// Single `MovePlayer` transaction. Does not settle jobs or leave boss
    /// fights first; see `InteractionResolver::move_through_door`.
    pub async fn send_move_player(&self, new_x: i8, new_y: i8) -> TxOutcome {
        const ACTION: &str = "MovePlayer";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let current = state.current_room();
        let target = RoomRef::new(current.season_seed, new_x, new_y);
        info!(from = ?(current.x, current.y), to = ?(new_x, new_y), "moving player");

        let outcome = self
            .submit_one(ACTION, GameInstruction::MovePlayer { new_x, new_y }, true, true, |ctx| {
                instructions::move_player(&self.deriver, ctx, current, target)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
            self.refresh_logged("presence", self.cache.refresh_presence(&state.wallet)).await;
        }
        outcome
    }

    /// Single `ExitDungeon` transaction, always wallet-signed.
    pub async fn send_exit_dungeon(&self) -> TxOutcome {
        const ACTION: &str = "ExitDungeon";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        self.submit_one(ACTION, GameInstruction::ExitDungeon, false, false, |ctx| {
            instructions::exit_dungeon(&self.deriver, ctx, room)
        })
        .await
    }

    /// Single `ForceExitOnDeath` transaction, always wallet-signed.
    pub async fn send_force_exit_on_death(&self) -> TxOutcome {
        const ACTION: &str = "ForceExitOnDeath";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        self.submit_one(ACTION, GameInstruction::ForceExitOnDeath, false, false, |ctx| {
            instructions::force_exit_on_death(&self.deriver, ctx, room)
        })
        .await
    }

    //=========================================================================
    // Door jobs
    //=========================================================================

    /// `JoinJob`, or `JoinJobWithSession` when a session signs.
    pub async fn join_job(&self, direction: Direction) -> TxOutcome {
        const ACTION: &str = "JoinJob";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let global = state.global.clone();

        let outcome = self
            .executor
            .execute(
                ACTION,
                |ctx| {
                    let (ix, accounts) = instructions::join_job(&self.deriver, ctx, &global, room, direction)?;
                    Ok(vec![self.instruction(&ix, accounts)?])
                },
                true,
                true,
            )
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
        }
        outcome
    }

    pub async fn tick_job(&self, direction: Direction) -> TxOutcome {
        let state = try_outcome!(self, "TickJob", self.run_state().await);
        self.tick_job_at(state.current_room(), direction).await
    }

    /// Ticking is permissionless, so `room` need not be the player's room.
    pub async fn tick_job_at(&self, room: RoomRef, direction: Direction) -> TxOutcome {
        let ix = GameInstruction::TickJob {
            direction: direction.as_u8(),
        };
        let outcome = self
            .submit_one("TickJob", ix, true, true, |ctx| {
                instructions::tick_job(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
        }
        outcome
    }

    pub async fn boost_job(&self, direction: Direction, boost_amount: u64) -> TxOutcome {
        const ACTION: &str = "BoostJob";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let global = state.global.clone();
        let ix = GameInstruction::BoostJob {
            direction: direction.as_u8(),
            boost_amount,
        };

        let outcome = self
            .submit_one(ACTION, ix, true, true, |ctx| {
                instructions::boost_job(&self.deriver, ctx, &global, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
        }
        outcome
    }

    pub async fn complete_job(&self, direction: Direction) -> TxOutcome {
        const ACTION: &str = "CompleteJob";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let global = state.global.clone();
        let ix = GameInstruction::CompleteJob {
            direction: direction.as_u8(),
        };

        let outcome = self
            .submit_one(ACTION, ix, true, true, |ctx| {
                instructions::complete_job(&self.deriver, ctx, &global, room, direction)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
        }
        outcome
    }

    pub async fn abandon_job(&self, direction: Direction) -> TxOutcome {
        let state = try_outcome!(self, "AbandonJob", self.run_state().await);
        self.abandon_job_at(state.current_room(), direction).await
    }

    /// Abandon a job held in `job_room`, which may differ from the current room.
    pub async fn abandon_job_at(&self, job_room: RoomRef, direction: Direction) -> TxOutcome {
        let ix = GameInstruction::AbandonJob {
            direction: direction.as_u8(),
        };
        self.settle_job("AbandonJob", ix, job_room, direction).await
    }

    pub async fn claim_job_reward(&self, direction: Direction) -> TxOutcome {
        let state = try_outcome!(self, "ClaimJobReward", self.run_state().await);
        self.claim_job_reward_at(state.current_room(), direction).await
    }

    pub async fn claim_job_reward_at(&self, job_room: RoomRef, direction: Direction) -> TxOutcome {
        let ix = GameInstruction::ClaimJobReward {
            direction: direction.as_u8(),
        };
        self.settle_job("ClaimJobReward", ix, job_room, direction).await
    }

    async fn settle_job(
        &self,
        action: &str,
        ix: GameInstruction,
        job_room: RoomRef,
        direction: Direction,
    ) -> TxOutcome {
        let state = try_outcome!(self, action, self.run_state().await);
        let current = state.current_room();
        let global = state.global.clone();

        let outcome = self
            .submit_one(action, ix, true, true, |ctx| {
                instructions::settle_job(&self.deriver, ctx, &global, job_room, current, direction)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
        }
        outcome
    }

    pub async fn unlock_door(&self, direction: Direction) -> TxOutcome {
        const ACTION: &str = "UnlockDoor";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let ix = GameInstruction::UnlockDoor {
            direction: direction.as_u8(),
        };

        let outcome = self
            .submit_one(ACTION, ix, true, true, |ctx| {
                instructions::unlock_door(&self.deriver, ctx, room, direction)
            })
            .await;
        if outcome.success {
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
            self.refresh_logged("inventory", self.cache.refresh_inventory(&state.wallet)).await;
        }
        outcome
    }

    //=========================================================================
    // Room center
    //=========================================================================

    pub async fn loot_chest(&self) -> TxOutcome {
        const ACTION: &str = "LootChest";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let before = self.inventory_snapshot(&state.wallet).await;

        let outcome = self
            .submit_one(ACTION, GameInstruction::LootChest, true, true, |ctx| {
                instructions::loot_chest(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
            self.publish_loot_gain(&state.wallet, before).await;
        }
        outcome
    }

    pub async fn loot_boss(&self) -> TxOutcome {
        const ACTION: &str = "LootBoss";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();
        let before = self.inventory_snapshot(&state.wallet).await;

        let outcome = self
            .submit_one(ACTION, GameInstruction::LootBoss, true, true, |ctx| {
                instructions::loot_boss(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
            self.publish_loot_gain(&state.wallet, before).await;
        }
        outcome
    }

    pub async fn join_boss_fight(&self) -> TxOutcome {
        self.boss_fight_action("JoinBossFight", GameInstruction::JoinBossFight).await
    }

    pub async fn tick_boss_fight(&self) -> TxOutcome {
        self.boss_fight_action("TickBossFight", GameInstruction::TickBossFight).await
    }

    pub async fn leave_boss_fight(&self) -> TxOutcome {
        self.boss_fight_action("LeaveBossFight", GameInstruction::LeaveBossFight).await
    }

    async fn boss_fight_action(&self, action: &str, ix: GameInstruction) -> TxOutcome {
        let state = try_outcome!(self, action, self.run_state().await);
        let room = state.current_room();

        let outcome = self
            .submit_one(action, ix, true, true, |ctx| {
                instructions::boss_fight(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
            self.refresh_logged("room", self.cache.refresh_current_room()).await;
            self.refresh_logged("boss fight", self.cache.refresh_boss_fight(&state.wallet)).await;
        }
        outcome
    }

    //=========================================================================
    // Cosmetics and equipment
    //=========================================================================

    pub async fn equip_item(&self, item_id: u16) -> TxOutcome {
        const ACTION: &str = "EquipItem";
        let state = try_outcome!(self, ACTION, self.run_state().await);
        let room = state.current_room();

        let outcome = self
            .submit_one(ACTION, GameInstruction::EquipItem { item_id }, true, true, |ctx| {
                instructions::equip_item(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("player", self.cache.refresh_player(&state.wallet)).await;
        }
        outcome
    }

    pub async fn set_player_skin(&self, skin_id: u16) -> TxOutcome {
        const ACTION: &str = "SetPlayerSkin";
        let wallet = try_outcome!(self, ACTION, self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected));
        let season_seed = try_outcome!(self, ACTION, self.cache.season_seed().await);
        let (x, y) = self.cache.player_position().await;
        let room = RoomRef::new(season_seed, x, y);

        let outcome = self
            .submit_one(ACTION, GameInstruction::SetPlayerSkin { skin_id }, true, true, |ctx| {
                instructions::set_player_skin(&self.deriver, ctx, room)
            })
            .await;
        if outcome.success {
            self.refresh_logged("profile", self.cache.refresh_profile(&wallet)).await;
        }
        outcome
    }

    //=========================================================================
    // Sessions
    //=========================================================================

    pub async fn begin_session(
        &self,
        capabilities: u64,
        spend_cap: u64,
        duration_minutes: u64,
    ) -> Result<SessionLease> {
        self.session.begin(capabilities, spend_cap, duration_minutes).await
    }

    pub async fn end_session(&self) -> Result<Option<Signature>> {
        self.session.end().await
    }

    //=========================================================================
    // Loot diff
    //=========================================================================

    pub(crate) async fn inventory_snapshot(&self, wallet: &Pubkey) -> Option<InventoryAccount> {
        if let Some(inventory) = self.cache.inventory().await {
            return Some(inventory);
        }
        self.cache.refresh_inventory(wallet).await.ok().flatten()
    }

    /// Refetch the inventory until it shows a gain over `before`, then
    /// publish `ItemsGained`. Empty when nothing showed up in time.
    async fn publish_loot_gain(&self, wallet: &Pubkey, before: Option<InventoryAccount>) -> Vec<ItemDelta> {
        let settings = &self.config.reconcile;
        let attempts = settings.loot_refresh_attempts.max(1);
        for attempt in 1..=attempts {
            match self.cache.refresh_inventory(wallet).await {
                Ok(after) => {
                    let gains = inventory_gains(before.as_ref(), after.as_ref());
                    if !gains.is_empty() {
                        info!(attempt, items = gains.len(), "loot gained");
                        self.events.emit(GameEvent::ItemsGained(gains.clone()));
                        return gains;
                    }
                },
                Err(error) => warn!(attempt, %error, "inventory refresh failed after loot"),
            }
            if attempt < attempts {
                tokio::time::sleep(settings.loot_refresh_interval()).await;
            }
        }
        debug!("no loot gain observed");
        Vec::new()
    }
}
