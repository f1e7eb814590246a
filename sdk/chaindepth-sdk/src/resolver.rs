//! Door and center interactions.
//!
//! The state machine is not stored anywhere: each request reads the current
//! room, player and boss-fight snapshots, picks an [`InteractionPlan`] with
//! the pure planning functions below and then runs it. Cross-room
//! transitions settle every active job first so no stake is left behind.

use crate::advanced::instructions::RoomRef;
use crate::basic::client::{try_outcome, GameClient};
use crate::error::{ChainDepthSdkError, FailureKind};
use crate::events::GameEvent;
use crate::extraction::{EndReason, RunBaseline};
use crate::program_error::ProgramErrorKind;
use crate::transport::TxOutcome;
use crate::types::{item_display_name, CenterType, Direction, RoomAccount, WallState};
use crate::utils::account_exists;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

/// What a door or center interaction resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionPlan {
    Move(Direction),
    ExitDungeon,
    UnlockDoor(Direction),
    JoinJob(Direction),
    TickJob(Direction),
    CompleteJob(Direction),
    ClaimJobReward(Direction),
    LootChest,
    LootBoss,
    JoinBossFight,
    TickBossFight,
    /// Nothing can be done; carries the reason shown to the player.
    Unavailable(&'static str),
}

impl InteractionPlan {
    /// Plans that act on the boss fight and so must not leave it first.
    pub fn is_boss_action(&self) -> bool {
        matches!(
            self,
            InteractionPlan::LootBoss | InteractionPlan::JoinBossFight | InteractionPlan::TickBossFight
        )
    }
}

/// Plan for the door in `direction`.
///
/// `has_job` is whether the player holds an active job on this door, `ready`
/// whether accumulated progress reached the required work and `completed`
/// whether the job was already completed on chain.
pub fn plan_door(direction: Direction, wall: WallState, has_job: bool, ready: bool, completed: bool) -> InteractionPlan {
    match wall {
        WallState::Open => InteractionPlan::Move(direction),
        WallState::EntranceStairs => InteractionPlan::ExitDungeon,
        WallState::Locked => InteractionPlan::UnlockDoor(direction),
        WallState::Solid => InteractionPlan::Unavailable("Solid wall"),
        WallState::Unknown(_) => InteractionPlan::Unavailable("Unknown wall"),
        WallState::Rubble => match (has_job, ready, completed) {
            (true, _, true) => InteractionPlan::ClaimJobReward(direction),
            (false, _, true) => InteractionPlan::Unavailable("Not an active helper"),
            (false, _, false) => InteractionPlan::JoinJob(direction),
            (true, false, false) => InteractionPlan::TickJob(direction),
            (true, true, false) => InteractionPlan::CompleteJob(direction),
        },
    }
}

pub fn plan_center(center: CenterType, boss_defeated: bool, is_fighter: bool) -> InteractionPlan {
    match center {
        CenterType::Empty => InteractionPlan::Unavailable("Nothing here"),
        CenterType::Chest => InteractionPlan::LootChest,
        CenterType::Boss if boss_defeated => InteractionPlan::LootBoss,
        CenterType::Boss if is_fighter => InteractionPlan::TickBossFight,
        CenterType::Boss => InteractionPlan::JoinBossFight,
        CenterType::Unknown(_) => InteractionPlan::Unavailable("Unknown room center"),
    }
}

/// Runs interaction plans against a [`GameClient`].
pub struct InteractionResolver<'a> {
    client: &'a GameClient,
}

impl<'a> InteractionResolver<'a> {
    pub fn new(client: &'a GameClient) -> Self {
        Self { client }
    }

    async fn current_room(&self, action: &str) -> Result<RoomAccount, TxOutcome> {
        match self.client.cache.refresh_current_room().await {
            Ok(Some(room)) => Ok(room),
            Ok(None) => Err(self.unavailable(
                action,
                FailureKind::NotInitialized,
                format!("{} failed: room not initialized", action),
            )),
            Err(error) => Err(self.client.rejected(action, error)),
        }
    }

    fn unavailable(&self, action: &str, kind: FailureKind, detail: String) -> TxOutcome {
        debug!(action, %detail, "interaction unavailable");
        self.client.events.emit(GameEvent::Error(detail.clone()));
        TxOutcome::fail(kind, detail)
    }

    //=========================================================================
    // Door
    //=========================================================================

    pub async fn plan_for_door(&self, direction: Direction) -> Result<InteractionPlan, TxOutcome> {
        const ACTION: &str = "DoorInteraction";
        let state = match self.client.run_state().await {
            Ok(state) => state,
            Err(error) => return Err(self.client.rejected(ACTION, error)),
        };
        let room = self.current_room(ACTION).await?;
        let has_job = state.player.has_active_job(
            state.player.current_room_x,
            state.player.current_room_y,
            direction.as_u8(),
        );
        Ok(plan_door(
            direction,
            room.wall(direction),
            has_job,
            room.is_job_ready(direction),
            room.job_completed[direction.index()],
        ))
    }

    pub async fn interact_with_door(&self, direction: Direction) -> TxOutcome {
        let plan = match self.plan_for_door(direction).await {
            Ok(plan) => plan,
            Err(outcome) => return outcome,
        };
        info!(%direction, ?plan, "door interaction");

        match plan {
            InteractionPlan::Move(direction) => self.move_through_door(direction).await,
            InteractionPlan::ExitDungeon => self.exit_dungeon().await,
            InteractionPlan::Unavailable(reason) => TxOutcome::fail(FailureKind::Other, reason),
            plan => {
                if let Err(outcome) = self.ensure_boss_fight_exited().await {
                    return outcome;
                }
                match plan {
                    InteractionPlan::UnlockDoor(direction) => self.unlock_door(direction).await,
                    InteractionPlan::JoinJob(direction) => self.join_job(direction).await,
                    InteractionPlan::TickJob(direction) => {
                        let outcome = self.client.tick_job(direction).await;
                        self.rejoin_if_job_lost(direction, outcome).await
                    },
                    InteractionPlan::CompleteJob(direction) => {
                        let outcome = self.client.complete_job(direction).await;
                        self.rejoin_if_job_lost(direction, outcome).await
                    },
                    InteractionPlan::ClaimJobReward(direction) => self.client.claim_job_reward(direction).await,
                    other => TxOutcome::fail(FailureKind::Other, format!("unexpected door plan {:?}", other)),
                }
            },
        }
    }

    /// Join a job. `AlreadyJoined` counts as success once the helper stake
    /// is confirmed present; a not-initialized race is retried once after a
    /// refresh.
    pub async fn join_job(&self, direction: Direction) -> TxOutcome {
        let outcome = self.client.join_job(direction).await;
        if outcome.success {
            return outcome;
        }

        if outcome.is_program_error(ProgramErrorKind::AlreadyJoined) {
            self.client.refresh_all_logged().await;
            if self.has_helper_stake(direction).await {
                info!(%direction, "already joined, helper stake present");
                return TxOutcome::already_done();
            }
            return outcome;
        }

        if outcome.is_not_initialized() {
            info!(%direction, "account not yet visible, refreshing and retrying join once");
            self.client.refresh_all_logged().await;
            return self.client.join_job(direction).await;
        }
        outcome
    }

    async fn rejoin_if_job_lost(&self, direction: Direction, outcome: TxOutcome) -> TxOutcome {
        if !outcome.is_program_error(ProgramErrorKind::NoActiveJob) {
            return outcome;
        }
        info!(%direction, "job no longer active, refreshing and rejoining");
        self.client.refresh_all_logged().await;
        self.join_job(direction).await
    }

    pub async fn unlock_door(&self, direction: Direction) -> TxOutcome {
        const ACTION: &str = "UnlockDoor";
        let state = try_outcome!(self.client, ACTION, self.client.run_state().await);
        let room = match self.current_room(ACTION).await {
            Ok(room) => room,
            Err(outcome) => return outcome,
        };
        let lock = room.lock_kind(direction);
        let key_item = lock.required_key_item();
        let missing_key = format!(
            "Missing required key: {} (for {})",
            item_display_name(key_item),
            lock.display_name()
        );

        let held = self
            .client
            .inventory_snapshot(&state.wallet)
            .await
            .map(|inventory| inventory.total_amount(key_item))
            .unwrap_or(0);
        if held == 0 {
            return self.unavailable(ACTION, FailureKind::Other, missing_key);
        }

        let outcome = self.client.unlock_door(direction).await;
        if outcome.is_program_error(ProgramErrorKind::MissingRequiredKey) {
            return outcome.with_detail(missing_key);
        }
        outcome
    }

    //=========================================================================
    // Center
    //=========================================================================

    pub async fn plan_for_center(&self) -> Result<InteractionPlan, TxOutcome> {
        let room = self.current_room("CenterInteraction").await?;
        let is_fighter = room.center() == CenterType::Boss && !room.boss_defeated && self.is_boss_fighter().await;
        Ok(plan_center(room.center(), room.boss_defeated, is_fighter))
    }

    pub async fn interact_with_center(&self) -> TxOutcome {
        let plan = match self.plan_for_center().await {
            Ok(plan) => plan,
            Err(outcome) => return outcome,
        };
        info!(?plan, "center interaction");

        if !plan.is_boss_action() {
            if let InteractionPlan::Unavailable(reason) = plan {
                return TxOutcome::fail(FailureKind::Other, reason);
            }
            if let Err(outcome) = self.ensure_boss_fight_exited().await {
                return outcome;
            }
        }

        match plan {
            InteractionPlan::LootChest => self.client.loot_chest().await,
            InteractionPlan::LootBoss => self.client.loot_boss().await,
            InteractionPlan::JoinBossFight => {
                let outcome = self.client.join_boss_fight().await;
                if outcome.is_not_initialized() {
                    self.client.refresh_all_logged().await;
                    return self.client.join_boss_fight().await;
                }
                outcome
            },
            InteractionPlan::TickBossFight => {
                let outcome = self.client.tick_boss_fight().await;
                if outcome.is_program_error(ProgramErrorKind::NotBossFighter) {
                    info!("not registered as a fighter, joining instead");
                    self.client.refresh_all_logged().await;
                    return self.client.join_boss_fight().await;
                }
                outcome
            },
            other => TxOutcome::fail(FailureKind::Other, format!("unexpected center plan {:?}", other)),
        }
    }

    //=========================================================================
    // Transitions
    //=========================================================================

    /// Settle active jobs, leave any boss fight, then move one room over.
    /// Retries the move once after a refresh on an adjacency, transport or
    /// not-initialized failure.
    pub async fn move_through_door(&self, direction: Direction) -> TxOutcome {
        const ACTION: &str = "MovePlayer";
        if let Err(outcome) = self.stop_active_jobs_before_transition().await {
            return outcome;
        }
        if let Err(outcome) = self.ensure_boss_fight_exited().await {
            return outcome;
        }

        let state = try_outcome!(self.client, ACTION, self.client.run_state().await);
        let target = direction.adjacent(state.player.current_room_x, state.player.current_room_y);
        let outcome = self.client.send_move_player(target.0, target.1).await;
        if outcome.success {
            return outcome;
        }

        let retryable = outcome.is_program_error(ProgramErrorKind::NotAdjacent)
            || outcome.is_transport_failure()
            || outcome.is_not_initialized();
        if !retryable {
            return outcome;
        }

        info!(%direction, code = ?outcome.error_code, "move failed, refreshing and retrying once");
        self.client.refresh_all_logged().await;
        let state = try_outcome!(self.client, ACTION, self.client.run_state().await);
        if (state.player.current_room_x, state.player.current_room_y) == target {
            info!(?target, "player already in target room");
            return TxOutcome::already_done();
        }
        let target = direction.adjacent(state.player.current_room_x, state.player.current_room_y);
        self.client.send_move_player(target.0, target.1).await
    }

    /// Extract through the entrance stairs and reconcile the run.
    pub async fn exit_dungeon(&self) -> TxOutcome {
        const ACTION: &str = "ExitDungeon";
        if let Err(outcome) = self.stop_active_jobs_before_transition().await {
            return outcome;
        }
        if let Err(outcome) = self.ensure_boss_fight_exited().await {
            return outcome;
        }

        let (wallet, baseline) = try_outcome!(self.client, ACTION, self.run_baseline(EndReason::Extraction).await);

        let mut outcome = self.client.send_exit_dungeon().await;
        if !outcome.success && outcome.is_transport_failure() {
            info!("exit transport failure, retrying once");
            tokio::time::sleep(self.client.config.reconcile.exit_retry_delay()).await;
            outcome = self.client.send_exit_dungeon().await;
        }
        if outcome.success {
            self.client.reconcile_run(&wallet, &baseline).await;
            self.client.refresh_all_logged().await;
        }
        outcome
    }

    /// End the run after the player died. Jobs are settled and the boss
    /// fight is left first, as for any other exit.
    pub async fn force_exit_on_death(&self) -> TxOutcome {
        const ACTION: &str = "ForceExitOnDeath";
        if let Err(outcome) = self.stop_active_jobs_before_transition().await {
            return outcome;
        }
        if let Err(outcome) = self.ensure_boss_fight_exited().await {
            return outcome;
        }

        let (wallet, baseline) = try_outcome!(self.client, ACTION, self.run_baseline(EndReason::Death).await);

        let outcome = self.client.send_force_exit_on_death().await;
        if outcome.success {
            self.client.reconcile_run(&wallet, &baseline).await;
            self.client.refresh_all_logged().await;
        }
        outcome
    }

    /// Player and inventory read from chain right before the run ends.
    /// A failed read falls back to the cached snapshot.
    async fn run_baseline(&self, end_reason: EndReason) -> crate::error::Result<(Pubkey, RunBaseline)> {
        let wallet = self.client.wallet_pubkey().ok_or(ChainDepthSdkError::NotConnected)?;
        let player = match self.client.cache.refresh_player(&wallet).await {
            Ok(player) => player,
            Err(error) => {
                warn!(%error, "player read for run baseline failed, using cache");
                self.client.cache.player().await
            },
        };
        let player = player.ok_or(ChainDepthSdkError::AccountNotFound(self.client.deriver.player(&wallet)?))?;
        let inventory = match self.client.cache.refresh_inventory(&wallet).await {
            Ok(inventory) => inventory,
            Err(error) => {
                warn!(%error, "inventory read for run baseline failed, using cache");
                self.client.cache.inventory().await
            },
        };
        Ok((wallet, RunBaseline::new(Some(&player), inventory, end_reason)))
    }

    /// Claim every completed job the player holds and abandon the rest.
    ///
    /// A job that is already gone (`NoActiveJob`) counts as settled. Any
    /// other failure stops the transition and is returned.
    pub async fn stop_active_jobs_before_transition(&self) -> Result<(), TxOutcome> {
        const ACTION: &str = "SettleJobs";
        let state = match self.client.run_state().await {
            Ok(state) => state,
            Err(error) => return Err(self.client.rejected(ACTION, error)),
        };
        if state.player.active_jobs.is_empty() {
            return Ok(());
        }
        info!(jobs = state.player.active_jobs.len(), "settling active jobs before transition");

        for job in &state.player.active_jobs {
            let Some(direction) = Direction::from_u8(job.direction) else {
                warn!(direction = job.direction, "skipping job with unknown direction");
                continue;
            };
            let job_room = RoomRef::new(state.global.season_seed, job.room_x, job.room_y);
            let completed = match job_room.address(&self.client.deriver) {
                Ok(address) => match self.client.cache.peek::<RoomAccount>(&address).await {
                    Ok(room) => room.map(|room| room.job_completed[direction.index()]).unwrap_or(false),
                    Err(error) => {
                        warn!(%error, "job room read failed, abandoning");
                        false
                    },
                },
                Err(error) => return Err(self.client.rejected(ACTION, error)),
            };

            let outcome = if completed {
                self.client.claim_job_reward_at(job_room, direction).await
            } else {
                self.client.abandon_job_at(job_room, direction).await
            };
            if !outcome.success && !outcome.is_program_error(ProgramErrorKind::NoActiveJob) {
                return Err(outcome);
            }
        }

        if let Err(error) = self.client.cache.refresh_player(&state.wallet).await {
            warn!(%error, "player refresh after settling jobs failed");
        }
        Ok(())
    }

    /// Leave the boss fight in the current room if the player is in one.
    pub async fn ensure_boss_fight_exited(&self) -> Result<(), TxOutcome> {
        if !self.is_boss_fighter().await {
            return Ok(());
        }
        info!("leaving active boss fight first");
        let outcome = self.client.leave_boss_fight().await;
        if outcome.success || outcome.is_program_error(ProgramErrorKind::NotBossFighter) {
            return Ok(());
        }
        Err(outcome)
    }

    pub async fn has_helper_stake(&self, direction: Direction) -> bool {
        let Ok(state) = self.client.run_state().await else {
            return false;
        };
        let stake = state
            .current_room()
            .address(&self.client.deriver)
            .and_then(|room| self.client.deriver.helper_stake(&room, direction, &state.wallet));
        match stake {
            Ok(address) => match account_exists(self.client.connection.as_ref(), &address).await {
                Ok(exists) => exists,
                Err(error) => {
                    warn!(%error, "helper stake lookup failed");
                    false
                },
            },
            Err(error) => {
                warn!(%error, "helper stake derivation failed");
                false
            },
        }
    }

    /// Whether the player holds an active fighter record in the current room.
    pub async fn is_boss_fighter(&self) -> bool {
        let Some(wallet) = self.client.wallet_pubkey() else {
            return false;
        };
        match self.client.cache.refresh_boss_fight(&wallet).await {
            Ok(fight) => fight.is_some_and(|fight| fight.is_active),
            Err(error) => {
                warn!(%error, "boss fight read failed");
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLS: [WallState; 6] = [
        WallState::Solid,
        WallState::Rubble,
        WallState::Open,
        WallState::Locked,
        WallState::EntranceStairs,
        WallState::Unknown(9),
    ];

    #[test]
    fn every_door_combination_has_a_plan() {
        for direction in Direction::ALL {
            for wall in WALLS {
                for has_job in [false, true] {
                    for ready in [false, true] {
                        for completed in [false, true] {
                            let plan = plan_door(direction, wall, has_job, ready, completed);
                            let expected = match wall {
                                WallState::Open => InteractionPlan::Move(direction),
                                WallState::EntranceStairs => InteractionPlan::ExitDungeon,
                                WallState::Locked => InteractionPlan::UnlockDoor(direction),
                                WallState::Solid | WallState::Unknown(_) => {
                                    assert!(matches!(plan, InteractionPlan::Unavailable(_)));
                                    continue;
                                },
                                WallState::Rubble if completed && has_job => InteractionPlan::ClaimJobReward(direction),
                                WallState::Rubble if completed => InteractionPlan::Unavailable("Not an active helper"),
                                WallState::Rubble if !has_job => InteractionPlan::JoinJob(direction),
                                WallState::Rubble if ready => InteractionPlan::CompleteJob(direction),
                                WallState::Rubble => InteractionPlan::TickJob(direction),
                            };
                            assert_eq!(plan, expected, "{:?} job={} ready={} done={}", wall, has_job, ready, completed);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn center_plans() {
        assert_eq!(plan_center(CenterType::Chest, false, false), InteractionPlan::LootChest);
        assert_eq!(plan_center(CenterType::Boss, false, false), InteractionPlan::JoinBossFight);
        assert_eq!(plan_center(CenterType::Boss, false, true), InteractionPlan::TickBossFight);
        assert_eq!(plan_center(CenterType::Boss, true, true), InteractionPlan::LootBoss);
        assert_eq!(plan_center(CenterType::Boss, true, false), InteractionPlan::LootBoss);
        assert!(matches!(plan_center(CenterType::Empty, false, false), InteractionPlan::Unavailable(_)));
    }

    #[test]
    fn boss_actions_do_not_leave_the_fight() {
        assert!(InteractionPlan::TickBossFight.is_boss_action());
        assert!(InteractionPlan::LootBoss.is_boss_action());
        assert!(!InteractionPlan::LootChest.is_boss_action());
        assert!(!InteractionPlan::JoinJob(Direction::North).is_boss_action());
    }
}
