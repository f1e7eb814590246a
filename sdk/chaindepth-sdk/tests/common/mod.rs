#![allow(dead_code)]

use async_trait::async_trait;
use borsh::BorshSerialize;
use chaindepth_sdk::config::ClientConfig;
use chaindepth_sdk::core::connection::SolConnection;
use chaindepth_sdk::core::signer::KeypairWallet;
use chaindepth_sdk::transport::RawTransport;
use chaindepth_sdk::types::{
    ActiveJob, GlobalAccount, InventoryAccount, InventoryItem, PlayerAccount, ProgramAccount, RoomAccount,
};
use chaindepth_sdk::utils::AddressDeriver;
use chaindepth_sdk::GameClient;
use serde_json::Value;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::Transaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SEASON_SEED: u64 = 42;

//=============================================================================
// Scripted Connection
//=============================================================================

/// What the next `send_transaction` call does.
pub enum SendScript {
    /// Accept and apply account writes (`None` closes the account).
    Accept(Vec<(Pubkey, Option<Vec<u8>>)>),
    Reject(String),
}

/// In-memory `SolConnection`.
///
/// Each account holds a queue of snapshots; reads pop the front until one
/// is left, which then sticks. Sends follow the script and accept once it
/// runs out.
pub struct MockConnection {
    label: String,
    accounts: Mutex<HashMap<Pubkey, VecDeque<Option<Vec<u8>>>>>,
    sends: Mutex<VecDeque<SendScript>>,
    sent: Mutex<Vec<Transaction>>,
    blockhash_failures: AtomicUsize,
    fail_reads: AtomicBool,
    reads: AtomicUsize,
    slot: u64,
}

impl MockConnection {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            accounts: Mutex::new(HashMap::new()),
            sends: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            blockhash_failures: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
            slot: 1_000,
        }
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address, VecDeque::from(vec![Some(data)]));
    }

    /// Successive reads of `address` return these snapshots in order.
    pub fn queue_account(&self, address: Pubkey, snapshots: Vec<Option<Vec<u8>>>) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address, VecDeque::from(snapshots));
    }

    pub fn script_send(&self, script: SendScript) {
        self.sends.lock().unwrap().push_back(script);
    }

    pub fn reject_next(&self, reason: &str) {
        self.script_send(SendScript::Reject(reason.to_string()));
    }

    pub fn fail_blockhash(&self, times: usize) {
        self.blockhash_failures.store(times, Ordering::SeqCst);
    }

    pub fn set_reads_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolConnection for MockConnection {
    fn endpoint(&self) -> &str {
        &self.label
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Signature, Box<dyn std::error::Error + Send + Sync>> {
        self.sent.lock().unwrap().push(tx.clone());
        let script = self.sends.lock().unwrap().pop_front();
        match script {
            Some(SendScript::Reject(reason)) => Err(reason.into()),
            Some(SendScript::Accept(writes)) => {
                let mut accounts = self.accounts.lock().unwrap();
                for (address, data) in writes {
                    accounts.insert(address, VecDeque::from(vec![data]));
                }
                Ok(tx.signatures[0])
            },
            None => Ok(tx.signatures[0]),
        }
    }

    async fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> Result<Option<Account>, Box<dyn std::error::Error + Send + Sync>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err("connection reset by peer".into());
        }
        let mut accounts = self.accounts.lock().unwrap();
        let data = match accounts.get_mut(pubkey) {
            Some(queue) if queue.len() > 1 => queue.pop_front().flatten(),
            Some(queue) => queue.front().cloned().flatten(),
            None => None,
        };
        Ok(data.map(|data| Account {
            lamports: 1_000_000,
            data,
            owner: Pubkey::default(),
            executable: false,
            rent_epoch: 0,
        }))
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, Box<dyn std::error::Error + Send + Sync>> {
        let remaining = self.blockhash_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.blockhash_failures.store(remaining - 1, Ordering::SeqCst);
            return Err("blockhash request timed out".into());
        }
        Ok(Hash::new_unique())
    }

    async fn get_slot(&self) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.slot)
    }
}

//=============================================================================
// Raw Probe
//=============================================================================

/// Returns canned bodies and records each probed endpoint.
#[derive(Default)]
pub struct MockRawTransport {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockRawTransport {
    pub fn respond(&self, body: Result<String, String>) {
        self.responses.lock().unwrap().push_back(body);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RawTransport for MockRawTransport {
    async fn post_json(&self, endpoint: &str, _body: &Value, _timeout: Duration) -> Result<String, String> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".to_string()))
    }
}

//=============================================================================
// Account Fixtures
//=============================================================================

/// Discriminator followed by the borsh body, as the program stores it.
pub fn encode_account<T: ProgramAccount + BorshSerialize>(value: &T) -> Vec<u8> {
    let mut data = T::discriminator().to_vec();
    value.serialize(&mut data).unwrap();
    data
}

pub fn global_account() -> GlobalAccount {
    GlobalAccount {
        season_seed: SEASON_SEED,
        depth: 1,
        skr_mint: Pubkey::new_unique(),
        prize_pool: Pubkey::new_unique(),
        admin: Pubkey::new_unique(),
        end_slot: 10_000_000,
        jobs_completed: 0,
        bump: 255,
    }
}

pub fn player_at(owner: Pubkey, x: i8, y: i8) -> PlayerAccount {
    PlayerAccount {
        owner,
        current_room_x: x,
        current_room_y: y,
        active_jobs: Vec::new(),
        jobs_completed: 0,
        chests_looted: 0,
        equipped_item_id: 0,
        season_seed: SEASON_SEED,
        total_score: 0,
        current_hp: 100,
        max_hp: 100,
        in_dungeon: true,
        bump: 254,
    }
}

pub fn with_job(mut player: PlayerAccount, x: i8, y: i8, direction: u8) -> PlayerAccount {
    player.active_jobs.push(ActiveJob {
        room_x: x,
        room_y: y,
        direction,
    });
    player
}

/// Room with all walls solid and an empty center.
pub fn room_at(x: i8, y: i8) -> RoomAccount {
    RoomAccount {
        x,
        y,
        season_seed: SEASON_SEED,
        walls: [0; 4],
        door_lock_kinds: [0; 4],
        helper_counts: [0; 4],
        progress: [0; 4],
        start_slot: [0; 4],
        base_slots: [100; 4],
        total_staked: [0; 4],
        job_completed: [false; 4],
        center_type: 0,
        center_id: 0,
        boss_max_hp: 0,
        boss_current_hp: 0,
        boss_last_update_slot: 0,
        boss_total_dps: 0,
        boss_fighter_count: 0,
        boss_defeated: false,
        looted_count: 0,
        created_by: Pubkey::default(),
        bump: 253,
    }
}

pub fn inventory(owner: Pubkey, items: &[(u16, u32)]) -> InventoryAccount {
    InventoryAccount {
        owner,
        items: items
            .iter()
            .map(|&(item_id, amount)| InventoryItem {
                item_id,
                amount,
                durability: 0,
            })
            .collect(),
        bump: 252,
    }
}

//=============================================================================
// Client Harness
//=============================================================================

/// Millisecond delays and no automatic session so tests stay fast and
/// every send is explicit.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.transport.base_retry_delay_ms = 1;
    config.transport.raw_probe_timeout_secs = 1;
    config.session.auto_begin = false;
    config.reconcile.poll_interval_ms = 1;
    config.reconcile.loot_refresh_interval_ms = 1;
    config.reconcile.exit_retry_delay_ms = 1;
    config
}

pub struct Harness {
    pub client: GameClient,
    pub connection: Arc<MockConnection>,
    pub raw: Arc<MockRawTransport>,
    pub wallet: Pubkey,
    pub deriver: AddressDeriver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let keypair = Keypair::new();
        let wallet = keypair.pubkey();
        let connection = Arc::new(MockConnection::new("mock://primary"));
        let raw = Arc::new(MockRawTransport::default());
        let deriver = AddressDeriver::new(config.program_id().unwrap());
        let client = GameClient::builder(config, Arc::new(KeypairWallet::new(keypair)))
            .with_connection(connection.clone())
            .with_raw_transport(raw.clone())
            .build()
            .unwrap();
        Self {
            client,
            connection,
            raw,
            wallet,
            deriver,
        }
    }

    pub fn put_global(&self) {
        self.connection
            .set_account(self.deriver.global().unwrap(), encode_account(&global_account()));
    }

    pub fn put_player(&self, player: &PlayerAccount) {
        self.connection
            .set_account(self.deriver.player(&self.wallet).unwrap(), encode_account(player));
    }

    pub fn put_room(&self, room: &RoomAccount) {
        let address = self.deriver.room(SEASON_SEED, room.x, room.y).unwrap();
        self.connection.set_account(address, encode_account(room));
    }

    pub fn put_inventory(&self, value: &InventoryAccount) {
        self.connection
            .set_account(self.deriver.inventory(&self.wallet).unwrap(), encode_account(value));
    }

    /// Global, a player standing at (x, y) and that room.
    pub fn seed_run(&self, x: i8, y: i8) -> RoomAccount {
        self.put_global();
        self.put_player(&player_at(self.wallet, x, y));
        let room = room_at(x, y);
        self.put_room(&room);
        room
    }
}
