use crate::advanced::instructions::{AnchorInstructionBuilder, InstructionBuilder, RoomRef};
use crate::cache::AccountCache;
use crate::config::ClientConfig;
use crate::core::connection::{RpcConnection, SolConnection};
use crate::core::signer::WalletProvider;
use crate::error::{ChainDepthSdkError, FailureKind, Result};
use crate::events::{EventBus, GameEvent};
use crate::executor::TransactionExecutor;
use crate::extraction::{ExtractionReconciler, ExtractionSummary, ExtractionSummaryStore, RunBaseline};
use crate::resolver::InteractionResolver;
use crate::session::SessionDelegate;
use crate::transport::{HttpRawTransport, RawTransport, TransportPipeline, TxOutcome};
use crate::types::{GlobalAccount, PlayerAccount};
use crate::utils::AddressDeriver;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Unwrap a pre-submission `Result`, turning the error into a failed outcome.
macro_rules! try_outcome {
    ($client:expr, $action:expr, $value:expr) => {
        match $value {
            Ok(value) => value,
            Err(error) => return $client.rejected($action, error),
        }
    };
}
pub(crate) use try_outcome;

/// The dungeon client: one per connected player, constructed once and
/// shared by reference.
pub struct GameClient {
    pub(crate) config: ClientConfig,
    pub(crate) skr_mint: Pubkey,
    pub(crate) deriver: AddressDeriver,
    pub(crate) wallet: Arc<dyn WalletProvider>,
    pub(crate) connection: Arc<dyn SolConnection>,
    pub(crate) builder: Arc<dyn InstructionBuilder>,
    pub(crate) events: EventBus,
    pub(crate) cache: Arc<AccountCache>,
    pub(crate) session: Arc<SessionDelegate>,
    pub(crate) executor: TransactionExecutor,
    pub(crate) reconciler: ExtractionReconciler,
    pub(crate) summaries: ExtractionSummaryStore,
    cancel: watch::Sender<bool>,
}

/// Snapshot of what an action needs to build its accounts.
#[derive(Debug, Clone)]
pub(crate) struct RunState {
    pub wallet: Pubkey,
    pub global: GlobalAccount,
    pub player: PlayerAccount,
}

impl RunState {
    pub fn current_room(&self) -> RoomRef {
        RoomRef::new(
            self.global.season_seed,
            self.player.current_room_x,
            self.player.current_room_y,
        )
    }
}

impl GameClient {
    pub fn builder(config: ClientConfig, wallet: Arc<dyn WalletProvider>) -> GameClientBuilder {
        GameClientBuilder::new(config, wallet)
    }

    /// Client over real RPC endpoints: primary, fallback, then the wallet's own.
    pub fn connect(config: ClientConfig, wallet: Arc<dyn WalletProvider>) -> Result<Self> {
        GameClientBuilder::new(config, wallet).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn deriver(&self) -> &AddressDeriver {
        &self.deriver
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &AccountCache {
        &self.cache
    }

    pub fn session(&self) -> &SessionDelegate {
        &self.session
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    pub fn summaries(&self) -> &ExtractionSummaryStore {
        &self.summaries
    }

    pub fn resolver(&self) -> InteractionResolver<'_> {
        InteractionResolver::new(self)
    }

    pub fn wallet_pubkey(&self) -> Option<Pubkey> {
        self.wallet.pubkey()
    }

    /// Ask a running reconciliation to stop and summarize what it has.
    pub fn cancel_pending(&self) {
        self.cancel.send_replace(true);
    }

    pub async fn refresh_all(&self) -> Result<()> {
        let wallet = self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected)?;
        self.cache.refresh_all(&wallet).await
    }

    /// `refresh_all` for paths that must not fail on a flaky read.
    pub(crate) async fn refresh_all_logged(&self) {
        if let Err(error) = self.refresh_all().await {
            warn!(%error, "state refresh failed");
        }
    }

    /// Wallet, global and player, fetching whatever is not cached yet.
    pub(crate) async fn run_state(&self) -> Result<RunState> {
        let wallet = self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected)?;
        let global = match self.cache.global().await {
            Some(global) => global,
            None => self
                .cache
                .refresh_global()
                .await?
                .ok_or(ChainDepthSdkError::AccountNotFound(self.deriver.global()?))?,
        };
        let player = match self.cache.player().await {
            Some(player) => player,
            None => self
                .cache
                .refresh_player(&wallet)
                .await?
                .ok_or(ChainDepthSdkError::AccountNotFound(self.deriver.player(&wallet)?))?,
        };
        Ok(RunState {
            wallet,
            global,
            player,
        })
    }

    /// Turn a pre-submission error into a failed outcome and publish it.
    pub(crate) fn rejected(&self, action: &str, error: ChainDepthSdkError) -> TxOutcome {
        let kind = match &error {
            ChainDepthSdkError::NotConnected => FailureKind::NotConnected,
            ChainDepthSdkError::AccountNotFound(_) => FailureKind::NotInitialized,
            ChainDepthSdkError::Connection(_) => FailureKind::TransientTransport,
            ChainDepthSdkError::InvalidAccountData(_) => FailureKind::DecodeIncompatible,
            _ => FailureKind::Other,
        };
        warn!(action, %error, kind = kind.as_str(), "operation not submitted");
        let outcome = TxOutcome::fail(kind, format!("{} failed: {}", action, error));
        self.events.emit(GameEvent::Error(outcome.detail().to_string()));
        outcome
    }

    /// Poll until the finished run settles and publish its summary.
    pub(crate) async fn reconcile_run(&self, wallet: &Pubkey, baseline: &RunBaseline) -> ExtractionSummary {
        self.cancel.send_replace(false);
        let mut cancel = self.cancel.subscribe();
        let summary = self.reconciler.reconcile(wallet, baseline, &mut cancel).await;
        info!(
            items = summary.items.len(),
            loot = summary.loot_score,
            time = summary.time_score,
            run = summary.run_score,
            total = summary.total_score_after,
            "run summary prepared"
        );
        self.summaries.set_pending(summary.clone()).await;
        self.events.emit(GameEvent::ExtractionCompleted(summary.clone()));
        summary
    }
}

//=============================================================================
// Builder
//=============================================================================

pub struct GameClientBuilder {
    config: ClientConfig,
    wallet: Arc<dyn WalletProvider>,
    connections: Vec<Arc<dyn SolConnection>>,
    raw_transport: Option<Arc<dyn RawTransport>>,
    instruction_builder: Option<Arc<dyn InstructionBuilder>>,
    event_capacity: usize,
}

impl GameClientBuilder {
    pub fn new(config: ClientConfig, wallet: Arc<dyn WalletProvider>) -> Self {
        Self {
            config,
            wallet,
            connections: Vec::new(),
            raw_transport: None,
            instruction_builder: None,
            event_capacity: EventBus::DEFAULT_CAPACITY,
        }
    }

    /// Add a submission endpoint. The first one added also serves reads.
    /// When none are added, endpoints come from the config and the wallet.
    pub fn with_connection(mut self, connection: Arc<dyn SolConnection>) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn with_raw_transport(mut self, raw: Arc<dyn RawTransport>) -> Self {
        self.raw_transport = Some(raw);
        self
    }

    pub fn with_instruction_builder(mut self, builder: Arc<dyn InstructionBuilder>) -> Self {
        self.instruction_builder = Some(builder);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    fn default_connections(config: &ClientConfig, wallet: &dyn WalletProvider) -> Vec<Arc<dyn SolConnection>> {
        let mut urls = vec![config.primary_rpc_url.clone()];
        urls.extend(config.fallback_rpc_url.clone());
        urls.extend(wallet.rpc_endpoint());
        urls.into_iter()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Arc::new(RpcConnection::new(url)) as Arc<dyn SolConnection>)
            .collect()
    }

    pub fn build(self) -> Result<GameClient> {
        self.config.validate()?;
        let program_id = self.config.program_id()?;
        let skr_mint = self.config.skr_mint()?;
        let deriver = AddressDeriver::new(program_id);

        let connections = if self.connections.is_empty() {
            Self::default_connections(&self.config, self.wallet.as_ref())
        } else {
            self.connections
        };
        let connection = connections
            .first()
            .cloned()
            .ok_or_else(|| ChainDepthSdkError::Config("no RPC endpoint configured".to_string()))?;
        let raw = match self.raw_transport {
            Some(raw) => raw,
            None => Arc::new(HttpRawTransport::new()?),
        };
        let builder = self
            .instruction_builder
            .unwrap_or_else(|| Arc::new(AnchorInstructionBuilder));

        let events = EventBus::new(self.event_capacity);
        let pipeline = Arc::new(TransportPipeline::new(connections, raw, self.config.transport.clone()));
        let cache = Arc::new(AccountCache::new(connection.clone(), deriver, events.clone()));
        let session = Arc::new(SessionDelegate::new(
            self.wallet.clone(),
            connection.clone(),
            pipeline.clone(),
            builder.clone(),
            deriver,
            skr_mint,
            self.config.session.clone(),
            events.clone(),
        ));
        let executor = TransactionExecutor::new(self.wallet.clone(), session.clone(), pipeline, events.clone());
        let reconciler = ExtractionReconciler::new(cache.clone(), self.config.reconcile.clone());
        let (cancel, _) = watch::channel(false);

        info!(%program_id, endpoint = connection.endpoint(), "game client ready");
        Ok(GameClient {
            config: self.config,
            skr_mint,
            deriver,
            wallet: self.wallet,
            connection,
            builder,
            events,
            cache,
            session,
            executor,
            reconciler,
            summaries: ExtractionSummaryStore::default(),
            cancel,
        })
    }
}
