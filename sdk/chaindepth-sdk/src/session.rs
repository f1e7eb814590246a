use crate::advanced::instructions::{self, GameInstruction, InstructionBuilder};
use crate::config::SessionSettings;
use crate::core::connection::SolConnection;
use crate::core::signer::WalletProvider;
use crate::error::{ChainDepthSdkError, Result};
use crate::events::{EventBus, GameEvent};
use crate::program_error::{ProgramErrorKind, ANCHOR_CONSTRAINT_SEEDS};
use crate::transport::{TransportPipeline, TxRequest, TxSigner};
use crate::utils::AddressDeriver;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

//=============================================================================
// Signing Context
//=============================================================================

/// Key that signs (and pays for) an operation.
#[derive(Clone)]
pub enum ContextSigner {
    /// Delegated session keypair
    Session(Arc<Keypair>),
    /// The player's own wallet
    Wallet,
}

/// Who signs one attempted operation. Built fresh per attempt.
///
/// The constructors uphold the invariant that `uses_session` implies a
/// session signer and a `session_authority`.
#[derive(Clone)]
pub struct SigningContext {
    pub signer: ContextSigner,
    /// Account passed as the instruction's `authority` signer
    pub authority: Pubkey,
    /// The player's wallet
    pub player: Pubkey,
    pub session_authority: Option<Pubkey>,
    pub uses_session: bool,
}

impl SigningContext {
    pub fn wallet(player: Pubkey) -> Self {
        Self {
            signer: ContextSigner::Wallet,
            authority: player,
            player,
            session_authority: None,
            uses_session: false,
        }
    }

    pub fn session(lease: &SessionLease, player: Pubkey) -> Self {
        Self {
            signer: ContextSigner::Session(lease.signer_keypair.clone()),
            authority: lease.session_key(),
            player,
            session_authority: Some(lease.authority_pda),
            uses_session: true,
        }
    }

    /// Fee payer for a transaction signed under this context.
    pub fn tx_signer(&self, wallet: &Arc<dyn WalletProvider>) -> TxSigner {
        match &self.signer {
            ContextSigner::Session(keypair) => TxSigner::Keypair(keypair.clone()),
            ContextSigner::Wallet => TxSigner::Wallet(wallet.clone()),
        }
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("authority", &self.authority)
            .field("player", &self.player)
            .field("session_authority", &self.session_authority)
            .field("uses_session", &self.uses_session)
            .finish()
    }
}

//=============================================================================
// Session Lease
//=============================================================================

/// A delegated signer authorized on-chain by a successful `BeginSession`.
#[derive(Clone)]
pub struct SessionLease {
    pub signer_keypair: Arc<Keypair>,
    pub authority_pda: Pubkey,
    pub expires_at_slot: u64,
    pub expires_at_unix: i64,
    pub capability_mask: u64,
    pub spend_cap: u64,
    pub is_active: bool,
}

impl SessionLease {
    pub fn session_key(&self) -> Pubkey {
        self.signer_keypair.pubkey()
    }

    /// Active and not within `margin_secs` of expiry at `now_unix`.
    pub fn is_usable(&self, now_unix: i64, margin_secs: i64) -> bool {
        self.is_active && now_unix.saturating_add(margin_secs) < self.expires_at_unix
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_key", &self.session_key())
            .field("authority_pda", &self.authority_pda)
            .field("expires_at_slot", &self.expires_at_slot)
            .field("expires_at_unix", &self.expires_at_unix)
            .field("capability_mask", &format_args!("{:#x}", self.capability_mask))
            .field("spend_cap", &self.spend_cap)
            .field("is_active", &self.is_active)
            .finish()
    }
}

/// Program errors that a fresh session can clear.
pub fn is_session_recoverable(code: u32) -> bool {
    code == ANCHOR_CONSTRAINT_SEEDS
        || ProgramErrorKind::from_code(code).is_some_and(ProgramErrorKind::is_session_error)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

//=============================================================================
// Session Delegate
//=============================================================================

/// Owns the player's single delegated session lease.
///
/// The capability mask is never checked client-side; the program enforces it
/// and a rejection comes back as a recoverable session error.
pub struct SessionDelegate {
    wallet: Arc<dyn WalletProvider>,
    connection: Arc<dyn SolConnection>,
    pipeline: Arc<TransportPipeline>,
    builder: Arc<dyn InstructionBuilder>,
    deriver: AddressDeriver,
    skr_mint: Pubkey,
    settings: SessionSettings,
    events: EventBus,
    lease: RwLock<Option<SessionLease>>,
}

impl SessionDelegate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        connection: Arc<dyn SolConnection>,
        pipeline: Arc<TransportPipeline>,
        builder: Arc<dyn InstructionBuilder>,
        deriver: AddressDeriver,
        skr_mint: Pubkey,
        settings: SessionSettings,
        events: EventBus,
    ) -> Self {
        Self {
            wallet,
            connection,
            pipeline,
            builder,
            deriver,
            skr_mint,
            settings,
            events,
            lease: RwLock::new(None),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub async fn lease(&self) -> Option<SessionLease> {
        self.lease.read().await.clone()
    }

    /// Usable lease, if any.
    pub async fn usable_lease(&self) -> Option<SessionLease> {
        let now = unix_now();
        self.lease
            .read()
            .await
            .as_ref()
            .filter(|lease| lease.is_usable(now, self.settings.expiry_margin_secs))
            .cloned()
    }

    pub async fn has_usable_lease(&self) -> bool {
        self.usable_lease().await.is_some()
    }

    /// Begin a session with a fresh keypair.
    ///
    /// The previous lease, if any, is dropped locally before submitting. Its
    /// on-chain authority is left orphaned.
    pub async fn begin(
        &self,
        capabilities: u64,
        spend_cap: u64,
        duration_minutes: u64,
    ) -> Result<SessionLease> {
        let player = self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected)?;
        if capabilities == 0 {
            return Err(ChainDepthSdkError::Config(
                "session instruction allowlist is empty".to_string(),
            ));
        }
        self.invalidate().await;

        let duration_minutes = duration_minutes.max(1);
        let keypair = Arc::new(Keypair::new());
        let session_key = keypair.pubkey();
        let authority_pda = self.deriver.session_authority(&player, &session_key)?;

        let slot = self
            .connection
            .get_slot()
            .await
            .map_err(|e| ChainDepthSdkError::Connection(e.to_string()))?;
        let expires_at_slot = slot.saturating_add(duration_minutes.saturating_mul(self.settings.slots_per_minute));
        let expires_at_unix = unix_now().saturating_add((duration_minutes as i64).saturating_mul(60));

        let accounts = instructions::begin_session(&self.deriver, &player, &session_key, &self.skr_mint)?;
        let ix = self.builder.build(
            self.deriver.program_id(),
            &GameInstruction::BeginSession {
                expires_at_slot,
                expires_at_unix_timestamp: expires_at_unix,
                instruction_allowlist: capabilities,
                max_token_spend: spend_cap,
            },
            accounts,
        )?;

        let request = TxRequest::new("BeginSession", vec![ix], TxSigner::Wallet(self.wallet.clone()))
            .with_co_signer(keypair.clone());
        let outcome = self.pipeline.submit(&request).await;
        if !outcome.success {
            warn!(reason = ?outcome.reason, code = ?outcome.error_code, "begin session failed");
            return Err(ChainDepthSdkError::Other(outcome.detail().to_string()));
        }

        let lease = SessionLease {
            signer_keypair: keypair,
            authority_pda,
            expires_at_slot,
            expires_at_unix,
            capability_mask: capabilities,
            spend_cap,
            is_active: true,
        };
        *self.lease.write().await = Some(lease.clone());
        info!(%session_key, expires_at_slot, signature = ?outcome.signature, "session started");
        self.events.emit(GameEvent::SessionStarted { session_key });
        Ok(lease)
    }

    /// `begin` with the configured allowlist, spend cap and duration.
    pub async fn begin_default(&self) -> Result<SessionLease> {
        self.begin(
            self.settings.allowlist,
            self.settings.max_token_spend,
            self.settings.duration_minutes,
        )
        .await
    }

    /// True when a usable lease exists or one was just started.
    pub async fn ensure(&self) -> bool {
        if self.has_usable_lease().await {
            return true;
        }
        if !self.settings.auto_begin {
            return false;
        }
        match self.begin_default().await {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, "session unavailable");
                false
            },
        }
    }

    /// Session-signing context when a lease is usable, wallet-signing otherwise.
    pub async fn signing_context_for(&self, operation: &str, player: Pubkey) -> SigningContext {
        let ctx = match self.usable_lease().await {
            Some(lease) => SigningContext::session(&lease, player),
            None => SigningContext::wallet(player),
        };
        debug!(operation, uses_session = ctx.uses_session, authority = %ctx.authority, "signing context");
        ctx
    }

    pub fn is_recoverable(&self, code: Option<u32>) -> bool {
        code.is_some_and(is_session_recoverable)
    }

    /// Revoke the lease on-chain. `Ok(None)` when there was nothing to end.
    pub async fn end(&self) -> Result<Option<Signature>> {
        let player = self.wallet.pubkey().ok_or(ChainDepthSdkError::NotConnected)?;
        let Some(lease) = self.lease().await else {
            debug!("no active session to end");
            return Ok(None);
        };

        let session_key = lease.session_key();
        let accounts = instructions::end_session(&self.deriver, &player, &session_key, &self.skr_mint)?;
        let ix = self
            .builder
            .build(self.deriver.program_id(), &GameInstruction::EndSession, accounts)?;
        let request = TxRequest::new("EndSession", vec![ix], TxSigner::Wallet(self.wallet.clone()));
        let outcome = self.pipeline.submit(&request).await;
        if !outcome.success {
            return Err(ChainDepthSdkError::Other(outcome.detail().to_string()));
        }

        self.invalidate().await;
        info!(%session_key, "session ended");
        self.events.emit(GameEvent::SessionEnded);
        Ok(outcome.signature)
    }

    /// Stop using the current lease without touching the chain.
    pub async fn invalidate(&self) {
        if let Some(lease) = self.lease.write().await.take() {
            debug!(session_key = %lease.session_key(), "session lease dropped");
        }
    }
}
