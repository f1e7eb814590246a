use crate::core::signer::WalletProvider;
use crate::error::{FailureKind, Result};
use crate::events::{EventBus, GameEvent};
use crate::program_error::{format_program_error, ProgramErrorKind};
use crate::session::{SessionDelegate, SigningContext};
use crate::transport::{TransportPipeline, TxOutcome, TxRequest};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

const SESSION_FUNDING_MESSAGE: &str =
    "Your session wallet is low on SOL for transaction fees. Top up session funding to continue smooth gameplay.";

/// Runs one gameplay operation with session-preferred signing.
///
/// Recovery is bounded: at most one wallet fallback for funding or
/// transport trouble, and at most one session restart followed by one
/// retry. Every path ends in a `TxOutcome`; nothing is returned as `Err`.
pub struct TransactionExecutor {
    wallet: Arc<dyn WalletProvider>,
    session: Arc<SessionDelegate>,
    pipeline: Arc<TransportPipeline>,
    events: EventBus,
    in_flight: Mutex<()>,
}

impl TransactionExecutor {
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        session: Arc<SessionDelegate>,
        pipeline: Arc<TransportPipeline>,
        events: EventBus,
    ) -> Self {
        Self {
            wallet,
            session,
            pipeline,
            events,
            in_flight: Mutex::new(()),
        }
    }

    /// `build` is called once per attempt with that attempt's signer.
    pub async fn execute<F>(
        &self,
        action: &str,
        build: F,
        ensure_session: bool,
        allow_session: bool,
    ) -> TxOutcome
    where
        F: Fn(&SigningContext) -> Result<Vec<Instruction>> + Send + Sync,
    {
        let Some(player) = self.wallet.pubkey() else {
            warn!(action, "wallet not connected");
            return self.finish(action, TxOutcome::fail(FailureKind::NotConnected, "Wallet not connected"));
        };
        let _guard = self.in_flight.lock().await;

        if ensure_session && allow_session && !self.session.has_usable_lease().await && !self.session.ensure().await {
            info!(action, "session unavailable, falling back to wallet signing");
        }

        let ctx = if allow_session {
            self.session.signing_context_for(action, player).await
        } else {
            SigningContext::wallet(player)
        };
        let outcome = self.attempt(action, &ctx, &build).await;
        if outcome.success {
            return self.finish(action, outcome);
        }

        if ctx.uses_session && outcome.is_funding_failure() {
            info!(action, reason = ?outcome.reason, "session signer cannot pay fees, retrying with wallet");
            self.events
                .emit(GameEvent::SessionFeeFundingRequired(SESSION_FUNDING_MESSAGE.to_string()));
            let label = format!("{}:wallet-fallback", action);
            let wallet_outcome = self.attempt(&label, &SigningContext::wallet(player), &build).await;
            return self.finish(action, wallet_outcome);
        }

        if outcome.is_transport_failure() {
            if ctx.uses_session {
                info!(action, reason = ?outcome.reason, "RPC transport failure, retrying once with wallet");
                let label = format!("{}:wallet-fallback", action);
                let wallet_outcome = self.attempt(&label, &SigningContext::wallet(player), &build).await;
                if wallet_outcome.success {
                    return self.finish(action, wallet_outcome);
                }
            }
            let detail = format!("{} failed (RPC unstable, please retry)", action);
            return self.finish(action, outcome.with_detail(detail));
        }

        if !ctx.uses_session {
            return self.finish(action, outcome);
        }

        let code_detail = format_program_error(outcome.error_code);
        if !self.session.is_recoverable(outcome.error_code) {
            let detail = format!("{} failed (non-recoverable){}", action, code_detail);
            return self.finish(action, outcome.with_detail(detail));
        }

        info!(action, code = ?outcome.error_code, "recoverable session error, restarting session once");
        if let Err(error) = self.session.begin_default().await {
            warn!(action, %error, "session restart failed");
            self.session.invalidate().await;
            let detail = format!("{} session restart failed{}", action, code_detail);
            return self.finish(action, outcome.with_detail(detail));
        }

        let retry_ctx = self.session.signing_context_for(action, player).await;
        if !retry_ctx.uses_session {
            warn!(action, "session signer unavailable after restart");
            return self.finish(
                action,
                TxOutcome::fail(FailureKind::Other, format!("{} retry signer unavailable", action)),
            );
        }

        let label = format!("{}:retry", action);
        let retry = self.attempt(&label, &retry_ctx, &build).await;
        if retry.success {
            return self.finish(action, retry);
        }

        if retry.is_program_error(ProgramErrorKind::SessionInstructionNotAllowed) {
            info!(action, "retry still not allowed for session, falling back to wallet once");
            let label = format!("{}:wallet-retry-fallback", action);
            let wallet_outcome = self.attempt(&label, &SigningContext::wallet(player), &build).await;
            if wallet_outcome.success {
                return self.finish(action, wallet_outcome);
            }
        }

        let detail = format!("{} retry failed{}", action, format_program_error(retry.error_code));
        self.finish(action, retry.with_detail(detail))
    }

    /// The wallet's public key, `None` while disconnected.
    pub fn player(&self) -> Option<Pubkey> {
        self.wallet.pubkey()
    }

    async fn attempt<F>(&self, label: &str, ctx: &SigningContext, build: &F) -> TxOutcome
    where
        F: Fn(&SigningContext) -> Result<Vec<Instruction>> + Send + Sync,
    {
        let instructions = match build(ctx) {
            Ok(instructions) => instructions,
            Err(error) => {
                warn!(action = label, %error, "instruction build failed");
                return TxOutcome::fail(FailureKind::Other, format!("{} failed: {}", label, error));
            },
        };
        let request = TxRequest::new(label, instructions, ctx.tx_signer(&self.wallet));
        self.pipeline.submit(&request).await
    }

    fn finish(&self, action: &str, outcome: TxOutcome) -> TxOutcome {
        match outcome.signature {
            Some(signature) if outcome.success => {
                self.events.emit(GameEvent::TransactionSent {
                    action: action.to_string(),
                    signature,
                });
            },
            _ if !outcome.success => {
                warn!(
                    action,
                    kind = ?outcome.error_kind,
                    code = ?outcome.error_code,
                    reason = ?outcome.reason,
                    "operation failed"
                );
                self.events.emit(GameEvent::Error(outcome.detail().to_string()));
            },
            _ => {},
        }
        outcome
    }
}
