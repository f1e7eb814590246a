use crate::config::TransportSettings;
use crate::core::connection::SolConnection;
use crate::core::signer::WalletProvider;
use crate::error::{ChainDepthSdkError, FailureKind, Result};
use crate::program_error::{
    classify_failure_reason, extract_custom_error_code, format_program_error,
    is_funding_failure, is_response_parse_failure, is_rpc_transport_failure, ProgramErrorKind,
    ANCHOR_ACCOUNT_NOT_INITIALIZED,
};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const INFERRED_FUNDING_REASON: &str =
    "Transaction simulation failed: insufficient lamports for transfer/rent (inferred from raw RPC body)";

//=============================================================================
// Outcome
//=============================================================================

/// Result of one submission. Retries produce new outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub success: bool,
    pub signature: Option<Signature>,
    pub error_kind: Option<FailureKind>,
    /// Short user-facing failure text
    pub error_detail: Option<String>,
    /// Raw failure reason as reported by the endpoint (diagnostics only)
    pub reason: Option<String>,
    /// Program error code parsed from the reason
    pub error_code: Option<u32>,
}

impl TxOutcome {
    pub fn ok(signature: Signature) -> Self {
        Self {
            success: true,
            signature: Some(signature),
            error_kind: None,
            error_detail: None,
            reason: None,
            error_code: None,
        }
    }

    /// Success without a transaction: the desired state already holds.
    pub fn already_done() -> Self {
        Self {
            success: true,
            signature: None,
            error_kind: None,
            error_detail: None,
            reason: None,
            error_code: None,
        }
    }

    pub fn fail(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            success: false,
            signature: None,
            error_kind: Some(kind),
            error_detail: Some(detail.into()),
            reason: None,
            error_code: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_code(mut self, code: Option<u32>) -> Self {
        self.error_code = code;
        self
    }

    /// Replace the user-facing text, keeping kind, code and reason.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn program_error(&self) -> Option<ProgramErrorKind> {
        self.error_code.and_then(ProgramErrorKind::from_code)
    }

    pub fn is_program_error(&self, kind: ProgramErrorKind) -> bool {
        self.error_code == Some(kind.code())
    }

    pub fn is_funding_failure(&self) -> bool {
        self.error_kind == Some(FailureKind::FundingInsufficient)
    }

    pub fn is_transport_failure(&self) -> bool {
        self.error_kind == Some(FailureKind::TransientTransport)
    }

    pub fn is_not_initialized(&self) -> bool {
        self.error_kind == Some(FailureKind::NotInitialized)
    }

    pub fn detail(&self) -> &str {
        self.error_detail.as_deref().unwrap_or("")
    }
}

//=============================================================================
// Request
//=============================================================================

/// Who pays fees and signs as authority.
#[derive(Clone)]
pub enum TxSigner {
    /// Local keypair, e.g. the delegated session key
    Keypair(Arc<Keypair>),
    /// The player's wallet provider
    Wallet(Arc<dyn WalletProvider>),
}

impl TxSigner {
    pub fn pubkey(&self) -> Option<Pubkey> {
        match self {
            TxSigner::Keypair(keypair) => Some(keypair.pubkey()),
            TxSigner::Wallet(wallet) => wallet.pubkey(),
        }
    }
}

impl std::fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxSigner::Keypair(keypair) => write!(f, "Keypair({})", keypair.pubkey()),
            TxSigner::Wallet(wallet) => write!(f, "Wallet({:?})", wallet.pubkey()),
        }
    }
}

/// Unsigned instructions plus the signers needed to submit them. The
/// transaction is rebuilt and re-signed for every attempt with a fresh
/// blockhash.
#[derive(Debug, Clone)]
pub struct TxRequest {
    pub action: String,
    pub instructions: Vec<Instruction>,
    pub fee_payer: TxSigner,
    pub co_signers: Vec<Arc<Keypair>>,
}

impl TxRequest {
    pub fn new(action: impl Into<String>, instructions: Vec<Instruction>, fee_payer: TxSigner) -> Self {
        Self {
            action: action.into(),
            instructions,
            fee_payer,
            co_signers: Vec::new(),
        }
    }

    pub fn with_co_signer(mut self, keypair: Arc<Keypair>) -> Self {
        self.co_signers.push(keypair);
        self
    }
}

//=============================================================================
// Raw Transport Probe
//=============================================================================

/// Bare JSON-RPC POST used when the structured client cannot parse a response.
#[async_trait]
pub trait RawTransport: Send + Sync {
    /// POST `body` to `endpoint`, returning the response text. Must give up
    /// after `timeout`.
    async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<String, String>;
}

pub struct HttpRawTransport {
    client: reqwest::Client,
}

impl HttpRawTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ChainDepthSdkError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RawTransport for HttpRawTransport {
    async fn post_json(
        &self,
        endpoint: &str,
        body: &Value,
        timeout: Duration,
    ) -> std::result::Result<String, String> {
        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        response.text().await.map_err(|e| e.to_string())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ProbeResult {
    Accepted(Signature),
    Rejected(String),
    FundingInferred,
    Inconclusive,
}

//=============================================================================
// Pipeline
//=============================================================================

/// Submits transactions across an ordered list of endpoints.
///
/// Per endpoint: up to `max_attempts_per_endpoint` attempts with linear
/// backoff while failures are transient. A program rejection or other
/// deterministic failure ends the whole submission.
pub struct TransportPipeline {
    candidates: Vec<Arc<dyn SolConnection>>,
    raw: Arc<dyn RawTransport>,
    settings: TransportSettings,
}

impl TransportPipeline {
    /// `candidates` in priority order: primary, fallback, wallet endpoint.
    /// Candidates with the same endpoint label are dropped after the first.
    pub fn new(
        candidates: Vec<Arc<dyn SolConnection>>,
        raw: Arc<dyn RawTransport>,
        settings: TransportSettings,
    ) -> Self {
        let mut unique: Vec<Arc<dyn SolConnection>> = Vec::new();
        for candidate in candidates {
            let key = normalize_endpoint(candidate.endpoint());
            if key.is_empty() || unique.iter().any(|c| normalize_endpoint(c.endpoint()) == key) {
                continue;
            }
            unique.push(candidate);
        }
        Self {
            candidates: unique,
            raw,
            settings,
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.endpoint().to_string()).collect()
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub async fn submit(&self, request: &TxRequest) -> TxOutcome {
        let Some(payer) = request.fee_payer.pubkey() else {
            return TxOutcome::fail(FailureKind::NotConnected, "Wallet not connected");
        };
        if self.candidates.is_empty() {
            return TxOutcome::fail(FailureKind::Other, "No RPC endpoint configured");
        }

        let max_attempts = self.settings.max_attempts_per_endpoint.max(1);
        let mut last_reason = String::new();
        let mut last_code: Option<u32> = None;
        let mut funding_reason: Option<String> = None;
        let mut probe_used = false;

        'endpoints: for (index, connection) in self.candidates.iter().enumerate() {
            let endpoint = connection.endpoint();
            for attempt in 1..=max_attempts {
                let blockhash = match connection.get_latest_blockhash().await {
                    Ok(hash) => hash,
                    Err(error) => {
                        last_reason = error.to_string();
                        last_code = None;
                        warn!(action = %request.action, endpoint, attempt, reason = %last_reason, "blockhash fetch failed");
                        if attempt < max_attempts && is_rpc_transport_failure(&last_reason) {
                            tokio::time::sleep(self.settings.retry_delay(attempt)).await;
                            continue;
                        }
                        continue 'endpoints;
                    },
                };

                let tx = match sign_request(request, &payer, blockhash).await {
                    Ok(tx) => tx,
                    Err(error) => {
                        warn!(action = %request.action, %error, "signing failed");
                        return TxOutcome::fail(FailureKind::Other, format!("{} signing failed", request.action))
                            .with_reason(error.to_string());
                    },
                };

                debug!(action = %request.action, endpoint, attempt, "sending transaction");
                let error = match connection.send_transaction(&tx).await {
                    Ok(signature) => {
                        info!(action = %request.action, endpoint, %signature, "transaction sent");
                        return TxOutcome::ok(signature);
                    },
                    Err(error) => error,
                };

                let mut reason = error.to_string();
                let mut code = extract_custom_error_code(&reason);
                if funding_reason.is_none() && is_funding_failure(&reason) {
                    funding_reason = Some(reason.clone());
                }

                let probe_primary_code = code == Some(1) && index == 0 && attempt == 1;
                if !probe_used && (is_response_parse_failure(&reason) || probe_primary_code) {
                    probe_used = true;
                    match self.raw_probe(endpoint, &tx).await {
                        ProbeResult::Accepted(signature) => {
                            info!(action = %request.action, endpoint, %signature, "raw probe accepted transaction");
                            return TxOutcome::ok(signature);
                        },
                        ProbeResult::Rejected(rpc_error) => {
                            if let Some(probe_code) = extract_custom_error_code(&rpc_error) {
                                code = Some(probe_code);
                            }
                            if funding_reason.is_none() && is_funding_failure(&rpc_error) {
                                funding_reason = Some(rpc_error.clone());
                            }
                            reason = rpc_error;
                        },
                        ProbeResult::FundingInferred => {
                            funding_reason.get_or_insert_with(|| INFERRED_FUNDING_REASON.to_string());
                        },
                        ProbeResult::Inconclusive => {},
                    }
                }

                warn!(
                    action = %request.action,
                    endpoint,
                    attempt,
                    code = ?code,
                    category = classify_failure_reason(&reason).as_str(),
                    reason = %reason,
                    "transaction attempt failed"
                );
                last_reason = reason;
                last_code = code;

                if funding_reason.is_some() || !is_rpc_transport_failure(&last_reason) {
                    break 'endpoints;
                }
                if attempt < max_attempts {
                    tokio::time::sleep(self.settings.retry_delay(attempt)).await;
                }
            }
        }

        failure_outcome(&request.action, last_reason, last_code, funding_reason)
    }

    async fn raw_probe(&self, endpoint: &str, tx: &Transaction) -> ProbeResult {
        let bytes = match bincode::serialize(tx) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(endpoint, %error, "raw probe could not serialize transaction");
                return ProbeResult::Inconclusive;
            },
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendTransaction",
            "params": [
                encoded,
                {
                    "encoding": "base64",
                    "skipPreflight": false,
                    "preflightCommitment": "confirmed"
                }
            ]
        });

        let timeout = self.settings.raw_probe_timeout();
        let text = match self.raw.post_json(endpoint, &body, timeout).await {
            Ok(text) => text,
            Err(error) => {
                warn!(endpoint, %error, "raw probe request failed");
                return ProbeResult::Inconclusive;
            },
        };
        debug!(endpoint, body = %truncate(&text, self.settings.raw_body_log_limit), "raw probe response");
        parse_probe_body(&text)
    }
}

fn parse_probe_body(text: &str) -> ProbeResult {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Some(signature) = value
            .get("result")
            .and_then(Value::as_str)
            .and_then(|s| Signature::from_str(s).ok())
        {
            return ProbeResult::Accepted(signature);
        }
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            if is_funding_failure(text) && !is_funding_failure(message) {
                return ProbeResult::FundingInferred;
            }
            return ProbeResult::Rejected(message.to_string());
        }
    }
    if is_funding_failure(text) {
        return ProbeResult::FundingInferred;
    }
    ProbeResult::Inconclusive
}

fn failure_outcome(
    action: &str,
    reason: String,
    code: Option<u32>,
    funding_reason: Option<String>,
) -> TxOutcome {
    let (kind, reason) = if let Some(funding) = funding_reason {
        (FailureKind::FundingInsufficient, funding)
    } else if code == Some(ANCHOR_ACCOUNT_NOT_INITIALIZED) {
        (FailureKind::NotInitialized, reason)
    } else if code.is_some() {
        (FailureKind::ProgramRejected, reason)
    } else if is_rpc_transport_failure(&reason) {
        (FailureKind::TransientTransport, reason)
    } else {
        (FailureKind::Other, reason)
    };

    let detail = match kind {
        FailureKind::FundingInsufficient => format!("{} failed: insufficient SOL for fees", action),
        FailureKind::TransientTransport => format!("{} failed: RPC unavailable", action),
        _ => format!("{} failed{}", action, format_program_error(code)),
    };
    TxOutcome::fail(kind, detail).with_reason(reason).with_code(code)
}

async fn sign_request(request: &TxRequest, payer: &Pubkey, blockhash: Hash) -> Result<Transaction> {
    let message = Message::new_with_blockhash(&request.instructions, Some(payer), &blockhash);
    let mut tx = Transaction::new_unsigned(message);

    let co_signers: Vec<&Keypair> = request.co_signers.iter().map(|k| k.as_ref()).collect();
    if !co_signers.is_empty() {
        tx.try_partial_sign(co_signers.as_slice(), blockhash)
            .map_err(|e| ChainDepthSdkError::Signing(e.to_string()))?;
    }

    match &request.fee_payer {
        TxSigner::Keypair(keypair) => {
            tx.try_partial_sign(&[keypair.as_ref()], blockhash)
                .map_err(|e| ChainDepthSdkError::Signing(e.to_string()))?;
        },
        TxSigner::Wallet(wallet) => {
            tx = wallet
                .sign_transaction(tx)
                .await
                .map_err(ChainDepthSdkError::Signing)?;
        },
    }
    Ok(tx)
}

fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_body_with_result_is_accepted() {
        let signature = Signature::default();
        let body = format!(r#"{{"jsonrpc":"2.0","result":"{}","id":1}}"#, signature);
        assert_eq!(parse_probe_body(&body), ProbeResult::Accepted(signature));
    }

    #[test]
    fn probe_body_with_error_message_is_rejected() {
        let body = r#"{"jsonrpc":"2.0","error":{"code":-32002,"message":"Transaction simulation failed: custom program error: 0x1779"},"id":1}"#;
        assert_eq!(
            parse_probe_body(body),
            ProbeResult::Rejected(
                "Transaction simulation failed: custom program error: 0x1779".to_string()
            )
        );
    }

    #[test]
    fn funding_hint_in_logs_is_inferred() {
        let body = r#"{"error":{"message":"Transaction simulation failed","data":{"logs":["Transfer: insufficient lamports 10, need 5000"]}}}"#;
        assert_eq!(parse_probe_body(body), ProbeResult::FundingInferred);
        assert_eq!(parse_probe_body("<html>bad gateway</html>"), ProbeResult::Inconclusive);
    }

    #[test]
    fn endpoint_normalization_ignores_case_and_trailing_slash() {
        assert_eq!(
            normalize_endpoint(" https://API.devnet.solana.com/ "),
            "https://api.devnet.solana.com"
        );
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
