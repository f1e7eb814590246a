mod common;

use chaindepth_sdk::config::TransportSettings;
use chaindepth_sdk::core::connection::SolConnection;
use chaindepth_sdk::error::FailureKind;
use chaindepth_sdk::transport::{TransportPipeline, TxRequest, TxSigner};
use common::{MockConnection, MockRawTransport};
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::sync::Arc;

const TRANSIENT: &str = "error sending request: connection reset by peer";
const ALREADY_JOINED: &str =
    "Transaction simulation failed: Error processing Instruction 0: custom program error: 0x1775";

fn settings() -> TransportSettings {
    TransportSettings {
        base_retry_delay_ms: 1,
        raw_probe_timeout_secs: 1,
        ..TransportSettings::default()
    }
}

fn request() -> TxRequest {
    let ix = Instruction::new_with_bytes(Pubkey::new_unique(), &[7], Vec::new());
    TxRequest::new("Test", vec![ix], TxSigner::Keypair(Arc::new(Keypair::new())))
}

fn pipeline(
    connections: &[Arc<MockConnection>],
    raw: Arc<MockRawTransport>,
) -> TransportPipeline {
    let candidates = connections
        .iter()
        .map(|c| c.clone() as Arc<dyn SolConnection>)
        .collect();
    TransportPipeline::new(candidates, raw, settings())
}

#[test_log::test(tokio::test)]
async fn transient_failures_retry_twice_per_endpoint_then_stop() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    for _ in 0..2 {
        primary.reject_next(TRANSIENT);
        fallback.reject_next(TRANSIENT);
    }

    let outcome = pipeline(&[primary.clone(), fallback.clone()], Arc::default())
        .submit(&request())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(FailureKind::TransientTransport));
    assert_eq!(outcome.detail(), "Test failed: RPC unavailable");
    assert_eq!(primary.send_count(), 2);
    assert_eq!(fallback.send_count(), 2);
}

#[test_log::test(tokio::test)]
async fn program_rejection_stops_endpoint_iteration() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    primary.reject_next(ALREADY_JOINED);

    let outcome = pipeline(&[primary.clone(), fallback.clone()], Arc::default())
        .submit(&request())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(FailureKind::ProgramRejected));
    assert_eq!(outcome.error_code, Some(6005));
    assert!(outcome.detail().contains("AlreadyJoined"), "{}", outcome.detail());
    assert_eq!(primary.send_count(), 1);
    assert_eq!(fallback.send_count(), 0);
}

#[test_log::test(tokio::test)]
async fn fallback_endpoint_recovers_transient_primary() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    primary.reject_next(TRANSIENT);
    primary.reject_next("429 Too Many Requests");

    let outcome = pipeline(&[primary.clone(), fallback.clone()], Arc::default())
        .submit(&request())
        .await;

    assert!(outcome.success);
    let sent = fallback.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(outcome.signature, Some(sent[0].signatures[0]));
    assert_eq!(primary.send_count(), 2);
}

#[test_log::test(tokio::test)]
async fn blockhash_timeout_retries_on_same_endpoint() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    primary.fail_blockhash(1);

    let outcome = pipeline(&[primary.clone()], Arc::default()).submit(&request()).await;

    assert!(outcome.success);
    assert_eq!(primary.send_count(), 1);
}

#[test_log::test(tokio::test)]
async fn repeated_blockhash_failure_moves_to_next_endpoint() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    primary.fail_blockhash(2);

    let outcome = pipeline(&[primary.clone(), fallback.clone()], Arc::default())
        .submit(&request())
        .await;

    assert!(outcome.success);
    assert_eq!(primary.send_count(), 0);
    assert_eq!(fallback.send_count(), 1);
}

#[test_log::test(tokio::test)]
async fn blockhash_failures_exhaust_single_endpoint() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    primary.fail_blockhash(2);

    let outcome = pipeline(&[primary.clone()], Arc::default()).submit(&request()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(FailureKind::TransientTransport));
    assert_eq!(primary.send_count(), 0);
}

#[test_log::test(tokio::test)]
async fn parse_failure_is_rescued_by_raw_probe() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    primary.reject_next("Unable to parse json response: expected value at line 1 column 1");
    let raw = Arc::new(MockRawTransport::default());
    let signature = Signature::new_unique();
    raw.respond(Ok(format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{}"}}"#, signature)));

    let outcome = pipeline(&[primary.clone()], raw.clone()).submit(&request()).await;

    assert!(outcome.success);
    assert_eq!(outcome.signature, Some(signature));
    assert_eq!(raw.calls(), vec!["mock://primary".to_string()]);
    assert_eq!(primary.send_count(), 1);
}

#[test_log::test(tokio::test)]
async fn raw_probe_runs_at_most_once() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    for connection in [&primary, &fallback] {
        for _ in 0..2 {
            connection.reject_next("Unable to parse json response");
        }
    }
    let raw = Arc::new(MockRawTransport::default());

    let outcome = pipeline(&[primary.clone(), fallback.clone()], raw.clone())
        .submit(&request())
        .await;

    assert!(!outcome.success);
    assert_eq!(raw.calls().len(), 1);
    assert_eq!(primary.send_count() + fallback.send_count(), 4);
}

#[test_log::test(tokio::test)]
async fn raw_probe_surfaces_funding_failure() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    primary.reject_next("Unable to parse json response");
    let raw = Arc::new(MockRawTransport::default());
    raw.respond(Ok(
        r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32002,"message":"Transaction simulation failed: Attempt to debit an account but found no record of a prior credit.","data":{"err":"InsufficientFundsForRent"}}}"#
            .to_string(),
    ));

    let outcome = pipeline(&[primary.clone()], raw).submit(&request()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(FailureKind::FundingInsufficient));
    assert_eq!(outcome.detail(), "Test failed: insufficient SOL for fees");
}

#[test_log::test(tokio::test)]
async fn funding_failure_is_not_retried() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    let fallback = Arc::new(MockConnection::new("mock://fallback"));
    primary.reject_next("Transaction simulation failed: insufficient funds for fee");

    let outcome = pipeline(&[primary.clone(), fallback.clone()], Arc::default())
        .submit(&request())
        .await;

    assert_eq!(outcome.error_kind, Some(FailureKind::FundingInsufficient));
    assert_eq!(primary.send_count(), 1);
    assert_eq!(fallback.send_count(), 0);
}

#[test_log::test(tokio::test)]
async fn not_initialized_code_has_its_own_kind() {
    let primary = Arc::new(MockConnection::new("mock://primary"));
    primary.reject_next("Transaction simulation failed: Error processing Instruction 0: custom program error: 0xbc4");

    let outcome = pipeline(&[primary], Arc::default()).submit(&request()).await;

    assert_eq!(outcome.error_kind, Some(FailureKind::NotInitialized));
    assert_eq!(outcome.error_code, Some(3012));
}

#[test]
fn duplicate_endpoints_are_dropped() {
    let a = Arc::new(MockConnection::new("https://rpc.example.com/"));
    let b = Arc::new(MockConnection::new("HTTPS://RPC.EXAMPLE.COM"));
    let c = Arc::new(MockConnection::new("https://other.example.com"));
    let pipeline = pipeline(&[a, b, c], Arc::default());
    assert_eq!(
        pipeline.endpoints(),
        vec!["https://rpc.example.com/".to_string(), "https://other.example.com".to_string()]
    );
}

#[test_log::test(tokio::test)]
async fn wallet_payer_without_key_is_not_connected() {
    use chaindepth_sdk::core::signer::WalletProvider;

    struct Disconnected;

    #[async_trait::async_trait]
    impl WalletProvider for Disconnected {
        fn pubkey(&self) -> Option<Pubkey> {
            None
        }

        async fn sign_transaction(
            &self,
            tx: solana_sdk::transaction::Transaction,
        ) -> Result<solana_sdk::transaction::Transaction, String> {
            Ok(tx)
        }
    }

    let primary = Arc::new(MockConnection::new("mock://primary"));
    let ix = Instruction::new_with_bytes(Keypair::new().pubkey(), &[1], Vec::new());
    let request = TxRequest::new("Test", vec![ix], TxSigner::Wallet(Arc::new(Disconnected)));

    let outcome = pipeline(&[primary.clone()], Arc::default()).submit(&request).await;

    assert_eq!(outcome.error_kind, Some(FailureKind::NotConnected));
    assert_eq!(primary.send_count(), 0);
}
