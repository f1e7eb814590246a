use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::account::Account;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::error::Error;

/// Read and submit surface of one RPC endpoint.
///
/// `endpoint` is a stable label (normally the URL) used to deduplicate
/// candidates in the transport pipeline and in diagnostics.
#[async_trait]
pub trait SolConnection: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn send_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Signature, Box<dyn Error + Send + Sync>>;
    async fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> Result<Option<Account>, Box<dyn Error + Send + Sync>>;
    async fn get_latest_blockhash(&self) -> Result<Hash, Box<dyn Error + Send + Sync>>;
    async fn get_slot(&self) -> Result<u64, Box<dyn Error + Send + Sync>>;
}

/// `SolConnection` over the nonblocking `solana-client` RPC client.
///
/// Sends run preflight simulation at `confirmed` so program rejections come
/// back as `custom program error: 0x..` reasons.
pub struct RpcConnection {
    url: String,
    client: RpcClient,
}

impl RpcConnection {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let client = RpcClient::new_with_commitment(url.clone(), CommitmentConfig::confirmed());
        Self { url, client }
    }
}

#[async_trait]
impl SolConnection for RpcConnection {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
    ) -> Result<Signature, Box<dyn Error + Send + Sync>> {
        let config = RpcSendTransactionConfig {
            skip_preflight: false,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            ..RpcSendTransactionConfig::default()
        };
        let signature = self.client.send_transaction_with_config(tx, config).await?;
        Ok(signature)
    }

    async fn get_account(
        &self,
        pubkey: &Pubkey,
    ) -> Result<Option<Account>, Box<dyn Error + Send + Sync>> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, Box<dyn Error + Send + Sync>> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn get_slot(&self) -> Result<u64, Box<dyn Error + Send + Sync>> {
        Ok(self.client.get_slot().await?)
    }
}
