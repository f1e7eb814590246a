use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;

/// The player's primary wallet.
/// This allows the SDK to work with:
/// 1. Local Keypairs (Backend/CLI, tests)
/// 2. Wallet Adapters (Frontend - the adapter owns the key and signs on request)
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Connected public key, `None` while disconnected.
    fn pubkey(&self) -> Option<Pubkey>;

    /// Sign `tx` as the wallet. The transaction may already carry partial
    /// signatures from other signers; those must be preserved.
    async fn sign_transaction(&self, tx: Transaction) -> Result<Transaction, String>;

    /// RPC endpoint the wallet itself is connected to, if it exposes one.
    fn rpc_endpoint(&self) -> Option<String> {
        None
    }
}

/// Wallet backed by an in-process keypair.
pub struct KeypairWallet {
    keypair: Arc<Keypair>,
    rpc_endpoint: Option<String>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            rpc_endpoint: None,
        }
    }

    pub fn with_rpc_endpoint(mut self, url: impl Into<String>) -> Self {
        self.rpc_endpoint = Some(url.into());
        self
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
    fn pubkey(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn sign_transaction(&self, mut tx: Transaction) -> Result<Transaction, String> {
        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[self.keypair.as_ref()], blockhash)
            .map_err(|e| e.to_string())?;
        Ok(tx)
    }

    fn rpc_endpoint(&self) -> Option<String> {
        self.rpc_endpoint.clone()
    }
}
