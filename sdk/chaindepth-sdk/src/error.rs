use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// SDK-specific error types for ChainDepth operations
#[derive(Debug, Error)]
pub enum ChainDepthSdkError {
    /// Connection or RPC error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Account not found on-chain
    #[error("Account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Invalid account data or deserialization error
    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),

    /// No bump produced a valid program address for the seed set
    #[error("Address derivation failed for {0}")]
    Derivation(&'static str),

    /// Invalid client configuration
    #[error("Invalid config: {0}")]
    Config(String),

    /// Signing failed or the signer set does not match the message
    #[error("Signing error: {0}")]
    Signing(String),

    /// No wallet connected
    #[error("Wallet not connected")]
    NotConnected,

    /// Borsh serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, ChainDepthSdkError>;

/// Coarse failure taxonomy carried by every transaction outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No wallet or session signer available. Never retried.
    NotConnected,
    /// A required remote account does not exist yet.
    NotInitialized,
    /// Timeouts, rate limits, malformed responses.
    TransientTransport,
    /// Numeric on-chain rejection.
    ProgramRejected,
    /// The fee payer cannot cover fees or rent.
    FundingInsufficient,
    /// Account data present but not decodable with the local layout.
    DecodeIncompatible,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotConnected => "not_connected",
            FailureKind::NotInitialized => "not_initialized",
            FailureKind::TransientTransport => "transient_transport",
            FailureKind::ProgramRejected => "program_rejected",
            FailureKind::FundingInsufficient => "funding_insufficient",
            FailureKind::DecodeIncompatible => "decode_incompatible",
            FailureKind::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
