//! Client orchestration core for the ChainDepth dungeon program.
//!
//! [`GameClient`] is the entry point: it owns the account cache, the
//! session delegate, the transaction executor and the transport pipeline,
//! and exposes one method per program instruction plus the door and center
//! interactions through [`InteractionResolver`].

pub mod advanced;
pub mod basic;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod executor;
pub mod extraction;
pub mod program_error;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod types;
pub mod utils;

pub use crate::advanced::instructions::{AnchorInstructionBuilder, GameInstruction, InstructionBuilder, RoomRef};
pub use crate::basic::client::{GameClient, GameClientBuilder};
pub use crate::cache::{AccountCache, Snapshots};
pub use crate::config::ClientConfig;
pub use crate::core::connection::{RpcConnection, SolConnection};
pub use crate::core::signer::{KeypairWallet, WalletProvider};
pub use crate::error::{ChainDepthSdkError, FailureKind, Result};
pub use crate::events::{EventBus, GameEvent};
pub use crate::extraction::{ExtractionSummary, ExtractionSummaryStore};
pub use crate::resolver::{InteractionPlan, InteractionResolver};
pub use crate::session::{SessionLease, SigningContext};
pub use crate::transport::{RawTransport, TransportPipeline, TxOutcome};
pub use crate::types::{CenterType, Direction, WallState};
pub use crate::utils::AddressDeriver;
