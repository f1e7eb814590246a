//! Program error taxonomy and RPC failure-reason parsing.
//!
//! The dungeon program reports rejections as Anchor custom errors. The only
//! structured signal that survives the RPC layer is the
//! `custom program error: 0x..` fragment inside the free-text reason, so
//! everything here works on reason strings.

/// Custom errors raised by the dungeon program (Anchor offset 6000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProgramErrorKind {
    NotAdjacent = 6000,
    WallNotOpen = 6001,
    OutOfBounds = 6002,
    InvalidDirection = 6003,
    NotRubble = 6004,
    AlreadyJoined = 6005,
    JobFull = 6006,
    NotHelper = 6007,
    JobNotReady = 6008,
    NoActiveJob = 6009,
    TooManyActiveJobs = 6010,
    NoChest = 6011,
    AlreadyLooted = 6012,
    NotInRoom = 6013,
    SeasonNotEnded = 6014,
    Unauthorized = 6015,
    InsufficientBalance = 6016,
    TransferFailed = 6017,
    Overflow = 6018,
    JobAlreadyCompleted = 6019,
    JobNotCompleted = 6020,
    InventoryFull = 6021,
    InvalidItemId = 6022,
    InvalidItemAmount = 6023,
    InsufficientItemAmount = 6024,
    NoBoss = 6025,
    AlreadyFightingBoss = 6026,
    NotBossFighter = 6027,
    BossAlreadyDefeated = 6028,
    BossNotDefeated = 6029,
    PlayerDead = 6030,
    DisplayNameTooLong = 6031,
    SessionExpired = 6032,
    SessionInactive = 6033,
    SessionInstructionNotAllowed = 6034,
    SessionSpendCapExceeded = 6035,
    InvalidSessionExpiry = 6036,
    InvalidSessionAllowlist = 6037,
    CannotExitWithActiveJobs = 6038,
    NotAtEntranceRoom = 6039,
    EntranceStairsRequired = 6040,
    WallNotLocked = 6041,
    InvalidLockKind = 6042,
    MissingRequiredKey = 6043,
    InvalidSeason = 6044,
    TreasuryInsufficientFunds = 6045,
}

impl ProgramErrorKind {
    const ALL: [ProgramErrorKind; 46] = [
        Self::NotAdjacent,
        Self::WallNotOpen,
        Self::OutOfBounds,
        Self::InvalidDirection,
        Self::NotRubble,
        Self::AlreadyJoined,
        Self::JobFull,
        Self::NotHelper,
        Self::JobNotReady,
        Self::NoActiveJob,
        Self::TooManyActiveJobs,
        Self::NoChest,
        Self::AlreadyLooted,
        Self::NotInRoom,
        Self::SeasonNotEnded,
        Self::Unauthorized,
        Self::InsufficientBalance,
        Self::TransferFailed,
        Self::Overflow,
        Self::JobAlreadyCompleted,
        Self::JobNotCompleted,
        Self::InventoryFull,
        Self::InvalidItemId,
        Self::InvalidItemAmount,
        Self::InsufficientItemAmount,
        Self::NoBoss,
        Self::AlreadyFightingBoss,
        Self::NotBossFighter,
        Self::BossAlreadyDefeated,
        Self::BossNotDefeated,
        Self::PlayerDead,
        Self::DisplayNameTooLong,
        Self::SessionExpired,
        Self::SessionInactive,
        Self::SessionInstructionNotAllowed,
        Self::SessionSpendCapExceeded,
        Self::InvalidSessionExpiry,
        Self::InvalidSessionAllowlist,
        Self::CannotExitWithActiveJobs,
        Self::NotAtEntranceRoom,
        Self::EntranceStairsRequired,
        Self::WallNotLocked,
        Self::InvalidLockKind,
        Self::MissingRequiredKey,
        Self::InvalidSeason,
        Self::TreasuryInsufficientFunds,
    ];

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// True when the error is about the session authority itself rather
    /// than the gameplay action it was signing.
    pub fn is_session_error(self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::SessionInactive
                | Self::SessionInstructionNotAllowed
                | Self::SessionSpendCapExceeded
        )
    }
}

impl std::fmt::Display for ProgramErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

//=============================================================================
// Anchor Framework Errors
//=============================================================================

pub const ANCHOR_CONSTRAINT_SEEDS: u32 = 2006;
pub const ANCHOR_DISCRIMINATOR_ALREADY_SET: u32 = 3000;
pub const ANCHOR_DISCRIMINATOR_NOT_FOUND: u32 = 3001;
pub const ANCHOR_DISCRIMINATOR_MISMATCH: u32 = 3002;
pub const ANCHOR_DID_NOT_DESERIALIZE: u32 = 3003;
pub const ANCHOR_DID_NOT_SERIALIZE: u32 = 3004;
pub const ANCHOR_ACCOUNT_NOT_INITIALIZED: u32 = 3012;

pub fn anchor_error_message(code: u32) -> Option<&'static str> {
    match code {
        ANCHOR_CONSTRAINT_SEEDS => Some("Constraint seeds mismatch (PDA derivation differs)."),
        ANCHOR_DISCRIMINATOR_ALREADY_SET => Some("Account discriminator already set."),
        ANCHOR_DISCRIMINATOR_NOT_FOUND => Some("Account discriminator not found."),
        ANCHOR_DISCRIMINATOR_MISMATCH => Some("Account discriminator mismatch."),
        ANCHOR_DID_NOT_DESERIALIZE => {
            Some("Account did not deserialize (layout changed or stale account).")
        },
        ANCHOR_DID_NOT_SERIALIZE => Some("Account did not serialize."),
        ANCHOR_ACCOUNT_NOT_INITIALIZED => Some("Account not initialized."),
        _ => None,
    }
}

//=============================================================================
// Reason Parsing
//=============================================================================

const CUSTOM_ERROR_MARKER: &str = "custom program error: 0x";

/// Extract the hex code from a `custom program error: 0x..` fragment.
/// The marker match is case-insensitive.
pub fn extract_custom_error_code(reason: &str) -> Option<u32> {
    let lowered = reason.to_ascii_lowercase();
    let start = lowered.find(CUSTOM_ERROR_MARKER)? + CUSTOM_ERROR_MARKER.len();
    let digits: String = lowered[start..]
        .chars()
        .take_while(|c| c.is_ascii_hexdigit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok()
}

/// Short suffix naming a program error code for user-facing messages.
pub fn format_program_error(code: Option<u32>) -> String {
    let Some(code) = code else {
        return String::new();
    };
    if let Some(kind) = ProgramErrorKind::from_code(code) {
        return format!(" [program: {} (0x{:X})]", kind, code);
    }
    if let Some(message) = anchor_error_message(code) {
        return format!(" [anchor: {} (0x{:X})]", message, code);
    }
    format!(" [error: 0x{:X}]", code)
}

const TRANSIENT_MARKERS: [&str; 9] = [
    "unable to parse json",
    "header part of a frame could not be read",
    "timed out",
    "timeout",
    "429",
    "too many requests",
    "gateway",
    "temporarily unavailable",
    "connection reset",
];

const FUNDING_MARKERS: [&str; 5] = [
    "insufficientfundsforrent",
    "insufficient funds for rent",
    "insufficient funds for fee",
    "insufficient lamports",
    "insufficient funds",
];

const PARSE_FAILURE_MARKERS: [&str; 3] = [
    "unable to parse json",
    "invalid type:",
    "expected value at line",
];

pub fn is_transient_reason(reason: &str) -> bool {
    if reason.trim().is_empty() {
        return true;
    }
    let lowered = reason.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Transient failure that did not come from the program.
pub fn is_rpc_transport_failure(reason: &str) -> bool {
    is_transient_reason(reason) && !reason.to_ascii_lowercase().contains("custom program error")
}

pub fn is_funding_failure(reason: &str) -> bool {
    let lowered = reason.to_ascii_lowercase();
    FUNDING_MARKERS.iter().any(|m| lowered.contains(m))
}

/// The structured client rejected the response body itself.
pub fn is_response_parse_failure(reason: &str) -> bool {
    let lowered = reason.to_ascii_lowercase();
    PARSE_FAILURE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Diagnostic bucket for a failure reason. Logged, never shown to players.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    WalletSimulationUnpredictableBalance,
    ProgramError,
    RpcConnectionRefused,
    RpcJsonParse,
    RpcTimeout,
    Other,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WalletSimulationUnpredictableBalance => "wallet_simulation_unpredictable_balance",
            Self::ProgramError => "program_error",
            Self::RpcConnectionRefused => "rpc_connection_refused",
            Self::RpcJsonParse => "rpc_json_parse",
            Self::RpcTimeout => "rpc_timeout",
            Self::Other => "other",
        }
    }
}

pub fn classify_failure_reason(reason: &str) -> FailureCategory {
    let lowered = reason.to_ascii_lowercase();
    if lowered.contains("balance changes") || lowered.contains("unpredictable") {
        FailureCategory::WalletSimulationUnpredictableBalance
    } else if lowered.contains("custom program error") {
        FailureCategory::ProgramError
    } else if lowered.contains("connection refused") {
        FailureCategory::RpcConnectionRefused
    } else if lowered.contains("unable to parse json") {
        FailureCategory::RpcJsonParse
    } else if lowered.contains("timed out") || lowered.contains("timeout") {
        FailureCategory::RpcTimeout
    } else {
        FailureCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hex_code_case_insensitively() {
        let reason = "Transaction simulation failed: Error processing Instruction 0: Custom Program Error: 0x1775";
        assert_eq!(extract_custom_error_code(reason), Some(0x1775));
        assert_eq!(
            ProgramErrorKind::from_code(0x1775),
            Some(ProgramErrorKind::AlreadyJoined)
        );
    }

    #[test]
    fn missing_marker_yields_no_code() {
        assert_eq!(extract_custom_error_code("blockhash not found"), None);
        assert_eq!(extract_custom_error_code("custom program error: 0x"), None);
    }

    #[test]
    fn formats_program_anchor_and_unknown_codes() {
        assert_eq!(
            format_program_error(Some(6009)),
            " [program: NoActiveJob (0x1779)]"
        );
        assert_eq!(
            format_program_error(Some(3012)),
            " [anchor: Account not initialized. (0xBC4)]"
        );
        assert_eq!(format_program_error(Some(1)), " [error: 0x1]");
        assert_eq!(format_program_error(None), "");
    }

    #[test]
    fn program_errors_are_never_transport_failures() {
        let reason = "gateway relay: custom program error: 0x1771";
        assert!(is_transient_reason(reason));
        assert!(!is_rpc_transport_failure(reason));
        assert!(is_rpc_transport_failure("HTTP status 429 Too Many Requests"));
        assert!(is_rpc_transport_failure(""));
    }

    #[test]
    fn classifies_reasons() {
        assert_eq!(
            classify_failure_reason("error sending request: connection refused"),
            FailureCategory::RpcConnectionRefused
        );
        assert_eq!(
            classify_failure_reason("custom program error: 0x1770"),
            FailureCategory::ProgramError
        );
        assert!(is_funding_failure(
            "Transaction results in an account (0) with insufficient funds for rent"
        ));
    }
}
