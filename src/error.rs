//! Error types for the auction liquidator.
//!
//! Timing drift and pauses are not errors: the scheduler reports them as
//! outcomes. Everything here either aborts the triggering operation or
//! reports a failed collaborator call.

use thiserror::Error;

/// Result type alias for liquidator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the auction liquidator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Scheduling Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Timestamp arithmetic left the representable range
    #[error("Time out of range: {operation}")]
    TimeOutOfRange {
        /// Operation that over- or underflowed
        operation: String,
    },

    /// Auction schedule is internally inconsistent
    #[error("Invalid auction schedule: start {start_time} after end {end_time}")]
    InvalidSchedule {
        /// Declared start time
        start_time: u64,
        /// Declared end time
        end_time: u64,
    },

    /// Timer gateway call failed
    #[error("Timer service error: {0}")]
    Timer(String),

    /// Auction house call failed
    #[error("Auctioneer error: {0}")]
    Auctioneer(String),

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Candidate vault cannot enter liquidation
    #[error("Malformed liquidation candidate {vault}: {reason}")]
    MalformedCandidate {
        /// Vault identifier
        vault: String,
        /// Why the candidate was rejected
        reason: String,
    },

    /// Amounts of different brands were combined
    #[error("Brand mismatch: expected {expected}, got {got}")]
    BrandMismatch {
        /// Expected brand
        expected: String,
        /// Actual brand
        got: String,
    },

    /// Custody seat does not exist
    #[error("Seat not found: {0}")]
    SeatNotFound(String),

    /// Seat allocation cannot cover a transfer
    #[error("Insufficient allocation on {seat}: required {required}, available {available}")]
    InsufficientAllocation {
        /// Seat that was short
        seat: String,
        /// Required amount
        required: u64,
        /// Available amount
        available: u64,
    },

    /// Custody transfer primitive failed
    #[error("Custody error: {0}")]
    Custody(String),

    // ═══════════════════════════════════════════════════════════════════
    // Accounting Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Invariant violation detected
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ═══════════════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Configuration could not be loaded or saved
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true if retrying the triggering operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timer(_)
                | Error::Auctioneer(_)
                | Error::Custody(_)
                | Error::InsufficientAllocation { .. }
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::InvariantViolation(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Scheduling errors: 1xxx
            Error::TimeOutOfRange { .. } => 1001,
            Error::InvalidSchedule { .. } => 1002,
            Error::Timer(_) => 1003,
            Error::Auctioneer(_) => 1004,

            // Liquidation errors: 2xxx
            Error::MalformedCandidate { .. } => 2001,
            Error::BrandMismatch { .. } => 2002,
            Error::SeatNotFound(_) => 2003,
            Error::InsufficientAllocation { .. } => 2004,
            Error::Custody(_) => 2005,

            // Accounting errors: 3xxx
            Error::Overflow { .. } => 3001,
            Error::Underflow { .. } => 3002,
            Error::InvariantViolation(_) => 3003,

            // Configuration errors: 4xxx
            Error::InvalidParameter { .. } => 4001,
            Error::Config(_) => 4002,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Config(err.to_string())
    }
}
