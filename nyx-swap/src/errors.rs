//! Error types for the swap layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for swap operations.
pub type Result<T> = std::result::Result<T, SwapError>;

/// Errors surfaced by a second-side driver to the swap engine.
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    /// Initial inputs are invalid (amount below minimum, missing keys).
    #[error("failed to start swap: {0}")]
    FailToStartSwap(String),

    /// The node returned a malformed transaction or signing did not complete.
    #[error("malformed swap transaction: {0}")]
    FormatIncorrect(String),

    /// The lock output amount or script does not match the commitments.
    #[error("invalid swap amount: {0}")]
    InvalidAmount(String),

    /// The node rejected a transaction broadcast.
    #[error("failed to register transaction: {0}")]
    FailToRegister(String),

    /// Generic second-side bridge failure.
    #[error("second side bridge error: {0}")]
    SecondSideBridgeError(String),

    /// The node rejected the configured credentials.
    #[error("invalid node credentials")]
    InvalidCredentials,

    /// The node returned an empty result where one was required.
    #[error("node returned an empty result")]
    EmptyResult,
}

impl SwapError {
    /// Compact failure code recorded on the sub-transaction.
    pub fn reason(&self) -> FailureReason {
        match self {
            SwapError::FailToStartSwap(_) => FailureReason::FailToStartSwap,
            SwapError::FormatIncorrect(_) => FailureReason::FormatIncorrect,
            SwapError::InvalidAmount(_) => FailureReason::InvalidAmount,
            SwapError::FailToRegister(_) => FailureReason::FailToRegister,
            SwapError::SecondSideBridgeError(_) => FailureReason::SecondSideBridgeError,
            SwapError::InvalidCredentials => FailureReason::InvalidCredentials,
            SwapError::EmptyResult => FailureReason::EmptyResult,
        }
    }
}

/// Persistable failure code for a sub-transaction.
///
/// This is the error vocabulary the engine stores and shows to the user;
/// [`SwapError`] carries the human-readable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Swap could not be started.
    FailToStartSwap,
    /// Malformed transaction data.
    FormatIncorrect,
    /// Amount or script mismatch.
    InvalidAmount,
    /// Broadcast rejected.
    FailToRegister,
    /// Bridge failure.
    SecondSideBridgeError,
    /// Credentials rejected.
    InvalidCredentials,
    /// Empty node response.
    EmptyResult,
}

impl From<FailureReason> for SwapError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::FailToStartSwap => {
                SwapError::FailToStartSwap("recorded failure".into())
            }
            FailureReason::FormatIncorrect => {
                SwapError::FormatIncorrect("recorded failure".into())
            }
            FailureReason::InvalidAmount => SwapError::InvalidAmount("recorded failure".into()),
            FailureReason::FailToRegister => SwapError::FailToRegister("recorded failure".into()),
            FailureReason::SecondSideBridgeError => {
                SwapError::SecondSideBridgeError("recorded failure".into())
            }
            FailureReason::InvalidCredentials => SwapError::InvalidCredentials,
            FailureReason::EmptyResult => SwapError::EmptyResult,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::FailToStartSwap => "fail-to-start-swap",
            FailureReason::FormatIncorrect => "format-incorrect",
            FailureReason::InvalidAmount => "invalid-amount",
            FailureReason::FailToRegister => "fail-to-register",
            FailureReason::SecondSideBridgeError => "second-side-bridge-error",
            FailureReason::InvalidCredentials => "invalid-credentials",
            FailureReason::EmptyResult => "empty-result",
        };
        write!(f, "{}", name)
    }
}
