//! Sub-transaction identifiers and per-sub-transaction state.

use serde::{Deserialize, Serialize};

use crate::errors::FailureReason;

/// Logical identifier for one of the three Bitcoin-side sub-transactions
/// within a swap session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum SubTxId {
    /// Pays the contract output.
    Lock,
    /// Returns the locked funds to the owner after the lock height.
    Refund,
    /// Claims the locked funds with the revealed secret.
    Redeem,
}

impl SubTxId {
    /// All sub-transaction identifiers, in pipeline order.
    pub const ALL: [SubTxId; 3] = [SubTxId::Lock, SubTxId::Refund, SubTxId::Redeem];

    /// Stable lowercase name, used in logs and persisted keys.
    pub fn name(&self) -> &'static str {
        match self {
            SubTxId::Lock => "lock",
            SubTxId::Refund => "refund",
            SubTxId::Redeem => "redeem",
        }
    }
}

impl std::fmt::Display for SubTxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State of a single sub-transaction pipeline.
///
/// Every transition is driven by the side controller and persisted to the
/// session store before the next suspension point, so a pipeline can be
/// resumed from any state after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SwapTxState {
    /// Nothing has happened yet.
    #[default]
    Initial,
    /// Building the raw transaction (create / fund).
    CreatingTx,
    /// Waiting for the transaction to be signed.
    SigningTx,
    /// Fully signed raw transaction is stored.
    Constructed,
    /// Broadcast has been issued.
    Registration,
    /// Waiting for confirmations.
    Confirmation,
    /// Pipeline finished successfully.
    Completed,
    /// Unrecoverable failure; no further node calls are made.
    Failed,
}

impl SwapTxState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SwapTxState::Completed | SwapTxState::Failed)
    }

    /// Whether the raw transaction is still being assembled.
    pub fn is_building(&self) -> bool {
        matches!(
            self,
            SwapTxState::Initial | SwapTxState::CreatingTx | SwapTxState::SigningTx
        )
    }
}

/// Everything the engine persists for one sub-transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTxRecord {
    /// Pipeline state.
    pub state: SwapTxState,
    /// Raw transaction hex, once constructed.
    pub raw_tx: Option<String>,
    /// Transaction id, once broadcast (or learned from the counterparty).
    pub txid: Option<String>,
    /// Fee rate applied, in satoshi per kvB.
    pub fee: Option<u64>,
    /// Failure code, when `state` is `Failed`.
    pub error: Option<FailureReason>,
    /// Last observed confirmation count.
    pub confirmations: u64,
    /// Destination address resolved for a withdraw, reused on retry.
    pub withdraw_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SwapTxState::Completed.is_terminal());
        assert!(SwapTxState::Failed.is_terminal());
        assert!(!SwapTxState::Registration.is_terminal());
        assert!(!SwapTxState::Initial.is_terminal());
    }

    #[test]
    fn test_building_states() {
        assert!(SwapTxState::Initial.is_building());
        assert!(SwapTxState::CreatingTx.is_building());
        assert!(SwapTxState::SigningTx.is_building());
        assert!(!SwapTxState::Constructed.is_building());
    }

    #[test]
    fn test_sub_tx_names() {
        assert_eq!(SubTxId::Lock.to_string(), "lock");
        assert_eq!(SubTxId::ALL.len(), 3);
    }

    #[test]
    fn test_record_default() {
        let record = SubTxRecord::default();
        assert_eq!(record.state, SwapTxState::Initial);
        assert!(record.raw_tx.is_none());
        assert_eq!(record.confirmations, 0);
    }
}
