//! Capability interface to a Bitcoin full node.
//!
//! The side controller never talks to a socket itself; everything goes
//! through this trait. Production uses [`CoreRpcBridge`](crate::rpc::
//! CoreRpcBridge); tests use [`MockNodeBridge`](crate::mock::MockNodeBridge).

use async_trait::async_trait;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors a node bridge can produce.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Transport-level failure; safe to retry.
    #[error("i/o error: {0}")]
    Io(String),

    /// The node rejected the configured credentials.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The node is on a different chain than configured.
    #[error("invalid genesis block: expected {expected}, got {got}")]
    InvalidGenesisBlock {
        /// Configured chain.
        expected: String,
        /// Chain reported by the node.
        got: String,
    },

    /// The node returned nothing where a value was required.
    #[error("empty result")]
    EmptyResult,

    /// The wallet cannot fund the transaction.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The node's response could not be decoded.
    #[error("invalid result format: {0}")]
    InvalidResultFormat(String),

    /// Anything else.
    #[error("bridge error: {0}")]
    Other(String),
}

impl BridgeError {
    /// Whether a retry on the next tick may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Io(_))
    }
}

/// Input reference for `create_raw_transaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTxIn {
    /// Funding transaction id, display order hex.
    pub txid: String,
    /// Output index being spent.
    pub vout: u32,
}

/// Result of `get_tx_out`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutInfo {
    /// scriptPubKey of the output, hex encoded.
    pub script_pubkey: String,
    /// Output value in satoshi.
    pub value: u64,
    /// Confirmations of the containing transaction.
    pub confirmations: u64,
}

/// Asynchronous capability set of a Bitcoin full node.
///
/// The controller issues at most one request per (sub-tx, step) at a time;
/// implementations may assume no concurrent calls for the same session.
#[async_trait]
pub trait NodeBridge: Send + Sync {
    /// Fetch a fresh change address from the node wallet.
    async fn get_raw_change_address(&self) -> Result<String>;

    /// Add inputs and a change output so the transaction pays for itself.
    ///
    /// `fee_rate` is satoshi per 1000 vbytes. Returns the funded hex and
    /// the change output position (`-1` when no change was added).
    async fn fund_raw_transaction(&self, tx_hex: &str, fee_rate: u64) -> Result<(String, i32)>;

    /// Sign every input the wallet has keys for.
    ///
    /// Returns the signed hex and whether the transaction is complete.
    async fn sign_raw_transaction(&self, tx_hex: &str) -> Result<(String, bool)>;

    /// Broadcast a raw transaction; returns the transaction id.
    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String>;

    /// Assemble an unsigned transaction from explicit inputs and outputs.
    ///
    /// `outputs` maps addresses to satoshi amounts; `locktime` of zero
    /// leaves the transaction immediately spendable.
    async fn create_raw_transaction(
        &self,
        inputs: &[BridgeTxIn],
        outputs: &[(String, u64)],
        locktime: u64,
    ) -> Result<String>;

    /// Export the private key for a wallet address, WIF encoded.
    async fn dump_private_key(&self, address: &str) -> Result<String>;

    /// Look up an unspent output. `Ok(None)` means the output is unknown
    /// or already spent, which is an expected answer while a transaction
    /// propagates.
    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<TxOutInfo>>;

    /// Current chain height.
    async fn get_block_count(&self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BridgeError::Io("timeout".into()).is_transient());
        assert!(!BridgeError::EmptyResult.is_transient());
        assert!(!BridgeError::InvalidCredentials("401".into()).is_transient());
    }
}
