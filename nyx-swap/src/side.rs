//! The second-side driver contract.

use async_trait::async_trait;

use crate::errors::Result;
use crate::params::OutgoingParams;

/// Driver for the external-chain half of an atomic swap.
///
/// The swap engine ticks these operations as the session advances. Every
/// operation reads and writes the session parameter store only, so a tick
/// after a crash resumes exactly where the persisted state left off.
///
/// Return convention: `Ok(true)` means the operation's goal is reached,
/// `Ok(false)` means it is still in progress and the engine should tick
/// again later, and `Err` is a fatal failure already recorded on the
/// offending sub-transaction.
#[async_trait]
pub trait SecondSide: Send + Sync {
    /// Idempotent setup: load the swap keypair, generate the secret
    /// (owner side), and check the swap amount against the fee policy.
    async fn initialize(&self) -> Result<bool>;

    /// Owner side: propose the external-chain lock height.
    async fn init_lock_time(&self) -> Result<bool>;

    /// Non-owner side: validate the counterparty's proposed lock height.
    async fn validate_lock_time(&self) -> Result<bool>;

    /// Attach this side's public swap details to the outgoing message.
    fn add_tx_details(&self, params: &mut OutgoingParams);

    /// Advance the lock confirmation flow; `Ok(true)` once the
    /// confirmation threshold is reached.
    async fn confirm_lock_tx(&self) -> Result<bool>;

    /// Drive the lock pipeline; `Ok(true)` once the lock is confirmed.
    async fn send_lock_tx(&self) -> Result<bool>;

    /// Drive the refund pipeline; `Ok(true)` once the refund is broadcast.
    async fn send_refund(&self) -> Result<bool>;

    /// Drive the redeem pipeline; `Ok(true)` once the redeem is broadcast.
    async fn send_redeem(&self) -> Result<bool>;

    /// Whether the external chain has reached the agreed lock height.
    async fn is_lock_time_expired(&self) -> Result<bool>;

    /// Whether enough native-chain time remains to still lock safely.
    async fn has_enough_time_to_process_lock_tx(&self) -> Result<bool>;
}
