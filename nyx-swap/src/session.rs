//! Swap session parameter store.
//!
//! The engine owns one [`SwapSession`] per swap. A second-side driver only
//! ever holds a weak reference to it: callbacks arriving after the engine has
//! dropped the session must be safely ignorable.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::FailureReason;
use crate::state::{SubTxId, SubTxRecord, SwapTxState};

/// Unique identifier of a swap session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwapSessionId(pub String);

impl SwapSessionId {
    /// Create a new session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SwapSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable parameters fixed when the swap is negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSessionParams {
    /// Whether this side owns (locks) the external-chain funds.
    pub is_bitcoin_owner: bool,
    /// Amount to lock, in satoshi.
    pub amount: u64,
    /// Counterparty response window, in native-chain blocks.
    pub peer_response_time: u64,
    /// Overall swap window, in native-chain blocks.
    pub lifetime: u64,
    /// Native-chain height at swap start.
    pub min_tx_acceptance_height: u64,
}

#[derive(Debug)]
struct SessionData {
    params: SwapSessionParams,
    secret: Option<[u8; 32]>,
    secret_hash: Option<[u8; 32]>,
    public_key_a: Option<String>,
    public_key_b: Option<String>,
    swap_address: Option<String>,
    external_lock_time: Option<u64>,
    native_height: u64,
    sub_txs: BTreeMap<SubTxId, SubTxRecord>,
    created_at: i64,
    updated_at: i64,
}

/// Parameter store for one swap, keyed by sub-transaction id.
///
/// All mutation goes through [`SwapSession::update_sub_tx`] and the typed
/// setters, so a driver transition is always a function of the previous
/// store contents and the newly written values.
pub struct SwapSession {
    id: SwapSessionId,
    data: RwLock<SessionData>,
}

impl SwapSession {
    /// Create a fresh session.
    pub fn new(id: SwapSessionId, params: SwapSessionParams) -> Self {
        let now = chrono::Utc::now().timestamp();
        let mut sub_txs = BTreeMap::new();
        for sub_tx in SubTxId::ALL {
            sub_txs.insert(sub_tx, SubTxRecord::default());
        }
        Self {
            id,
            data: RwLock::new(SessionData {
                params,
                secret: None,
                secret_hash: None,
                public_key_a: None,
                public_key_b: None,
                swap_address: None,
                external_lock_time: None,
                native_height: 0,
                sub_txs,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    /// Rebuild a session from persisted sub-transaction records.
    ///
    /// Records for unknown session ids are ignored. Negotiated values that
    /// are not part of the per-sub-tx persistence (keys, lock time, secret
    /// hash) must be re-applied by the engine through the typed setters.
    pub fn restore(
        id: SwapSessionId,
        params: SwapSessionParams,
        records: Vec<PersistedSubTx>,
    ) -> Self {
        let session = Self::new(id, params);
        {
            let mut data = session.data.write();
            for record in records {
                if record.session_id != session.id.0 {
                    continue;
                }
                data.sub_txs.insert(
                    record.sub_tx_id,
                    SubTxRecord {
                        state: record.state,
                        raw_tx: record.raw_tx,
                        txid: record.txid,
                        fee: record.fee,
                        error: record.error,
                        confirmations: record.confirmations,
                        withdraw_address: record.withdraw_address,
                    },
                );
            }
        }
        session
    }

    /// Session id.
    pub fn id(&self) -> &SwapSessionId {
        &self.id
    }

    /// Whether this side owns the external-chain funds.
    pub fn is_bitcoin_owner(&self) -> bool {
        self.data.read().params.is_bitcoin_owner
    }

    /// Swap amount in satoshi.
    pub fn amount(&self) -> u64 {
        self.data.read().params.amount
    }

    /// Counterparty response window, in native-chain blocks.
    pub fn peer_response_time(&self) -> u64 {
        self.data.read().params.peer_response_time
    }

    /// Overall swap window, in native-chain blocks.
    pub fn lifetime(&self) -> u64 {
        self.data.read().params.lifetime
    }

    /// Native-chain height at swap start.
    pub fn min_tx_acceptance_height(&self) -> u64 {
        self.data.read().params.min_tx_acceptance_height
    }

    /// Latest native-chain height reported by the engine.
    pub fn native_height(&self) -> u64 {
        self.data.read().native_height
    }

    /// Record the current native-chain height; called by the engine on tick.
    pub fn set_native_height(&self, height: u64) {
        let mut data = self.data.write();
        data.native_height = height;
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// The swap secret, if known to this side.
    pub fn secret(&self) -> Option<[u8; 32]> {
        self.data.read().secret
    }

    /// Store the swap secret.
    pub fn set_secret(&self, secret: [u8; 32]) {
        let mut data = self.data.write();
        data.secret = Some(secret);
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Hash lock committed in the contract.
    pub fn secret_hash(&self) -> Option<[u8; 32]> {
        self.data.read().secret_hash
    }

    /// Store the hash lock.
    pub fn set_secret_hash(&self, hash: [u8; 32]) {
        let mut data = self.data.write();
        data.secret_hash = Some(hash);
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Refund-leg public key (hex, 33-byte compressed).
    pub fn public_key_a(&self) -> Option<String> {
        self.data.read().public_key_a.clone()
    }

    /// Set the refund-leg public key.
    pub fn set_public_key_a(&self, key: impl Into<String>) {
        let mut data = self.data.write();
        data.public_key_a = Some(key.into());
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Redeem-leg public key (hex, 33-byte compressed).
    pub fn public_key_b(&self) -> Option<String> {
        self.data.read().public_key_b.clone()
    }

    /// Set the redeem-leg public key.
    pub fn set_public_key_b(&self, key: impl Into<String>) {
        let mut data = self.data.write();
        data.public_key_b = Some(key.into());
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Address whose key this side uses on the external chain.
    pub fn swap_address(&self) -> Option<String> {
        self.data.read().swap_address.clone()
    }

    /// Persist the swap address.
    pub fn set_swap_address(&self, address: impl Into<String>) {
        let mut data = self.data.write();
        data.swap_address = Some(address.into());
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Agreed external-chain lock height.
    pub fn external_lock_time(&self) -> Option<u64> {
        self.data.read().external_lock_time
    }

    /// Store the agreed external-chain lock height.
    pub fn set_external_lock_time(&self, height: u64) {
        let mut data = self.data.write();
        data.external_lock_time = Some(height);
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Snapshot of one sub-transaction record.
    pub fn sub_tx(&self, id: SubTxId) -> SubTxRecord {
        self.data
            .read()
            .sub_txs
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutate one sub-transaction record in place.
    pub fn update_sub_tx(&self, id: SubTxId, f: impl FnOnce(&mut SubTxRecord)) {
        let mut data = self.data.write();
        f(data.sub_txs.entry(id).or_default());
        data.updated_at = chrono::Utc::now().timestamp();
    }

    /// Whether any sub-transaction has failed.
    pub fn has_failed_sub_tx(&self) -> bool {
        self.data
            .read()
            .sub_txs
            .values()
            .any(|record| record.state == SwapTxState::Failed)
    }

    /// Creation timestamp (unix seconds).
    pub fn created_at(&self) -> i64 {
        self.data.read().created_at
    }

    /// Last-update timestamp (unix seconds).
    pub fn updated_at(&self) -> i64 {
        self.data.read().updated_at
    }

    /// Serializable view of all sub-transaction records, keyed by
    /// (session id, sub-tx id).
    pub fn persisted(&self) -> Vec<PersistedSubTx> {
        let data = self.data.read();
        data.sub_txs
            .iter()
            .map(|(sub_tx_id, record)| PersistedSubTx {
                session_id: self.id.0.clone(),
                sub_tx_id: *sub_tx_id,
                state: record.state,
                raw_tx: record.raw_tx.clone(),
                txid: record.txid.clone(),
                fee: record.fee,
                error: record.error,
                confirmations: record.confirmations,
                withdraw_address: record.withdraw_address.clone(),
            })
            .collect()
    }
}

impl std::fmt::Debug for SwapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("SwapSession")
            .field("id", &self.id)
            .field("params", &data.params)
            .field("has_secret", &data.secret.is_some())
            .field("external_lock_time", &data.external_lock_time)
            .field("sub_txs", &data.sub_txs)
            .finish()
    }
}

/// One persisted sub-transaction row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSubTx {
    /// Owning session.
    pub session_id: String,
    /// Sub-transaction key.
    pub sub_tx_id: SubTxId,
    /// Pipeline state.
    pub state: SwapTxState,
    /// Raw transaction hex.
    pub raw_tx: Option<String>,
    /// Transaction id.
    pub txid: Option<String>,
    /// Applied fee rate, in satoshi per kvB.
    pub fee: Option<u64>,
    /// Failure code.
    pub error: Option<FailureReason>,
    /// Observed confirmations.
    pub confirmations: u64,
    /// Withdraw destination address.
    pub withdraw_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params(owner: bool) -> SwapSessionParams {
        SwapSessionParams {
            is_bitcoin_owner: owner,
            amount: 200_000,
            peer_response_time: 5,
            lifetime: 20,
            min_tx_acceptance_height: 50,
        }
    }

    #[test]
    fn test_new_session_has_initial_records() {
        let session = SwapSession::new(SwapSessionId::new("s1"), test_params(true));
        for sub_tx in SubTxId::ALL {
            assert_eq!(session.sub_tx(sub_tx).state, SwapTxState::Initial);
        }
        assert!(session.secret().is_none());
        assert!(session.external_lock_time().is_none());
    }

    #[test]
    fn test_update_sub_tx() {
        let session = SwapSession::new(SwapSessionId::new("s1"), test_params(true));
        session.update_sub_tx(SubTxId::Lock, |record| {
            record.state = SwapTxState::Constructed;
            record.raw_tx = Some("deadbeef".into());
        });

        let record = session.sub_tx(SubTxId::Lock);
        assert_eq!(record.state, SwapTxState::Constructed);
        assert_eq!(record.raw_tx.as_deref(), Some("deadbeef"));
        // Other records are untouched.
        assert_eq!(session.sub_tx(SubTxId::Refund).state, SwapTxState::Initial);
    }

    #[test]
    fn test_persist_restore_roundtrip() {
        let session = SwapSession::new(SwapSessionId::new("s1"), test_params(true));
        session.update_sub_tx(SubTxId::Lock, |record| {
            record.state = SwapTxState::Registration;
            record.txid = Some("aa".repeat(32));
            record.fee = Some(1000);
        });
        session.update_sub_tx(SubTxId::Refund, |record| {
            record.withdraw_address = Some("addr".into());
        });

        let rows = session.persisted();
        assert_eq!(rows.len(), 3);

        let json = serde_json::to_string(&rows).unwrap();
        let rows_back: Vec<PersistedSubTx> = serde_json::from_str(&json).unwrap();

        let restored =
            SwapSession::restore(SwapSessionId::new("s1"), test_params(true), rows_back);
        assert_eq!(
            restored.sub_tx(SubTxId::Lock).txid,
            session.sub_tx(SubTxId::Lock).txid
        );
        assert_eq!(
            restored.sub_tx(SubTxId::Refund).withdraw_address.as_deref(),
            Some("addr")
        );
    }

    #[test]
    fn test_restore_skips_foreign_sessions() {
        let other = SwapSession::new(SwapSessionId::new("other"), test_params(true));
        other.update_sub_tx(SubTxId::Lock, |record| {
            record.state = SwapTxState::Completed;
        });

        let restored = SwapSession::restore(
            SwapSessionId::new("mine"),
            test_params(false),
            other.persisted(),
        );
        assert_eq!(restored.sub_tx(SubTxId::Lock).state, SwapTxState::Initial);
    }

    #[test]
    fn test_failed_flag() {
        let session = SwapSession::new(SwapSessionId::new("s1"), test_params(true));
        assert!(!session.has_failed_sub_tx());

        session.update_sub_tx(SubTxId::Redeem, |record| {
            record.state = SwapTxState::Failed;
            record.error = Some(FailureReason::FailToRegister);
        });
        assert!(session.has_failed_sub_tx());
    }
}
