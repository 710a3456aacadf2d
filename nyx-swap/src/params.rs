//! Typed wire parameters exchanged with the counterparty.
//!
//! The engine attaches these to the outgoing swap message; the peer's engine
//! feeds the received values back into its own session store.

use serde::{Deserialize, Serialize};

use crate::state::SubTxId;

/// Identifier of a swap wire parameter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ParameterId {
    /// 33-byte compressed public key of the sending side.
    AtomicSwapPublicKey,
    /// Agreed external-chain lock height.
    AtomicSwapExternalLockTime,
    /// Swap amount in the external chain's base unit.
    AtomicSwapAmount,
    /// Native-chain height at swap start.
    AtomicSwapMinHeight,
    /// Raw hex of a sub-transaction.
    AtomicSwapExternalTx(SubTxId),
    /// Transaction id of a sub-transaction.
    AtomicSwapExternalTxId(SubTxId),
}

/// Value of a swap wire parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterValue {
    /// Compressed public key, hex encoded.
    PublicKey(String),
    /// Block height.
    Height(u64),
    /// Amount in base units.
    Amount(u64),
    /// Raw transaction hex.
    RawTx(String),
    /// Transaction id, display order hex.
    TxId(String),
}

/// Ordered set of outgoing wire parameters.
///
/// Setting a parameter twice replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingParams {
    entries: Vec<(ParameterId, ParameterValue)>,
}

impl OutgoingParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, replacing any existing value for the same id.
    pub fn set(&mut self, id: ParameterId, value: ParameterValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == id) {
            entry.1 = value;
        } else {
            self.entries.push((id, value));
        }
    }

    /// Look up a parameter.
    pub fn get(&self, id: ParameterId) -> Option<&ParameterValue> {
        self.entries.iter().find(|(k, _)| *k == id).map(|(_, v)| v)
    }

    /// Iterate over all parameters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(ParameterId, ParameterValue)> {
        self.entries.iter()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let mut params = OutgoingParams::new();
        params.set(ParameterId::AtomicSwapAmount, ParameterValue::Amount(100));
        params.set(ParameterId::AtomicSwapAmount, ParameterValue::Amount(200));

        assert_eq!(params.len(), 1);
        assert_eq!(
            params.get(ParameterId::AtomicSwapAmount),
            Some(&ParameterValue::Amount(200))
        );
    }

    #[test]
    fn test_per_sub_tx_keys_are_distinct() {
        let mut params = OutgoingParams::new();
        params.set(
            ParameterId::AtomicSwapExternalTxId(SubTxId::Lock),
            ParameterValue::TxId("aa".into()),
        );
        params.set(
            ParameterId::AtomicSwapExternalTxId(SubTxId::Refund),
            ParameterValue::TxId("bb".into()),
        );

        assert_eq!(params.len(), 2);
        assert_eq!(
            params.get(ParameterId::AtomicSwapExternalTxId(SubTxId::Lock)),
            Some(&ParameterValue::TxId("aa".into()))
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut params = OutgoingParams::new();
        params.set(
            ParameterId::AtomicSwapPublicKey,
            ParameterValue::PublicKey("02ab".into()),
        );
        params.set(ParameterId::AtomicSwapExternalLockTime, ParameterValue::Height(114));

        let json = serde_json::to_string(&params).unwrap();
        let back: OutgoingParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
