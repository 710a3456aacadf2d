//! Deterministic in-memory node for tests and development.
//!
//! Simulates the small slice of a Bitcoin Core wallet the swap driver
//! needs: one key, a funded wallet, a broadcast set, and a block height
//! that tests advance by hand.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::blockdata::script::{Builder, PushBytesBuf, ScriptBuf};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{
    transaction, Address, Amount, NetworkKind, OutPoint, PrivateKey, Sequence, Transaction, TxIn,
    TxOut, Txid, Witness,
};
use parking_lot::{Mutex, RwLock};

use crate::bridge::{BridgeError, BridgeTxIn, NodeBridge, Result, TxOutInfo};

/// Value of the synthetic UTXO `fund_raw_transaction` spends.
const MOCK_FUNDING_VALUE: u64 = 1_000_000;

/// In-memory [`NodeBridge`] with hand-driven block production.
pub struct MockNodeBridge {
    key: PrivateKey,
    height: AtomicU64,
    /// Broadcast transactions with the height they were accepted at.
    txs: RwLock<HashMap<Txid, (Transaction, u64)>>,
    broadcasts: AtomicU64,
    fund_counter: AtomicU64,
    fail_next: Mutex<Option<BridgeError>>,
    sign_complete: AtomicBool,
}

impl MockNodeBridge {
    /// Create a mock node at height 100.
    pub fn new() -> Self {
        Self::at_height(100)
    }

    /// Create a mock node at a given height.
    pub fn at_height(height: u64) -> Self {
        Self {
            key: PrivateKey::new(
                SecretKey::from_slice(&[0x5a; 32]).expect("constant key"),
                NetworkKind::Test,
            ),
            height: AtomicU64::new(height),
            txs: RwLock::new(HashMap::new()),
            broadcasts: AtomicU64::new(0),
            fund_counter: AtomicU64::new(0),
            fail_next: Mutex::new(None),
            sign_complete: AtomicBool::new(true),
        }
    }

    /// The single wallet key.
    pub fn wallet_key(&self) -> PrivateKey {
        self.key
    }

    /// The wallet's legacy address.
    pub fn wallet_address(&self) -> String {
        let secp = Secp256k1::new();
        Address::p2pkh(self.key.public_key(&secp), NetworkKind::Test).to_string()
    }

    /// Mine `count` blocks.
    pub fn advance_blocks(&self, count: u64) {
        self.height.fetch_add(count, Ordering::Relaxed);
    }

    /// Set the chain height.
    pub fn set_block_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    /// How many `send_raw_transaction` calls were accepted.
    pub fn broadcast_count(&self) -> u64 {
        self.broadcasts.load(Ordering::Relaxed)
    }

    /// Fetch a broadcast transaction by display-order txid.
    pub fn transaction(&self, txid: &str) -> Option<Transaction> {
        let txid = Txid::from_str(txid).ok()?;
        self.txs.read().get(&txid).map(|(tx, _)| tx.clone())
    }

    /// Make the next bridge call fail with `error`.
    pub fn fail_next(&self, error: BridgeError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Control the `complete` flag returned by `sign_raw_transaction`.
    pub fn set_sign_complete(&self, complete: bool) {
        self.sign_complete.store(complete, Ordering::Relaxed);
    }

    fn take_failure(&self) -> Result<()> {
        match self.fail_next.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn wallet_script(&self) -> ScriptBuf {
        let secp = Secp256k1::new();
        Address::p2pkh(self.key.public_key(&secp), NetworkKind::Test).script_pubkey()
    }

    fn decode(tx_hex: &str) -> Result<Transaction> {
        let bytes = hex::decode(tx_hex.trim())
            .map_err(|e| BridgeError::InvalidResultFormat(format!("tx hex: {}", e)))?;
        encode::deserialize(&bytes)
            .map_err(|e| BridgeError::InvalidResultFormat(format!("tx decode: {}", e)))
    }

    fn push(data: Vec<u8>) -> Result<PushBytesBuf> {
        PushBytesBuf::try_from(data)
            .map_err(|e| BridgeError::InvalidResultFormat(format!("push: {}", e)))
    }

    /// Whether another broadcast transaction spends the outpoint.
    fn is_spent(&self, outpoint: OutPoint) -> bool {
        self.txs
            .read()
            .values()
            .any(|(tx, _)| tx.input.iter().any(|input| input.previous_output == outpoint))
    }
}

impl Default for MockNodeBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeBridge for MockNodeBridge {
    async fn get_raw_change_address(&self) -> Result<String> {
        self.take_failure()?;
        Ok(self.wallet_address())
    }

    async fn fund_raw_transaction(&self, tx_hex: &str, _fee_rate: u64) -> Result<(String, i32)> {
        self.take_failure()?;
        let mut tx = Self::decode(tx_hex)?;

        let counter = self.fund_counter.fetch_add(1, Ordering::Relaxed);
        let mut funding = [0u8; 32];
        funding[..8].copy_from_slice(&counter.to_le_bytes());
        funding[31] = 0x77;

        tx.input.push(TxIn {
            previous_output: OutPoint::new(Txid::from_byte_array(funding), 0),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });
        tx.output.push(TxOut {
            value: Amount::from_sat(MOCK_FUNDING_VALUE),
            script_pubkey: self.wallet_script(),
        });

        let change_position = (tx.output.len() - 1) as i32;
        Ok((encode::serialize_hex(&tx), change_position))
    }

    async fn sign_raw_transaction(&self, tx_hex: &str) -> Result<(String, bool)> {
        self.take_failure()?;
        let mut tx = Self::decode(tx_hex)?;

        let secp = Secp256k1::new();
        let public_key = self.key.public_key(&secp);
        for input in &mut tx.input {
            if input.script_sig.is_empty() {
                input.script_sig = Builder::new()
                    .push_slice(Self::push(vec![0x30; 71])?)
                    .push_slice(Self::push(public_key.to_bytes())?)
                    .into_script();
            }
        }

        Ok((
            encode::serialize_hex(&tx),
            self.sign_complete.load(Ordering::Relaxed),
        ))
    }

    async fn send_raw_transaction(&self, tx_hex: &str) -> Result<String> {
        self.take_failure()?;
        let tx = Self::decode(tx_hex)?;
        let txid = tx.compute_txid();
        let height = self.height.load(Ordering::Relaxed);

        self.txs.write().insert(txid, (tx, height));
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        Ok(txid.to_string())
    }

    async fn create_raw_transaction(
        &self,
        inputs: &[BridgeTxIn],
        outputs: &[(String, u64)],
        locktime: u64,
    ) -> Result<String> {
        self.take_failure()?;

        let lock_time = if locktime == 0 {
            LockTime::ZERO
        } else {
            LockTime::from_height(locktime as u32)
                .map_err(|e| BridgeError::InvalidResultFormat(format!("locktime: {}", e)))?
        };
        // Core leaves the final-sequence bit unset whenever a locktime is
        // requested, so the locktime is actually enforceable.
        let sequence = if locktime == 0 {
            Sequence::MAX
        } else {
            Sequence::ENABLE_LOCKTIME_NO_RBF
        };

        let input = inputs
            .iter()
            .map(|input| {
                Ok(TxIn {
                    previous_output: OutPoint::new(
                        Txid::from_str(&input.txid).map_err(|e| {
                            BridgeError::InvalidResultFormat(format!("txid: {}", e))
                        })?,
                        input.vout,
                    ),
                    script_sig: ScriptBuf::new(),
                    sequence,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let output = outputs
            .iter()
            .map(|(address, value)| {
                let script_pubkey = Address::from_str(address)
                    .map_err(|e| BridgeError::InvalidResultFormat(format!("address: {}", e)))?
                    .require_network(bitcoin::Network::Regtest)
                    .map_err(|e| BridgeError::InvalidResultFormat(format!("address: {}", e)))?
                    .script_pubkey();
                Ok(TxOut {
                    value: Amount::from_sat(*value),
                    script_pubkey,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time,
            input,
            output,
        };
        Ok(encode::serialize_hex(&tx))
    }

    async fn dump_private_key(&self, _address: &str) -> Result<String> {
        self.take_failure()?;
        Ok(self.key.to_wif())
    }

    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<TxOutInfo>> {
        self.take_failure()?;
        let txid =
            Txid::from_str(txid).map_err(|e| BridgeError::InvalidResultFormat(format!("txid: {}", e)))?;

        let (output, broadcast_height) = {
            let txs = self.txs.read();
            let Some((tx, height)) = txs.get(&txid) else {
                return Ok(None);
            };
            let Some(output) = tx.output.get(vout as usize) else {
                return Ok(None);
            };
            (output.clone(), *height)
        };

        if self.is_spent(OutPoint::new(txid, vout)) {
            return Ok(None);
        }

        let confirmations = self
            .height
            .load(Ordering::Relaxed)
            .saturating_sub(broadcast_height);

        Ok(Some(TxOutInfo {
            script_pubkey: hex::encode(output.script_pubkey.as_bytes()),
            value: output.value.to_sat(),
            confirmations,
        }))
    }

    async fn get_block_count(&self) -> Result<u64> {
        self.take_failure()?;
        Ok(self.height.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fund_and_sign_produce_decodable_hex() {
        let node = MockNodeBridge::new();
        let created = node
            .create_raw_transaction(&[], &[(node.wallet_address(), 5_000)], 0)
            .await
            .unwrap();

        let (funded, change_position) = node.fund_raw_transaction(&created, 1000).await.unwrap();
        assert_eq!(change_position, 1);

        let (signed, complete) = node.sign_raw_transaction(&funded).await.unwrap();
        assert!(complete);

        let tx = MockNodeBridge::decode(&signed).unwrap();
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 2);
        assert!(!tx.input[0].script_sig.is_empty());
    }

    #[tokio::test]
    async fn test_confirmations_track_height() {
        let node = MockNodeBridge::at_height(100);
        let created = node
            .create_raw_transaction(&[], &[(node.wallet_address(), 5_000)], 0)
            .await
            .unwrap();
        let (funded, _) = node.fund_raw_transaction(&created, 1000).await.unwrap();
        let (signed, _) = node.sign_raw_transaction(&funded).await.unwrap();
        let txid = node.send_raw_transaction(&signed).await.unwrap();

        let out = node.get_tx_out(&txid, 0).await.unwrap().unwrap();
        assert_eq!(out.confirmations, 0);
        assert_eq!(out.value, 5_000);

        node.advance_blocks(6);
        let out = node.get_tx_out(&txid, 0).await.unwrap().unwrap();
        assert_eq!(out.confirmations, 6);
    }

    #[tokio::test]
    async fn test_unknown_output_is_none() {
        let node = MockNodeBridge::new();
        let missing = "11".repeat(32);
        assert!(node.get_tx_out(&missing, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_spent_output_is_none() {
        let node = MockNodeBridge::new();
        let created = node
            .create_raw_transaction(&[], &[(node.wallet_address(), 5_000)], 0)
            .await
            .unwrap();
        let (funded, _) = node.fund_raw_transaction(&created, 1000).await.unwrap();
        let (signed, _) = node.sign_raw_transaction(&funded).await.unwrap();
        let txid = node.send_raw_transaction(&signed).await.unwrap();

        // Spend output 0 of the first transaction.
        let spend = node
            .create_raw_transaction(
                &[BridgeTxIn {
                    txid: txid.clone(),
                    vout: 0,
                }],
                &[(node.wallet_address(), 4_000)],
                0,
            )
            .await
            .unwrap();
        let (spend_signed, _) = node.sign_raw_transaction(&spend).await.unwrap();
        node.send_raw_transaction(&spend_signed).await.unwrap();

        assert!(node.get_tx_out(&txid, 0).await.unwrap().is_none());
        assert_eq!(node.broadcast_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let node = MockNodeBridge::new();
        node.fail_next(BridgeError::Io("connection reset".into()));

        assert!(node.get_block_count().await.is_err());
        assert!(node.get_block_count().await.is_ok());
    }
}
