//! The Bitcoin swap side controller.
//!
//! Owns the per-sub-transaction state machine and translates engine ticks
//! into node bridge requests. The controller holds only a weak reference to
//! the session: a tick arriving after the engine has dropped the swap is a
//! no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bitcoin::blockdata::script::ScriptBuf;
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{PrivateKey, PublicKey};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use nyx_swap::{
    OutgoingParams, ParameterId, ParameterValue, Result, SecondSide, SubTxId, SubTxRecord,
    SwapError, SwapSession, SwapTxState,
};

use crate::bridge::{BridgeError, BridgeTxIn, NodeBridge};
use crate::contract::{self, ContractParams, WithdrawBranch};
use crate::settings::SettingsProvider;
use crate::{fees, timelock, DUST_THRESHOLD};

/// Bitcoin implementation of the second-side driver.
pub struct BitcoinSide {
    session: Weak<SwapSession>,
    bridge: Arc<dyn NodeBridge>,
    settings: Arc<dyn SettingsProvider>,
    /// Last Bitcoin height seen from the node.
    block_count: AtomicU64,
    /// Swap key, dumped from the node wallet at most once.
    swap_key: Mutex<Option<PrivateKey>>,
}

impl BitcoinSide {
    /// Create a driver for one swap session.
    pub fn new(
        session: &Arc<SwapSession>,
        bridge: Arc<dyn NodeBridge>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            session: Arc::downgrade(session),
            bridge,
            settings,
            block_count: AtomicU64::new(0),
            swap_key: Mutex::new(None),
        }
    }

    /// Bitcoin height from the most recent node round-trip.
    pub fn last_seen_block_count(&self) -> u64 {
        self.block_count.load(Ordering::Relaxed)
    }

    /// Recover the revealed secret from a transaction spending the lock
    /// output, storing it on the session for the native side to claim.
    pub fn process_lock_spend(&self, raw_tx_hex: &str) -> Result<Option<[u8; 32]>> {
        let Some(session) = self.session() else {
            return Ok(None);
        };
        let secret_hash = session
            .secret_hash()
            .ok_or_else(|| SwapError::FailToStartSwap("missing hash lock".into()))?;

        let tx = contract::decode_tx(raw_tx_hex)?;
        match contract::extract_secret(&tx, &secret_hash) {
            Some(secret) => {
                session.set_secret(secret);
                info!(session = %session.id(), "recovered swap secret from lock spend");
                Ok(Some(secret))
            }
            None => Ok(None),
        }
    }

    fn session(&self) -> Option<Arc<SwapSession>> {
        self.session.upgrade()
    }

    fn network(&self) -> bitcoin::Network {
        self.settings.settings().network.to_bitcoin_network()
    }

    async fn refresh_block_count(&self) -> Result<u64> {
        let height = self
            .bridge
            .get_block_count()
            .await
            .map_err(|e| map_bridge_error(&e))?;
        self.block_count.store(height, Ordering::Relaxed);
        Ok(height)
    }

    fn parse_public_key(hex_key: Option<String>, leg: &str) -> Result<PublicKey> {
        let hex_key = hex_key
            .ok_or_else(|| SwapError::FailToStartSwap(format!("missing {} public key", leg)))?;
        let bytes = hex::decode(&hex_key)
            .map_err(|e| SwapError::FormatIncorrect(format!("{} public key: {}", leg, e)))?;
        PublicKey::from_slice(&bytes)
            .map_err(|e| SwapError::FormatIncorrect(format!("{} public key: {}", leg, e)))
    }

    fn contract_params(&self, session: &SwapSession) -> Result<ContractParams> {
        Ok(ContractParams {
            public_key_a: Self::parse_public_key(session.public_key_a(), "refund-leg")?,
            public_key_b: Self::parse_public_key(session.public_key_b(), "redeem-leg")?,
            secret_hash: session
                .secret_hash()
                .ok_or_else(|| SwapError::FailToStartSwap("missing hash lock".into()))?,
            lock_time: session
                .external_lock_time()
                .ok_or_else(|| SwapError::FailToStartSwap("missing external lock height".into()))?,
        })
    }

    /// Contract redeem script and the P2SH scriptPubKey of the lock output.
    fn lock_script(&self, session: &SwapSession) -> Result<(ScriptBuf, ScriptBuf)> {
        let params = self.contract_params(session)?;
        let contract_script = contract::build_contract(&params)?;
        let script_pubkey =
            contract::contract_address(&contract_script, self.network())?.script_pubkey();
        Ok((contract_script, script_pubkey))
    }

    async fn load_swap_key(&self, session: &SwapSession) -> Result<PrivateKey> {
        {
            let cached = *self.swap_key.lock();
            if let Some(key) = cached {
                return Ok(key);
            }
        }

        let address = session
            .swap_address()
            .ok_or_else(|| SwapError::FailToStartSwap("swap address not loaded".into()))?;
        let wif = self
            .bridge
            .dump_private_key(&address)
            .await
            .map_err(|e| map_bridge_error(&e))?;
        let key = PrivateKey::from_wif(&wif)
            .map_err(|e| SwapError::FormatIncorrect(format!("private key: {}", e)))?;

        *self.swap_key.lock() = Some(key);
        Ok(key)
    }

    fn fail_sub_tx(&self, session: &SwapSession, sub_tx: SubTxId, failure: SwapError) -> SwapError {
        session.update_sub_tx(sub_tx, |record| {
            record.state = SwapTxState::Failed;
            record.error = Some(failure.reason());
        });
        error!(
            session = %session.id(),
            sub_tx = sub_tx.name(),
            error = %failure,
            "sub-transaction failed"
        );
        failure
    }

    fn has_enough_time_inner(&self, session: &SwapSession) -> bool {
        if session.sub_tx(SubTxId::Lock).txid.is_some() {
            return true;
        }
        timelock::has_enough_time(
            session.min_tx_acceptance_height(),
            session.lifetime(),
            session.native_height(),
        )
    }

    async fn is_lock_time_expired_inner(&self, session: &SwapSession) -> Result<bool> {
        let Some(lock_height) = session.external_lock_time() else {
            return Ok(false);
        };
        let tip = self.refresh_block_count().await?;
        Ok(timelock::is_expired(tip, lock_height))
    }

    /// Lock pipeline: create, fund, sign, store.
    async fn build_lock_tx(&self, session: &SwapSession) -> Result<()> {
        session.update_sub_tx(SubTxId::Lock, |record| {
            record.state = SwapTxState::CreatingTx;
        });

        let (contract_script, _) = self
            .lock_script(session)
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, e))?;
        let address = contract::contract_address(&contract_script, self.network())
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, e))?;

        let fee_rate = self.settings.settings().fee_for(SubTxId::Lock);
        let created = self
            .bridge
            .create_raw_transaction(&[], &[(address.to_string(), session.amount())], 0)
            .await
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, map_bridge_error(&e)))?;
        let (funded, _change_position) = self
            .bridge
            .fund_raw_transaction(&created, fee_rate)
            .await
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, map_bridge_error(&e)))?;

        session.update_sub_tx(SubTxId::Lock, |record| {
            record.state = SwapTxState::SigningTx;
            record.fee = Some(fee_rate);
        });

        let (signed, complete) = self
            .bridge
            .sign_raw_transaction(&funded)
            .await
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, map_bridge_error(&e)))?;
        if !complete {
            return Err(self.fail_sub_tx(
                session,
                SubTxId::Lock,
                SwapError::FormatIncorrect("node could not completely sign the lock tx".into()),
            ));
        }

        session.update_sub_tx(SubTxId::Lock, |record| {
            record.raw_tx = Some(signed);
            record.state = SwapTxState::Constructed;
        });
        debug!(session = %session.id(), "lock transaction constructed");
        Ok(())
    }

    /// Withdraw pipeline: resolve destination, build the CLTV-aware spend
    /// of the lock output, sign it locally against the contract.
    async fn build_withdraw_tx(&self, session: &SwapSession, sub_tx: SubTxId) -> Result<()> {
        session.update_sub_tx(sub_tx, |record| {
            record.state = SwapTxState::CreatingTx;
        });

        let lock_record = session.sub_tx(SubTxId::Lock);
        let lock_txid = lock_record.txid.clone().ok_or_else(|| {
            self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::FormatIncorrect("lock transaction is not registered".into()),
            )
        })?;
        let lock_raw = lock_record.raw_tx.clone().ok_or_else(|| {
            self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::FormatIncorrect("lock transaction data missing".into()),
            )
        })?;

        let (contract_script, script_pubkey) = self
            .lock_script(session)
            .map_err(|e| self.fail_sub_tx(session, sub_tx, e))?;
        let lock_tx = contract::decode_tx(&lock_raw)
            .map_err(|e| self.fail_sub_tx(session, sub_tx, e))?;
        let vout = contract::find_contract_vout(&lock_tx, &script_pubkey).ok_or_else(|| {
            self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::FormatIncorrect("lock transaction does not pay the contract".into()),
            )
        })?;

        // The destination survives restarts so a retried withdraw keeps
        // paying the same wallet address.
        let destination = match session.sub_tx(sub_tx).withdraw_address.clone() {
            Some(address) => address,
            None => {
                let address = self
                    .bridge
                    .get_raw_change_address()
                    .await
                    .map_err(|e| self.fail_sub_tx(session, sub_tx, map_bridge_error(&e)))?;
                session.update_sub_tx(sub_tx, |record| {
                    record.withdraw_address = Some(address.clone());
                });
                address
            }
        };

        let fee_rate = self.settings.settings().fee_for(sub_tx);
        let fee = fees::withdraw_fee(fee_rate);
        let amount = session.amount();
        if amount <= fee + DUST_THRESHOLD {
            return Err(self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::InvalidAmount(format!(
                    "locked amount {} cannot cover fee {} above dust",
                    amount, fee
                )),
            ));
        }
        let value = amount - fee;

        let branch = match sub_tx {
            SubTxId::Redeem => {
                let secret = session.secret().ok_or_else(|| {
                    self.fail_sub_tx(
                        session,
                        sub_tx,
                        SwapError::FailToStartSwap("secret is not known yet".into()),
                    )
                })?;
                WithdrawBranch::Redeem { secret }
            }
            _ => WithdrawBranch::Refund,
        };
        let locktime = match branch {
            WithdrawBranch::Refund => session.external_lock_time().ok_or_else(|| {
                self.fail_sub_tx(
                    session,
                    sub_tx,
                    SwapError::FailToStartSwap("missing external lock height".into()),
                )
            })?,
            WithdrawBranch::Redeem { .. } => 0,
        };

        let created = self
            .bridge
            .create_raw_transaction(
                &[BridgeTxIn {
                    txid: lock_txid,
                    vout,
                }],
                &[(destination, value)],
                locktime,
            )
            .await
            .map_err(|e| self.fail_sub_tx(session, sub_tx, map_bridge_error(&e)))?;

        session.update_sub_tx(sub_tx, |record| {
            record.state = SwapTxState::SigningTx;
            record.fee = Some(fee_rate);
        });

        let key = self
            .load_swap_key(session)
            .await
            .map_err(|e| self.fail_sub_tx(session, sub_tx, e))?;
        let signed = contract::finalize_withdraw_tx(&created, &contract_script, &key, &branch)
            .map_err(|e| self.fail_sub_tx(session, sub_tx, e))?;

        session.update_sub_tx(sub_tx, |record| {
            record.raw_tx = Some(signed);
            record.state = SwapTxState::Constructed;
        });
        debug!(session = %session.id(), sub_tx = sub_tx.name(), "withdraw constructed");
        Ok(())
    }

    /// Broadcast a constructed sub-transaction exactly once.
    async fn register_tx(&self, session: &SwapSession, sub_tx: SubTxId) -> Result<()> {
        let record = session.sub_tx(sub_tx);
        if record.txid.is_some() {
            // Already registered in an earlier run.
            session.update_sub_tx(sub_tx, |record| {
                if record.state == SwapTxState::Constructed {
                    record.state = SwapTxState::Registration;
                }
            });
            return Ok(());
        }

        let raw = record.raw_tx.ok_or_else(|| {
            self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::FormatIncorrect("no raw transaction to register".into()),
            )
        })?;

        match self.bridge.send_raw_transaction(&raw).await {
            Ok(txid) => {
                info!(
                    session = %session.id(),
                    sub_tx = sub_tx.name(),
                    txid = %txid,
                    "transaction registered"
                );
                session.update_sub_tx(sub_tx, |record| {
                    record.txid = Some(txid);
                    record.state = SwapTxState::Registration;
                });
                Ok(())
            }
            Err(e) => Err(self.fail_sub_tx(
                session,
                sub_tx,
                SwapError::FailToRegister(e.to_string()),
            )),
        }
    }

    /// Poll the lock output and gate on the confirmation threshold.
    async fn confirm_lock_inner(&self, session: &SwapSession) -> Result<bool> {
        let record = session.sub_tx(SubTxId::Lock);
        let Some(txid) = record.txid.clone() else {
            // Nothing to poll yet; the counterparty's details may still be
            // in flight.
            return Ok(false);
        };
        let Some(raw) = record.raw_tx.clone() else {
            return Ok(false);
        };

        let (_, script_pubkey) = self.lock_script(session)?;
        let lock_tx = contract::decode_tx(&raw)
            .map_err(|e| self.fail_sub_tx(session, SubTxId::Lock, e))?;
        let Some(vout) = contract::find_contract_vout(&lock_tx, &script_pubkey) else {
            return Err(self.fail_sub_tx(
                session,
                SubTxId::Lock,
                SwapError::FormatIncorrect("lock transaction does not pay the contract".into()),
            ));
        };

        match self.bridge.get_tx_out(&txid, vout).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "transient node error while polling the lock output");
                Ok(false)
            }
            Err(e) => Err(self.fail_sub_tx(session, SubTxId::Lock, map_bridge_error(&e))),
            Ok(None) => {
                if record.confirmations > 0 {
                    // The output was visible before; a reorg dropped it and
                    // the registration step has to run again.
                    warn!(txid = %txid, "lock output vanished, restarting registration");
                    session.update_sub_tx(SubTxId::Lock, |record| {
                        record.confirmations = 0;
                        if built_locally(record) {
                            record.state = SwapTxState::Constructed;
                        }
                    });
                }
                Ok(false)
            }
            Ok(Some(out)) => {
                if out.script_pubkey != hex::encode(script_pubkey.as_bytes()) {
                    return Err(self.fail_sub_tx(
                        session,
                        SubTxId::Lock,
                        SwapError::FormatIncorrect(
                            "lock output script does not match the contract".into(),
                        ),
                    ));
                }
                if out.value < session.amount() {
                    return Err(self.fail_sub_tx(
                        session,
                        SubTxId::Lock,
                        SwapError::InvalidAmount(format!(
                            "lock output pays {} of {}",
                            out.value,
                            session.amount()
                        )),
                    ));
                }

                let threshold = self.settings.settings().min_confirmations as u64;
                let confirmed = out.confirmations >= threshold;
                session.update_sub_tx(SubTxId::Lock, |record| {
                    record.confirmations = out.confirmations;
                    record.state = if confirmed {
                        SwapTxState::Completed
                    } else {
                        SwapTxState::Confirmation
                    };
                });
                if confirmed {
                    info!(
                        txid = %txid,
                        confirmations = out.confirmations,
                        "lock transaction confirmed"
                    );
                }
                Ok(confirmed)
            }
        }
    }

    /// Refund and redeem share one pipeline; only the branch differs.
    async fn send_withdraw_tx(&self, sub_tx: SubTxId) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let record = session.sub_tx(sub_tx);
        match record.state {
            SwapTxState::Failed => return Err(recorded_failure(&record)),
            SwapTxState::Completed => return Ok(true),
            _ => {}
        }

        match sub_tx {
            SubTxId::Refund => {
                // The refund path only opens at the agreed lock height.
                if !self.is_lock_time_expired_inner(&session).await? {
                    debug!(session = %session.id(), "refund path not yet open");
                    return Ok(false);
                }
            }
            SubTxId::Redeem => {
                if session.secret().is_none() {
                    debug!(session = %session.id(), "secret not revealed yet");
                    return Ok(false);
                }
            }
            SubTxId::Lock => {
                return Err(SwapError::FormatIncorrect(
                    "lock is not a withdraw sub-transaction".into(),
                ))
            }
        }

        if session.sub_tx(sub_tx).state.is_building() {
            self.build_withdraw_tx(&session, sub_tx).await?;
        }
        if session.sub_tx(sub_tx).state == SwapTxState::Constructed {
            self.register_tx(&session, sub_tx).await?;
        }
        if session.sub_tx(sub_tx).state == SwapTxState::Registration {
            session.update_sub_tx(sub_tx, |record| {
                record.state = SwapTxState::Completed;
            });
            info!(session = %session.id(), sub_tx = sub_tx.name(), "withdraw broadcast");
        }

        Ok(session.sub_tx(sub_tx).state == SwapTxState::Completed)
    }
}

/// Whether this side can re-register the transaction itself. A record
/// learned from the peer is only ever polled, never rebroadcast here.
fn built_locally(record: &SubTxRecord) -> bool {
    record.raw_tx.is_some() && record.fee.is_some()
}

fn recorded_failure(record: &SubTxRecord) -> SwapError {
    record
        .error
        .map(SwapError::from)
        .unwrap_or_else(|| SwapError::SecondSideBridgeError("sub-transaction failed".into()))
}

fn map_bridge_error(error: &BridgeError) -> SwapError {
    match error {
        BridgeError::InvalidCredentials(_) => SwapError::InvalidCredentials,
        BridgeError::EmptyResult => SwapError::EmptyResult,
        other => SwapError::SecondSideBridgeError(other.to_string()),
    }
}

#[async_trait]
impl SecondSide for BitcoinSide {
    async fn initialize(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let settings = self.settings.settings();
        settings.validate().map_err(SwapError::FailToStartSwap)?;

        if !fees::check_amount(session.amount(), settings.fee_rate) {
            return Err(SwapError::FailToStartSwap(format!(
                "amount {} is below the minimum of {}",
                session.amount(),
                fees::min_amount(settings.fee_rate)
            )));
        }

        if session.swap_address().is_none() {
            let address = self
                .bridge
                .get_raw_change_address()
                .await
                .map_err(|e| map_bridge_error(&e))?;
            session.set_swap_address(address);
        }

        let own_key_missing = if session.is_bitcoin_owner() {
            session.public_key_a().is_none()
        } else {
            session.public_key_b().is_none()
        };
        if own_key_missing {
            let key = self.load_swap_key(&session).await?;
            let public_key = hex::encode(key.public_key(&Secp256k1::new()).to_bytes());
            if session.is_bitcoin_owner() {
                session.set_public_key_a(public_key);
            } else {
                session.set_public_key_b(public_key);
            }
        }

        if session.is_bitcoin_owner() && session.secret().is_none() {
            let secret: [u8; 32] = rand::random();
            session.set_secret_hash(contract::secret_hash(&secret));
            session.set_secret(secret);
            debug!(session = %session.id(), "generated swap secret");
        }

        Ok(true)
    }

    async fn init_lock_time(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let settings = self.settings.settings();
        let tip = self.refresh_block_count().await?;
        let lock_time = timelock::propose_lock_time(
            tip,
            settings.lock_time_in_blocks as u64,
            session.peer_response_time(),
        );
        session.set_external_lock_time(lock_time);
        info!(session = %session.id(), lock_time, "proposed external lock height");
        Ok(true)
    }

    async fn validate_lock_time(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let proposed = session.external_lock_time().ok_or_else(|| {
            SwapError::FormatIncorrect("counterparty did not provide a lock height".into())
        })?;
        let settings = self.settings.settings();
        let tip = self.refresh_block_count().await?;
        let acceptable = timelock::validate_lock_time(
            proposed,
            tip,
            settings.lock_time_in_blocks as u64,
            session.peer_response_time(),
        );
        if !acceptable {
            warn!(
                session = %session.id(),
                proposed,
                tip,
                "rejected counterparty lock height"
            );
        }
        Ok(acceptable)
    }

    fn add_tx_details(&self, params: &mut OutgoingParams) {
        let Some(session) = self.session() else {
            return;
        };

        let own_key = if session.is_bitcoin_owner() {
            session.public_key_a()
        } else {
            session.public_key_b()
        };
        if let Some(key) = own_key {
            params.set(
                ParameterId::AtomicSwapPublicKey,
                ParameterValue::PublicKey(key),
            );
        }
        if let Some(lock_time) = session.external_lock_time() {
            params.set(
                ParameterId::AtomicSwapExternalLockTime,
                ParameterValue::Height(lock_time),
            );
        }
        params.set(
            ParameterId::AtomicSwapMinHeight,
            ParameterValue::Height(session.min_tx_acceptance_height()),
        );
        params.set(
            ParameterId::AtomicSwapAmount,
            ParameterValue::Amount(session.amount()),
        );

        for sub_tx in SubTxId::ALL {
            let record = session.sub_tx(sub_tx);
            if let Some(raw) = record.raw_tx {
                params.set(
                    ParameterId::AtomicSwapExternalTx(sub_tx),
                    ParameterValue::RawTx(raw),
                );
            }
            if let Some(txid) = record.txid {
                params.set(
                    ParameterId::AtomicSwapExternalTxId(sub_tx),
                    ParameterValue::TxId(txid),
                );
            }
        }
    }

    async fn confirm_lock_tx(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        let record = session.sub_tx(SubTxId::Lock);
        match record.state {
            SwapTxState::Failed => Err(recorded_failure(&record)),
            SwapTxState::Completed => Ok(true),
            _ => self.confirm_lock_inner(&session).await,
        }
    }

    async fn send_lock_tx(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        if !session.is_bitcoin_owner() {
            // The counterparty locks; this side only confirms.
            return Ok(true);
        }

        let record = session.sub_tx(SubTxId::Lock);
        match record.state {
            SwapTxState::Failed => return Err(recorded_failure(&record)),
            SwapTxState::Completed => return Ok(true),
            _ => {}
        }

        if record.state == SwapTxState::Initial && !self.has_enough_time_inner(&session) {
            return Err(self.fail_sub_tx(
                &session,
                SubTxId::Lock,
                SwapError::FailToStartSwap(
                    "not enough time left to process the lock transaction".into(),
                ),
            ));
        }

        if session.sub_tx(SubTxId::Lock).state.is_building() {
            self.build_lock_tx(&session).await?;
        }
        if session.sub_tx(SubTxId::Lock).state == SwapTxState::Constructed {
            self.register_tx(&session, SubTxId::Lock).await?;
        }
        if matches!(
            session.sub_tx(SubTxId::Lock).state,
            SwapTxState::Registration | SwapTxState::Confirmation
        ) {
            session.update_sub_tx(SubTxId::Lock, |record| {
                if record.state == SwapTxState::Registration {
                    record.state = SwapTxState::Confirmation;
                }
            });
            return self.confirm_lock_inner(&session).await;
        }

        Ok(session.sub_tx(SubTxId::Lock).state == SwapTxState::Completed)
    }

    async fn send_refund(&self) -> Result<bool> {
        self.send_withdraw_tx(SubTxId::Refund).await
    }

    async fn send_redeem(&self) -> Result<bool> {
        self.send_withdraw_tx(SubTxId::Redeem).await
    }

    async fn is_lock_time_expired(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        self.is_lock_time_expired_inner(&session).await
    }

    async fn has_enough_time_to_process_lock_tx(&self) -> Result<bool> {
        let Some(session) = self.session() else {
            return Ok(false);
        };
        Ok(self.has_enough_time_inner(&session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nyx_swap::FailureReason;

    #[test]
    fn test_bridge_error_mapping() {
        assert_eq!(
            map_bridge_error(&BridgeError::InvalidCredentials("401".into())).reason(),
            FailureReason::InvalidCredentials
        );
        assert_eq!(
            map_bridge_error(&BridgeError::EmptyResult).reason(),
            FailureReason::EmptyResult
        );
        assert_eq!(
            map_bridge_error(&BridgeError::Io("reset".into())).reason(),
            FailureReason::SecondSideBridgeError
        );
    }

    #[test]
    fn test_recorded_failure_reconstructs_the_reason() {
        let record = SubTxRecord {
            state: SwapTxState::Failed,
            error: Some(FailureReason::FailToRegister),
            ..Default::default()
        };
        assert_eq!(
            recorded_failure(&record).reason(),
            FailureReason::FailToRegister
        );

        // A failed record without a code still surfaces something.
        let bare = SubTxRecord {
            state: SwapTxState::Failed,
            ..Default::default()
        };
        assert_eq!(
            recorded_failure(&bare).reason(),
            FailureReason::SecondSideBridgeError
        );
    }

    #[test]
    fn test_locally_built_records() {
        let mut record = SubTxRecord {
            raw_tx: Some("00".into()),
            ..Default::default()
        };
        // Raw data from the peer alone is not enough to rebroadcast.
        assert!(!built_locally(&record));

        record.fee = Some(1000);
        assert!(built_locally(&record));
    }
}
