//! End-to-end swap flows against the in-memory node.

use std::sync::Arc;

use bitcoin::secp256k1::Secp256k1;
use bitcoin::Sequence;

use nyx_swap::{
    FailureReason, OutgoingParams, ParameterId, ParameterValue, SecondSide, SubTxId,
    SwapSession, SwapSessionId, SwapSessionParams, SwapTxState,
};
use nyx_swap_bitcoin::contract;
use nyx_swap_bitcoin::{
    BitcoinSide, MockNodeBridge, Network, NodeBridge, SettingsProvider, StaticSettings,
    SwapSettings,
};

fn session(owner: bool, amount: u64) -> Arc<SwapSession> {
    let session = SwapSession::new(
        SwapSessionId::new("swap-1"),
        SwapSessionParams {
            is_bitcoin_owner: owner,
            amount,
            peer_response_time: 5,
            lifetime: 20,
            min_tx_acceptance_height: 50,
        },
    );
    session.set_native_height(50);
    Arc::new(session)
}

fn settings() -> Arc<dyn SettingsProvider> {
    Arc::new(StaticSettings::new(
        SwapSettings::new(Network::Regtest).with_fee_rate(1000),
    ))
}

fn driver(session: &Arc<SwapSession>, node: &Arc<MockNodeBridge>) -> BitcoinSide {
    let bridge: Arc<dyn NodeBridge> = node.clone();
    BitcoinSide::new(session, bridge, settings())
}

fn node_pubkey_hex(node: &MockNodeBridge) -> String {
    hex::encode(node.wallet_key().public_key(&Secp256k1::new()).to_bytes())
}

/// Run initialize + init_lock_time and fill in the counterparty key so the
/// contract is fully determined.
async fn negotiate(side: &BitcoinSide, session: &SwapSession, node: &MockNodeBridge) {
    assert!(side.initialize().await.unwrap());
    assert!(side.init_lock_time().await.unwrap());
    session.set_public_key_b(node_pubkey_hex(node));
}

/// Drive the lock all the way to the confirmation threshold.
async fn lock_and_confirm(side: &BitcoinSide, node: &MockNodeBridge) {
    assert!(!side.send_lock_tx().await.unwrap());
    node.advance_blocks(6);
    assert!(side.send_lock_tx().await.unwrap());
}

#[tokio::test]
async fn owner_start_publishes_lock_time_and_key() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);

    assert!(side.initialize().await.unwrap());
    assert!(side.init_lock_time().await.unwrap());

    // Tip 100 + 12-block margin + 2 translated response blocks.
    assert_eq!(session.external_lock_time(), Some(114));
    assert!(session.secret().is_some());
    assert!(session.secret_hash().is_some());

    let mut params = OutgoingParams::new();
    side.add_tx_details(&mut params);

    assert_eq!(
        params.get(ParameterId::AtomicSwapExternalLockTime),
        Some(&ParameterValue::Height(114))
    );
    assert_eq!(
        params.get(ParameterId::AtomicSwapAmount),
        Some(&ParameterValue::Amount(200_000))
    );
    assert_eq!(
        params.get(ParameterId::AtomicSwapMinHeight),
        Some(&ParameterValue::Height(50))
    );
    assert!(matches!(
        params.get(ParameterId::AtomicSwapPublicKey),
        Some(ParameterValue::PublicKey(key)) if key.len() == 66
    ));
}

#[tokio::test]
async fn counterparty_validates_proposed_lock_time() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(false, 200_000);
    let side = driver(&session, &node);

    // Proposal from the reference setup above.
    session.set_external_lock_time(114);
    assert!(side.validate_lock_time().await.unwrap());

    // The same proposal is stale once the tip has moved past the floor.
    node.set_block_height(113);
    assert!(!side.validate_lock_time().await.unwrap());
}

#[tokio::test]
async fn lock_pipeline_broadcasts_and_confirms() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;

    // First tick: built and broadcast, zero confirmations.
    assert!(!side.send_lock_tx().await.unwrap());
    assert_eq!(node.broadcast_count(), 1);

    let record = session.sub_tx(SubTxId::Lock);
    assert_eq!(record.state, SwapTxState::Confirmation);
    let txid = record.txid.clone().unwrap();

    // The broadcast transaction pays the expected contract output.
    let lock_tx = node.transaction(&txid).unwrap();
    let out = node.get_tx_out(&txid, 0).await.unwrap().unwrap();
    assert_eq!(out.value, 200_000);
    assert_eq!(
        out.script_pubkey,
        hex::encode(lock_tx.output[0].script_pubkey.as_bytes())
    );

    // Confirmation threshold gates completion.
    node.advance_blocks(5);
    assert!(!side.send_lock_tx().await.unwrap());
    node.advance_blocks(1);
    assert!(side.send_lock_tx().await.unwrap());
    assert_eq!(session.sub_tx(SubTxId::Lock).state, SwapTxState::Completed);
    assert_eq!(session.sub_tx(SubTxId::Lock).confirmations, 6);

    // Confirmed means confirmed on the dedicated entry point too.
    assert!(side.confirm_lock_tx().await.unwrap());
}

#[tokio::test]
async fn lock_broadcast_happens_once_across_restarts() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;

    assert!(!side.send_lock_tx().await.unwrap());
    assert!(!side.send_lock_tx().await.unwrap());
    assert_eq!(node.broadcast_count(), 1);

    // Wallet restart: rebuild the session from the persisted rows plus the
    // negotiated values the engine re-applies.
    let restored = Arc::new(SwapSession::restore(
        SwapSessionId::new("swap-1"),
        SwapSessionParams {
            is_bitcoin_owner: true,
            amount: 200_000,
            peer_response_time: 5,
            lifetime: 20,
            min_tx_acceptance_height: 50,
        },
        session.persisted(),
    ));
    restored.set_native_height(50);
    restored.set_secret(session.secret().unwrap());
    restored.set_secret_hash(session.secret_hash().unwrap());
    restored.set_public_key_a(session.public_key_a().unwrap());
    restored.set_public_key_b(session.public_key_b().unwrap());
    restored.set_swap_address(session.swap_address().unwrap());
    restored.set_external_lock_time(session.external_lock_time().unwrap());

    let side = driver(&restored, &node);
    assert!(!side.send_lock_tx().await.unwrap());
    node.advance_blocks(6);
    assert!(side.send_lock_tx().await.unwrap());

    assert_eq!(node.broadcast_count(), 1);
}

#[tokio::test]
async fn redeem_reveals_the_secret_on_chain() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;
    lock_and_confirm(&side, &node).await;

    assert!(side.send_redeem().await.unwrap());
    let record = session.sub_tx(SubTxId::Redeem);
    assert_eq!(record.state, SwapTxState::Completed);
    assert_eq!(node.broadcast_count(), 2);

    let secret = session.secret().unwrap();
    let raw = record.raw_tx.unwrap();

    // The scriptSig carries the literal secret, and it hashes back to the
    // committed lock.
    assert!(raw.contains(&hex::encode(secret)));
    let redeem_tx = contract::decode_tx(&raw).unwrap();
    assert_eq!(redeem_tx.input[0].sequence, Sequence::MAX);
    assert_eq!(
        contract::extract_secret(&redeem_tx, &session.secret_hash().unwrap()),
        Some(secret)
    );

    // Repeated ticks are idempotent.
    assert!(side.send_redeem().await.unwrap());
    assert_eq!(node.broadcast_count(), 2);
}

#[tokio::test]
async fn refund_waits_for_the_lock_height() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;
    lock_and_confirm(&side, &node).await;

    // Height is 106 now; the contract unlocks at 114.
    assert!(!side.is_lock_time_expired().await.unwrap());
    assert!(!side.send_refund().await.unwrap());
    assert_eq!(session.sub_tx(SubTxId::Refund).state, SwapTxState::Initial);
    assert_eq!(node.broadcast_count(), 1);

    node.set_block_height(114);
    assert!(side.is_lock_time_expired().await.unwrap());
    assert!(side.send_refund().await.unwrap());

    let record = session.sub_tx(SubTxId::Refund);
    assert_eq!(record.state, SwapTxState::Completed);

    let refund_tx = contract::decode_tx(&record.raw_tx.unwrap()).unwrap();
    assert_eq!(refund_tx.lock_time.to_consensus_u32(), 114);
    assert_eq!(
        refund_tx.input[0].sequence,
        Sequence::ENABLE_LOCKTIME_NO_RBF
    );
    // A refund never exposes the secret.
    assert_eq!(
        contract::extract_secret(&refund_tx, &session.secret_hash().unwrap()),
        None
    );
}

#[tokio::test]
async fn lock_is_refused_when_the_window_is_too_short() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;

    // The native chain has advanced past the swap deadline.
    session.set_native_height(500);
    assert!(!side.has_enough_time_to_process_lock_tx().await.unwrap());

    let error = side.send_lock_tx().await.unwrap_err();
    assert_eq!(error.reason(), FailureReason::FailToStartSwap);
    assert_eq!(node.broadcast_count(), 0);
    assert_eq!(session.sub_tx(SubTxId::Lock).state, SwapTxState::Failed);

    // A failed sub-transaction keeps failing without touching the node.
    assert!(side.send_lock_tx().await.is_err());
    assert_eq!(node.broadcast_count(), 0);
}

#[tokio::test]
async fn undersized_amount_is_rejected_at_start() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 500);
    let side = driver(&session, &node);

    let error = side.initialize().await.unwrap_err();
    assert_eq!(error.reason(), FailureReason::FailToStartSwap);
}

#[tokio::test]
async fn incomplete_signing_is_fatal() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;

    node.set_sign_complete(false);
    let error = side.send_lock_tx().await.unwrap_err();
    assert_eq!(error.reason(), FailureReason::FormatIncorrect);
    assert_eq!(session.sub_tx(SubTxId::Lock).state, SwapTxState::Failed);
    assert_eq!(node.broadcast_count(), 0);
}

#[tokio::test]
async fn transient_poll_errors_do_not_change_state() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    negotiate(&side, &session, &node).await;

    assert!(!side.send_lock_tx().await.unwrap());
    node.advance_blocks(6);

    use nyx_swap_bitcoin::BridgeError;
    node.fail_next(BridgeError::Io("connection reset".into()));
    assert!(!side.confirm_lock_tx().await.unwrap());
    assert_ne!(session.sub_tx(SubTxId::Lock).state, SwapTxState::Failed);

    // The next tick succeeds.
    assert!(side.confirm_lock_tx().await.unwrap());
}

#[tokio::test]
async fn counterparty_confirms_a_received_lock() {
    let node = Arc::new(MockNodeBridge::at_height(100));

    // The owner locks.
    let owner = session(true, 200_000);
    let owner_side = driver(&owner, &node);
    negotiate(&owner_side, &owner, &node).await;
    assert!(!owner_side.send_lock_tx().await.unwrap());
    let lock_record = owner.sub_tx(SubTxId::Lock);

    // The non-owner learns the lock via wire parameters and confirms it
    // against its own node.
    let other = session(false, 200_000);
    other.set_secret_hash(owner.secret_hash().unwrap());
    other.set_external_lock_time(owner.external_lock_time().unwrap());
    other.set_public_key_a(owner.public_key_a().unwrap());
    other.set_public_key_b(owner.public_key_b().unwrap());
    other.update_sub_tx(SubTxId::Lock, |record| {
        record.raw_tx = lock_record.raw_tx.clone();
        record.txid = lock_record.txid.clone();
    });

    let other_side = driver(&other, &node);
    assert!(!other_side.confirm_lock_tx().await.unwrap());
    node.advance_blocks(6);
    assert!(other_side.confirm_lock_tx().await.unwrap());
    assert_eq!(other.sub_tx(SubTxId::Lock).confirmations, 6);
}

#[tokio::test]
async fn observed_redeem_yields_the_secret() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session_a = session(true, 200_000);
    let side_a = driver(&session_a, &node);
    negotiate(&side_a, &session_a, &node).await;
    lock_and_confirm(&side_a, &node).await;
    assert!(side_a.send_redeem().await.unwrap());

    let redeem_raw = session_a.sub_tx(SubTxId::Redeem).raw_tx.unwrap();

    // A watcher that only knows the hash lock recovers the secret from the
    // spend and can hand it to the native side.
    let watcher = session(false, 200_000);
    watcher.set_secret_hash(session_a.secret_hash().unwrap());
    let watcher_side = driver(&watcher, &node);

    let secret = watcher_side.process_lock_spend(&redeem_raw).unwrap();
    assert_eq!(secret, session_a.secret());
    assert_eq!(watcher.secret(), session_a.secret());
}

#[tokio::test]
async fn dropped_session_turns_ticks_into_noops() {
    let node = Arc::new(MockNodeBridge::at_height(100));
    let session = session(true, 200_000);
    let side = driver(&session, &node);
    drop(session);

    assert!(!side.initialize().await.unwrap());
    assert!(!side.send_lock_tx().await.unwrap());
    assert!(!side.send_refund().await.unwrap());
    assert_eq!(node.broadcast_count(), 0);
}
