//! Lock-height negotiation between the two block-time regimes.
//!
//! The swap commits to a single Bitcoin height, `external_lock_time`. The
//! owner derives it from its own Bitcoin tip plus a safety margin plus the
//! counterparty's response window translated from native-chain blocks; the
//! counterparty re-derives the same bounds against its own tip and accepts
//! only proposals inside them.

use crate::{
    LOCK_TIME_TOLERANCE_IN_BLOCKS, LOCK_TX_ESTIMATED_TIME_IN_NATIVE_BLOCKS,
    NATIVE_BLOCKS_PER_BITCOIN_BLOCK,
};

/// Translate a native-chain block span into Bitcoin blocks, rounding up.
pub fn native_to_bitcoin_blocks(native_blocks: u64) -> u64 {
    native_blocks.div_ceil(NATIVE_BLOCKS_PER_BITCOIN_BLOCK)
}

/// The counterparty response window plus lock-broadcast estimate, in
/// Bitcoin blocks.
pub fn response_window(peer_response_time: u64) -> u64 {
    native_to_bitcoin_blocks(peer_response_time + LOCK_TX_ESTIMATED_TIME_IN_NATIVE_BLOCKS)
}

/// Owner side: compute the lock height to publish.
pub fn propose_lock_time(
    bitcoin_tip: u64,
    lock_time_in_blocks: u64,
    peer_response_time: u64,
) -> u64 {
    bitcoin_tip + lock_time_in_blocks + response_window(peer_response_time)
}

/// Non-owner side: whether a proposed lock height is acceptable.
///
/// The lower bound guarantees enough runway before the refund path opens;
/// the upper bound keeps the owner from pushing the lock arbitrarily far
/// and stalling the counterparty's funds.
pub fn validate_lock_time(
    proposed: u64,
    bitcoin_tip: u64,
    lock_time_in_blocks: u64,
    peer_response_time: u64,
) -> bool {
    let floor = bitcoin_tip + lock_time_in_blocks;
    let ceiling = floor + response_window(peer_response_time) + LOCK_TIME_TOLERANCE_IN_BLOCKS;
    proposed >= floor && proposed <= ceiling
}

/// Whether the refund path is open.
pub fn is_expired(bitcoin_tip: u64, external_lock_time: u64) -> bool {
    bitcoin_tip >= external_lock_time
}

/// Whether enough native-chain time remains to build and broadcast the
/// lock transaction before the swap window closes.
pub fn has_enough_time(
    min_tx_acceptance_height: u64,
    lifetime: u64,
    native_tip: u64,
) -> bool {
    let deadline = min_tx_acceptance_height + lifetime;
    deadline.saturating_sub(native_tip) >= LOCK_TX_ESTIMATED_TIME_IN_NATIVE_BLOCKS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_translation_rounds_up() {
        assert_eq!(native_to_bitcoin_blocks(0), 0);
        assert_eq!(native_to_bitcoin_blocks(1), 1);
        assert_eq!(native_to_bitcoin_blocks(10), 1);
        assert_eq!(native_to_bitcoin_blocks(11), 2);
        assert_eq!(native_to_bitcoin_blocks(15), 2);
    }

    #[test]
    fn test_propose_from_reference_setup() {
        // Tip 100, 12-block margin, 5 native blocks of peer response time:
        // the response window is ceil((5 + 10) / 10) = 2 Bitcoin blocks.
        let proposed = propose_lock_time(100, 12, 5);
        assert_eq!(proposed, 112 + 2);
    }

    #[test]
    fn test_validate_accepts_own_proposal() {
        let proposed = propose_lock_time(100, 12, 5);
        assert!(validate_lock_time(proposed, 100, 12, 5));
    }

    #[test]
    fn test_validate_rejects_after_tip_advance() {
        // By the time the peer validates, its tip moved to 113 and the
        // proposal no longer clears the lower bound.
        let proposed = propose_lock_time(100, 12, 5);
        assert!(!validate_lock_time(proposed, 113, 12, 5));
    }

    #[test]
    fn test_validate_bounds_are_tight() {
        let tip = 100;
        let floor = tip + 12;
        let ceiling = floor + response_window(5) + LOCK_TIME_TOLERANCE_IN_BLOCKS;

        assert!(!validate_lock_time(floor - 1, tip, 12, 5));
        assert!(validate_lock_time(floor, tip, 12, 5));
        assert!(validate_lock_time(ceiling, tip, 12, 5));
        assert!(!validate_lock_time(ceiling + 1, tip, 12, 5));
    }

    #[test]
    fn test_expiry() {
        assert!(!is_expired(113, 114));
        assert!(is_expired(114, 114));
        assert!(is_expired(200, 114));
    }

    #[test]
    fn test_time_admission() {
        // Swap started at native height 50 with a 20-block lifetime.
        assert!(has_enough_time(50, 20, 50));
        assert!(has_enough_time(50, 20, 60));
        assert!(!has_enough_time(50, 20, 61));
        assert!(!has_enough_time(50, 20, 500));
    }
}
