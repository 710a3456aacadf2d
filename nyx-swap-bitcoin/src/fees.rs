//! Fee and amount admissibility policy.

use crate::{DUST_THRESHOLD, WITHDRAW_TX_AVERAGE_VSIZE};

/// Fee, in satoshi, a withdraw at the given rate will pay.
///
/// `fee_rate` is satoshi per 1000 vbytes; the result is rounded up so the
/// transaction never underpays relay policy.
pub fn withdraw_fee(fee_rate: u64) -> u64 {
    (WITHDRAW_TX_AVERAGE_VSIZE * fee_rate).div_ceil(1000)
}

/// Smallest swap amount worth locking at the given fee rate.
pub fn min_amount(fee_rate: u64) -> u64 {
    DUST_THRESHOLD.max(withdraw_fee(fee_rate))
}

/// Whether `amount` is admissible at `fee_rate`.
pub fn check_amount(amount: u64, fee_rate: u64) -> bool {
    amount >= min_amount(fee_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_amount_floor_is_dust() {
        // At low rates the dust threshold dominates.
        assert_eq!(min_amount(1), DUST_THRESHOLD);
        assert_eq!(min_amount(1000), DUST_THRESHOLD);
    }

    #[test]
    fn test_min_amount_tracks_fee_at_high_rates() {
        let rate = 10_000;
        assert_eq!(min_amount(rate), withdraw_fee(rate));
        assert!(min_amount(rate) > DUST_THRESHOLD);
    }

    #[test]
    fn test_boundary_exact_minimum() {
        let rate = 1000;
        let floor = min_amount(rate);
        assert!(check_amount(floor, rate));
        assert!(!check_amount(floor - 1, rate));
    }

    #[test]
    fn test_small_amount_rejected() {
        assert!(!check_amount(500, 1000));
    }

    #[test]
    fn test_monotone_in_amount() {
        let rate = 3000;
        let mut last = false;
        for amount in 0..5_000u64 {
            let ok = check_amount(amount, rate);
            // Once admissible, larger amounts stay admissible.
            assert!(ok || !last);
            last = ok;
        }
        assert!(last);
    }

    #[test]
    fn test_anti_monotone_in_fee_rate() {
        let amount = 2_000;
        let mut last = true;
        for rate in 1..20_000u64 {
            let ok = check_amount(amount, rate);
            // Once rejected at some rate, higher rates stay rejected.
            assert!(last || !ok);
            last = ok;
        }
        assert!(!last);
    }

    #[test]
    fn test_fee_rounds_up() {
        // 360 vbytes at 1001 sat/kvB is 360.36 sat, charged as 361.
        assert_eq!(withdraw_fee(1001), 361);
        assert_eq!(withdraw_fee(1000), WITHDRAW_TX_AVERAGE_VSIZE);
    }
}
