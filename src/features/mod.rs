//! Pure microstructure feature functions, plus the rolling standardizer.

pub mod standardizer;

pub use standardizer::Standardizer;

use statrs::statistics::Statistics;

/// Midpoint of the top of book.
pub fn mid(best_bid: f64, best_ask: f64) -> f64 {
    (best_bid + best_ask) / 2.0
}

/// Bid/ask spread in basis points of the midpoint. Zero when the mid is zero.
pub fn spread_bp(best_bid: f64, best_ask: f64) -> f64 {
    let m = mid(best_bid, best_ask);
    if m == 0.0 {
        return 0.0;
    }
    ((best_ask - best_bid) / m) * 10_000.0
}

/// Signed order-flow imbalance across the given depth levels, in `[-1, 1]`.
pub fn order_flow_imbalance(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> f64 {
    let bid_vol: f64 = bids.iter().map(|(_, sz)| sz).sum();
    let ask_vol: f64 = asks.iter().map(|(_, sz)| sz).sum();
    let total = bid_vol + ask_vol;
    if total == 0.0 {
        return 0.0;
    }
    (bid_vol - ask_vol) / total
}

/// Size-weighted price between best bid and best ask. Falls back to the
/// plain mid when both sides are empty of size.
pub fn microprice(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> f64 {
    let (Some(&(bid_px, bid_sz)), Some(&(ask_px, ask_sz))) = (bids.first(), asks.first()) else {
        return 0.0;
    };
    let total = bid_sz + ask_sz;
    if total == 0.0 {
        return mid(bid_px, ask_px);
    }
    (ask_px * bid_sz + bid_px * ask_sz) / total
}

/// Sample standard deviation (ddof = 1) of a price window. Zero below two
/// observations.
pub fn rolling_volatility(prices: &[f64]) -> f64 {
    if prices.len() < 2 {
        return 0.0;
    }
    prices.to_vec().std_dev()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mid_is_the_average() {
        assert_eq!(mid(99.0, 101.0), 100.0);
    }

    #[test]
    fn spread_bp_zero_mid_is_zero() {
        assert_eq!(spread_bp(0.0, 0.0), 0.0);
    }

    #[test]
    fn spread_bp_matches_known_value() {
        // 1.0 wide on a 100 mid is 100bp.
        assert!((spread_bp(99.5, 100.5) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn order_flow_imbalance_balanced_book_is_zero() {
        let bids = [(100.0, 5.0)];
        let asks = [(101.0, 5.0)];
        assert_eq!(order_flow_imbalance(&bids, &asks), 0.0);
    }

    #[test]
    fn order_flow_imbalance_empty_book_is_zero() {
        assert_eq!(order_flow_imbalance(&[], &[]), 0.0);
    }

    #[test]
    fn microprice_weights_toward_larger_side() {
        let bids = [(100.0, 9.0)];
        let asks = [(101.0, 1.0)];
        let mp = microprice(&bids, &asks);
        assert!(mp < 100.5);
    }

    #[test]
    fn microprice_empty_side_falls_back_to_zero() {
        assert_eq!(microprice(&[], &[(101.0, 1.0)]), 0.0);
    }

    #[test]
    fn rolling_volatility_needs_two_points() {
        assert_eq!(rolling_volatility(&[1.0]), 0.0);
        assert!(rolling_volatility(&[1.0, 2.0, 3.0]) > 0.0);
    }
}
