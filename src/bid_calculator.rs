//! Progressive minimum bid calculation.
//!
//! The increment grows with the current price following a 1-2-5 scheme:
//! below 100 ₽ the step is 1 ₽, from 100 ₽ it is 2 ₽, and so on up to
//! 2000 ₽ for lots above five million.

/// Price threshold -> minimum increment, ascending by threshold.
const BID_INCREMENT_RULES: &[(f64, f64)] = &[
    (0.0, 1.0),
    (100.0, 2.0),
    (500.0, 5.0),
    (1_000.0, 10.0),
    (5_000.0, 20.0),
    (10_000.0, 50.0),
    (50_000.0, 100.0),
    (100_000.0, 200.0),
    (500_000.0, 500.0),
    (1_000_000.0, 1_000.0),
    (5_000_000.0, 2_000.0),
];

/// Minimum acceptable next bid for a lot at `current_price`.
pub fn calculate_min_bid(current_price: f64) -> f64 {
    let mut min_increment = 1.0;
    for &(threshold, increment) in BID_INCREMENT_RULES {
        if current_price >= threshold {
            min_increment = increment;
        } else {
            break;
        }
    }
    current_price + min_increment
}

/// Increment applied at `current_price`, for display in bid prompts.
pub fn bid_increment(current_price: f64) -> f64 {
    calculate_min_bid(current_price) - current_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_bid_at_rule_boundaries() {
        assert_eq!(calculate_min_bid(0.0), 1.0);
        assert_eq!(calculate_min_bid(99.0), 100.0);
        assert_eq!(calculate_min_bid(100.0), 102.0);
        assert_eq!(calculate_min_bid(499.0), 501.0);
        assert_eq!(calculate_min_bid(500.0), 505.0);
        assert_eq!(calculate_min_bid(1_000.0), 1_010.0);
        assert_eq!(calculate_min_bid(5_000.0), 5_020.0);
        assert_eq!(calculate_min_bid(10_000.0), 10_050.0);
        assert_eq!(calculate_min_bid(50_000.0), 50_100.0);
        assert_eq!(calculate_min_bid(100_000.0), 100_200.0);
        assert_eq!(calculate_min_bid(500_000.0), 500_500.0);
        assert_eq!(calculate_min_bid(1_000_000.0), 1_001_000.0);
        assert_eq!(calculate_min_bid(7_000_000.0), 7_002_000.0);
    }

    #[test]
    fn test_increment_for_display() {
        assert_eq!(bid_increment(50.0), 1.0);
        assert_eq!(bid_increment(2_500.0), 10.0);
    }
}
