use auction_bot::auto_bid::settle_auto_bids;
use auction_bot::bid_calculator::calculate_min_bid;
use auction_bot::db::AutoBid;

fn entry(user_id: i64, max_amount: f64) -> AutoBid {
    AutoBid { user_id, max_amount }
}

/// A manual bid wakes the stored maximum: the auto bidder counters at the
/// minimum increment over the new price and takes the lead back.
#[test]
fn test_stored_maximum_counters_a_manual_bid() {
    // User 1 guards lot with a 1000 ceiling; user 9 bids 150 manually.
    let bids = settle_auto_bids(150.0, Some(9), &[entry(1, 1_000.0)]);

    assert_eq!(bids, vec![(1, calculate_min_bid(150.0))]);
}

/// Two stored maximums settle in one exchange: the higher ceiling steps
/// over the lower one, and the loser never bids past their own maximum.
#[test]
fn test_competing_maximums_settle_once() {
    let book = [entry(1, 500.0), entry(2, 2_000.0)];
    let bids = settle_auto_bids(105.0, Some(1), &book);

    assert_eq!(bids, vec![(2, calculate_min_bid(500.0))]);

    // Settled: replaying from the resulting book changes nothing.
    let (leader, price) = bids[bids.len() - 1];
    assert!(settle_auto_bids(price, Some(leader), &book).is_empty());
}

/// The current leader never counters their own bid, and a ceiling at or
/// below the current price stays out of the book entirely.
#[test]
fn test_settled_books_produce_no_bids() {
    assert!(settle_auto_bids(105.0, Some(1), &[entry(1, 1_000.0)]).is_empty());
    assert!(settle_auto_bids(300.0, Some(9), &[entry(1, 300.0)]).is_empty());
    assert!(settle_auto_bids(100.0, None, &[]).is_empty());
}

/// An auction with no bids yet: the stored maximum opens at the minimum
/// increment over the starting price, not at the ceiling.
#[test]
fn test_auto_bid_opens_at_the_increment() {
    let bids = settle_auto_bids(100.0, None, &[entry(1, 5_000.0)]);

    assert_eq!(bids, vec![(1, calculate_min_bid(100.0))]);
}
