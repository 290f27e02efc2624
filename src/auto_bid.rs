//! Automatic bidding on behalf of users who stored a maximum amount.
//!
//! Every recorded bid (manual or automatic) and every new maximum triggers
//! [`process_auto_bids`], which counter-bids for the highest stored maximum
//! until the lot's book is settled. The counter amount is the minimum
//! increment over the current price, or over the leader's own maximum when
//! the leader also runs an auto bid, so two competing maximums settle in a
//! single round instead of trading increments.

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPool;
use tracing::{info, warn};

use crate::bid_calculator::calculate_min_bid;
use crate::db::{self, AutoBid};

/// A settling pass never needs more rounds than this; the leader shortcut
/// resolves competing maximums within one.
const MAX_SETTLE_ROUNDS: usize = 20;

/// Compute the automatic bids a lot's book owes, in placement order.
///
/// `leader_id` is the user currently holding the highest bid, if any.
/// An auto bidder counters only while someone else leads, never beyond
/// their stored maximum, and never below the minimum increment. The
/// returned list is empty when the book is already settled.
pub fn settle_auto_bids(
    current_price: f64,
    leader_id: Option<i64>,
    entries: &[AutoBid],
) -> Vec<(i64, f64)> {
    let mut sorted: Vec<&AutoBid> = entries.iter().collect();
    sorted.sort_by(|a, b| b.max_amount.total_cmp(&a.max_amount));

    let mut price = current_price;
    let mut leader = leader_id;
    let mut bids = Vec::new();

    for _ in 0..MAX_SETTLE_ROUNDS {
        let mut changed = false;

        for entry in &sorted {
            if leader == Some(entry.user_id) || entry.max_amount <= price {
                continue;
            }

            // Counter the leader's own ceiling when the leader also runs an
            // auto bid; otherwise step over the current price.
            let base = leader
                .and_then(|id| sorted.iter().find(|e| e.user_id == id))
                .map(|e| e.max_amount)
                .unwrap_or(price);
            let required = calculate_min_bid(base);

            if entry.max_amount < required || price >= required {
                continue;
            }

            bids.push((entry.user_id, required));
            price = required;
            leader = Some(entry.user_id);
            changed = true;
        }

        if !changed {
            break;
        }
    }

    bids
}

/// Read the lot's auto bids and place the counter-bids the book owes.
///
/// Invoked after every recorded bid and after every stored maximum. A bid
/// lost to a concurrent bidder stops the pass; the next trigger recomputes
/// from the fresh price.
pub async fn process_auto_bids(pool: &PgPool, lot_id: i64) -> Result<()> {
    let Some(lot) = db::get_lot(pool, lot_id).await? else {
        return Ok(());
    };
    if !lot.is_active(Utc::now()) {
        return Ok(());
    }

    let entries = db::list_lot_auto_bids(pool, lot_id).await?;
    if entries.is_empty() {
        return Ok(());
    }

    let leader = db::get_leader_user_id(pool, lot_id).await?;

    for (user_id, amount) in settle_auto_bids(lot.current_price, leader, &entries) {
        if let Err(e) = db::place_bid(pool, lot_id, user_id, amount).await {
            warn!(lot_id, user_id, amount, error = %e, "auto bid superseded");
            break;
        }
        info!(lot_id, user_id, amount, "auto bid placed");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: i64, max_amount: f64) -> AutoBid {
        AutoBid { user_id, max_amount }
    }

    #[test]
    fn test_empty_book_is_settled() {
        assert!(settle_auto_bids(100.0, None, &[]).is_empty());
    }

    #[test]
    fn test_leader_does_not_outbid_themselves() {
        let bids = settle_auto_bids(105.0, Some(1), &[entry(1, 1_000.0)]);
        assert!(bids.is_empty());
    }

    #[test]
    fn test_single_auto_bid_takes_the_lead() {
        // Manual leader at 150; the auto bidder counters at the increment.
        let bids = settle_auto_bids(150.0, Some(9), &[entry(1, 1_000.0)]);
        assert_eq!(bids, vec![(1, 152.0)]);
    }

    #[test]
    fn test_maximum_below_required_counter_stays_out() {
        // Countering 150 needs 152; a 151 ceiling cannot bid.
        let bids = settle_auto_bids(150.0, Some(9), &[entry(1, 151.0)]);
        assert!(bids.is_empty());
    }

    #[test]
    fn test_higher_maximum_jumps_over_leading_auto_bid() {
        // User 1 leads with a 500 ceiling; user 2's 1000 counters the
        // ceiling directly instead of trading increments up from 105.
        let book = [entry(1, 500.0), entry(2, 1_000.0)];
        let bids = settle_auto_bids(105.0, Some(1), &book);
        assert_eq!(bids, vec![(2, 505.0)]);
    }

    #[test]
    fn test_lower_maximum_cannot_displace_leading_auto_bid() {
        // Displacing a 1000 ceiling needs 1010; a 500 ceiling stays out
        // and the price is left untouched.
        let book = [entry(1, 1_000.0), entry(2, 500.0)];
        let bids = settle_auto_bids(105.0, Some(1), &book);
        assert!(bids.is_empty());
    }

    #[test]
    fn test_manual_bid_is_countered_by_stored_maximum() {
        // A fresh manual bid at 200 wakes the auto bidder back up.
        let bids = settle_auto_bids(200.0, Some(9), &[entry(1, 1_000.0)]);
        assert_eq!(bids, vec![(1, 202.0)]);
    }
}
