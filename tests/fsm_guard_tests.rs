use std::sync::Arc;

use anyhow::Result;

use auction_bot::dialogue::{parse_amount, BidFlowState};
use auction_bot::fsm_guard::{
    clear_bid_state_if_needed, current_state_name, guard_flow_exit, is_awaiting_bid,
};
use auction_bot::state_store::{InMemoryStateStore, UserStateStore};

fn awaiting_bid(lot_id: i64) -> BidFlowState {
    BidFlowState::AwaitingBidAmount {
        lot_id,
        message_id: None,
    }
}

/// A user who never entered the bid flow is not awaiting an amount.
#[tokio::test]
async fn test_fresh_user_is_idle() -> Result<()> {
    let store = InMemoryStateStore::new();

    assert!(!is_awaiting_bid(&store, 100).await?);
    assert_eq!(current_state_name(&store, 100).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_transition_into_bid_entry() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, awaiting_bid(42)).await?;

    assert!(is_awaiting_bid(&store, 100).await?);
    assert_eq!(
        current_state_name(&store, 100).await?,
        Some("awaiting_bid_amount")
    );

    Ok(())
}

/// First clear reports the write; the second is a no-op and the state after
/// both calls equals the state after the first alone.
#[tokio::test]
async fn test_clear_is_idempotent() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, awaiting_bid(42)).await?;
    assert!(clear_bid_state_if_needed(&store, 100).await?);
    let after_first = store.get(100).await?;

    assert!(!clear_bid_state_if_needed(&store, 100).await?);
    assert_eq!(store.get(100).await?, after_first);
    assert_eq!(after_first, None);

    // Clearing an idle user reports no write either.
    assert!(!clear_bid_state_if_needed(&store, 200).await?);

    Ok(())
}

/// Every flow-exit action resets the user before its handler logic runs.
#[tokio::test]
async fn test_exit_path_coverage() -> Result<()> {
    let store = InMemoryStateStore::new();

    for action in ["back_to_lot", "/start", "/support", "/my_bids"] {
        store.set(100, awaiting_bid(5)).await?;
        assert!(is_awaiting_bid(&store, 100).await?);

        assert!(guard_flow_exit(&store, 100, action).await?, "{action}");
        assert!(!is_awaiting_bid(&store, 100).await?, "{action}");
    }

    Ok(())
}

/// Reproduces the defect the guard exists to prevent: after backing out of
/// a bid prompt, an unrelated command must run as a command, not be fed to
/// the amount parser.
#[tokio::test]
async fn test_command_after_abandoned_bid_prompt() -> Result<()> {
    let store = InMemoryStateStore::new();

    // User taps "enter custom amount" for lot 42.
    store.set(100, awaiting_bid(42)).await?;
    assert!(is_awaiting_bid(&store, 100).await?);

    // User taps "back to lot".
    assert!(guard_flow_exit(&store, 100, "back_to_lot").await?);
    assert!(!is_awaiting_bid(&store, 100).await?);

    // User sends /support: the guard finds nothing to clear and the
    // command proceeds normally.
    assert!(!guard_flow_exit(&store, 100, "/support").await?);
    assert!(!is_awaiting_bid(&store, 100).await?);

    Ok(())
}

/// No regression for a user who legitimately bids: the typed amount is
/// parsed while awaiting, the state is cleared after the bid is recorded,
/// and the next command sees an idle user.
#[tokio::test]
async fn test_legitimate_bid_flow() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, awaiting_bid(7)).await?;
    assert!(is_awaiting_bid(&store, 100).await?);

    // The bid-submission handler parses the typed amount...
    assert_eq!(parse_amount("150"), Ok(150.0));

    // ...records the bid and resets the state.
    store.clear(100).await?;

    assert!(!guard_flow_exit(&store, 100, "/my_bids").await?);
    assert!(!is_awaiting_bid(&store, 100).await?);

    Ok(())
}

/// An invalid typed amount leaves the wait-state in place for a retry.
#[tokio::test]
async fn test_invalid_amount_keeps_state() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, awaiting_bid(7)).await?;
    assert!(parse_amount("not a number").is_err());

    // The handler showed an error and did not touch the store.
    assert!(is_awaiting_bid(&store, 100).await?);
    assert_eq!(store.get(100).await?, Some(awaiting_bid(7)));

    Ok(())
}

/// Re-tapping "enter custom amount" for another lot overwrites the context.
#[tokio::test]
async fn test_retap_overwrites_target_lot() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, awaiting_bid(42)).await?;
    store.set(100, awaiting_bid(43)).await?;

    assert_eq!(store.get(100).await?, Some(awaiting_bid(43)));
    assert!(is_awaiting_bid(&store, 100).await?);

    Ok(())
}

/// Operations on one user never touch another user's record.
#[tokio::test]
async fn test_cross_user_isolation() -> Result<()> {
    let store = Arc::new(InMemoryStateStore::new());

    let store_a = Arc::clone(&store);
    let store_b = Arc::clone(&store);

    let user_a = tokio::spawn(async move {
        for lot_id in 0..50 {
            store_a.set(1, awaiting_bid(lot_id)).await.unwrap();
            clear_bid_state_if_needed(store_a.as_ref(), 1).await.unwrap();
        }
    });
    let user_b = tokio::spawn(async move {
        for _ in 0..50 {
            store_b.set(2, awaiting_bid(99)).await.unwrap();
        }
    });

    let (a, b) = tokio::join!(user_a, user_b);
    a.unwrap();
    b.unwrap();

    assert!(!is_awaiting_bid(store.as_ref(), 1).await?);
    assert_eq!(store.get(2).await?, Some(awaiting_bid(99)));

    Ok(())
}

/// The bid guard never clears balance flows; only the explicit cancel does.
#[tokio::test]
async fn test_balance_flow_survives_the_bid_guard() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(100, BidFlowState::AwaitingTopUpAmount).await?;

    assert!(!guard_flow_exit(&store, 100, "/start").await?);
    assert_eq!(
        store.get(100).await?,
        Some(BidFlowState::AwaitingTopUpAmount)
    );

    // The cancel button clears any flow.
    store.clear(100).await?;
    assert_eq!(store.get(100).await?, None);

    Ok(())
}
