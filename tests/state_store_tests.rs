use anyhow::Result;

use auction_bot::dialogue::BidFlowState;
use auction_bot::state_store::{InMemoryStateStore, UserStateStore};

fn awaiting_bid(lot_id: i64) -> BidFlowState {
    BidFlowState::AwaitingBidAmount {
        lot_id,
        message_id: None,
    }
}

/// Read-your-writes: a user's sequential set/get/clear always observe the
/// latest write.
#[tokio::test]
async fn test_read_your_writes() -> Result<()> {
    let store = InMemoryStateStore::new();

    assert_eq!(store.get(1).await?, None);

    store.set(1, awaiting_bid(42)).await?;
    assert_eq!(store.get(1).await?, Some(awaiting_bid(42)));

    store.set(1, awaiting_bid(43)).await?;
    assert_eq!(store.get(1).await?, Some(awaiting_bid(43)));

    store.clear(1).await?;
    assert_eq!(store.get(1).await?, None);

    Ok(())
}

/// Storing the idle state is the same as clearing: no record survives, so
/// an idle user can never carry a payload.
#[tokio::test]
async fn test_set_idle_equals_clear() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(1, awaiting_bid(42)).await?;
    store.set(1, BidFlowState::Idle).await?;
    assert_eq!(store.get(1).await?, None);

    store.set(2, awaiting_bid(42)).await?;
    store.clear(2).await?;
    assert_eq!(store.get(2).await?, None);

    Ok(())
}

/// At most one record per user: a new transition replaces the old one.
#[tokio::test]
async fn test_single_record_per_user() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(1, awaiting_bid(42)).await?;
    store.set(1, BidFlowState::AwaitingTopUpAmount).await?;

    assert_eq!(store.get(1).await?, Some(BidFlowState::AwaitingTopUpAmount));

    Ok(())
}

/// Records are keyed by user id; neighbours are unaffected.
#[tokio::test]
async fn test_records_are_per_user() -> Result<()> {
    let store = InMemoryStateStore::new();

    store.set(1, awaiting_bid(42)).await?;
    store.set(2, awaiting_bid(7)).await?;
    store.clear(1).await?;

    assert_eq!(store.get(1).await?, None);
    assert_eq!(store.get(2).await?, Some(awaiting_bid(7)));

    Ok(())
}
