//! # Bid-entry state guard
//!
//! A user who tapped "enter custom amount" is in a bid-entry state: their
//! next text message is routed to the amount parser. If they navigate away
//! instead (back to the lot, any slash command), that state must be cleared
//! before the new action runs, or their next unrelated message would be
//! misread as a malformed amount.
//!
//! Every flow-exit transition point routes through [`guard_flow_exit`], so
//! adding a new top-level command never requires touching this module.
//! The guard never expires state by time; only explicit transition points
//! clear it.

use tracing::info;

use crate::state_store::{StateStoreError, UserStateStore};

/// True iff the user is currently expected to type a bid amount.
///
/// An absent record reads as `false`. No side effects.
pub async fn is_awaiting_bid(
    store: &dyn UserStateStore,
    user_id: i64,
) -> Result<bool, StateStoreError> {
    let state = store.get(user_id).await?;
    Ok(state.map(|s| s.is_bid_entry()).unwrap_or(false))
}

/// Resets the user to idle if they are in a bid-entry state.
///
/// Idempotent: clearing an already idle user is a no-op that returns
/// `false`. The return value exists for observability only; callers must
/// not branch business logic on it.
pub async fn clear_bid_state_if_needed(
    store: &dyn UserStateStore,
    user_id: i64,
) -> Result<bool, StateStoreError> {
    match store.get(user_id).await? {
        Some(state) if state.is_bid_entry() => {
            store.clear(user_id).await?;
            info!(user_id, state = state.label(), "cleared bid-entry state");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Raw label of the user's current state, for diagnostics.
///
/// Business decisions belong on [`is_awaiting_bid`], not on this.
pub async fn current_state_name(
    store: &dyn UserStateStore,
    user_id: i64,
) -> Result<Option<&'static str>, StateStoreError> {
    let state = store.get(user_id).await?;
    Ok(state.map(|s| s.label()))
}

/// Shared entry-point wrapper for every action that leaves the bid-entry
/// flow: back-to-lot navigation, cancel, and all top-level commands.
///
/// Must be the first thing a flow-exit handler does, before its own logic.
pub async fn guard_flow_exit(
    store: &dyn UserStateStore,
    user_id: i64,
    action: &str,
) -> Result<bool, StateStoreError> {
    let cleared = clear_bid_state_if_needed(store, user_id).await?;
    if cleared {
        info!(user_id, action, "bid-entry state cleared on flow exit");
    }
    Ok(cleared)
}
