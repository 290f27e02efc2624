//! # User State Store
//!
//! Persistent per-user flow state keyed by telegram id. At most one state
//! record exists per user; an absent record is equivalent to `Idle`.
//! The store guarantees read-your-writes for a single user's sequential
//! interactions; no cross-user ordering is required or provided.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::dialogue::BidFlowState;

/// Errors raised by the state store backend. These are never retried or
/// suppressed by the callers in this crate; they propagate to the handler.
#[derive(Debug, Clone)]
pub enum StateStoreError {
    /// The backing service could not be read or written.
    Backend(String),
    /// A stored payload could not be decoded.
    Corrupt(String),
}

impl std::fmt::Display for StateStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateStoreError::Backend(msg) => write!(f, "state store backend error: {msg}"),
            StateStoreError::Corrupt(msg) => write!(f, "state store payload error: {msg}"),
        }
    }
}

impl std::error::Error for StateStoreError {}

/// Contract for the per-user state store.
///
/// `set(user_id, Idle)` and `clear(user_id)` are interchangeable: storing
/// the idle state removes the record.
#[async_trait]
pub trait UserStateStore: Send + Sync {
    /// Current state for the user, or `None` when no record exists.
    async fn get(&self, user_id: i64) -> Result<Option<BidFlowState>, StateStoreError>;

    /// Create or overwrite the user's state record.
    async fn set(&self, user_id: i64, state: BidFlowState) -> Result<(), StateStoreError>;

    /// Remove the user's state record (reset to idle).
    async fn clear(&self, user_id: i64) -> Result<(), StateStoreError>;
}

/// In-memory implementation, used in tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: Mutex<HashMap<i64, BidFlowState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStateStore for InMemoryStateStore {
    async fn get(&self, user_id: i64) -> Result<Option<BidFlowState>, StateStoreError> {
        let states = self.states.lock().await;
        Ok(states.get(&user_id).cloned())
    }

    async fn set(&self, user_id: i64, state: BidFlowState) -> Result<(), StateStoreError> {
        let mut states = self.states.lock().await;
        if state == BidFlowState::Idle {
            states.remove(&user_id);
        } else {
            states.insert(user_id, state);
        }
        Ok(())
    }

    async fn clear(&self, user_id: i64) -> Result<(), StateStoreError> {
        let mut states = self.states.lock().await;
        states.remove(&user_id);
        Ok(())
    }
}

/// Postgres-backed implementation. The state is persisted as JSONB so that
/// restarting the bot does not strand users mid-flow.
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn init_schema(&self) -> Result<(), StateStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_flow_states (
                telegram_id BIGINT PRIMARY KEY,
                state JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl UserStateStore for PgStateStore {
    async fn get(&self, user_id: i64) -> Result<Option<BidFlowState>, StateStoreError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT state FROM user_flow_states WHERE telegram_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        match row {
            Some((value,)) => {
                let state = serde_json::from_value(value)
                    .map_err(|e| StateStoreError::Corrupt(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, user_id: i64, state: BidFlowState) -> Result<(), StateStoreError> {
        if state == BidFlowState::Idle {
            return self.clear(user_id).await;
        }

        let payload =
            serde_json::to_value(&state).map_err(|e| StateStoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO user_flow_states (telegram_id, state, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (telegram_id)
            DO UPDATE SET state = EXCLUDED.state, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        debug!(user_id, state = state.label(), "flow state stored");
        Ok(())
    }

    async fn clear(&self, user_id: i64) -> Result<(), StateStoreError> {
        sqlx::query("DELETE FROM user_flow_states WHERE telegram_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StateStoreError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_record_reads_as_none() {
        let store = InMemoryStateStore::new();
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryStateStore::new();
        let state = BidFlowState::AwaitingBidAmount {
            lot_id: 42,
            message_id: Some(7),
        };
        store.set(1, state.clone()).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_set_idle_removes_record() {
        let store = InMemoryStateStore::new();
        store
            .set(
                1,
                BidFlowState::AwaitingBidAmount {
                    lot_id: 42,
                    message_id: None,
                },
            )
            .await
            .unwrap();
        store.set(1, BidFlowState::Idle).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = InMemoryStateStore::new();
        store.clear(1).await.unwrap();
        store.clear(1).await.unwrap();
        assert_eq!(store.get(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_record() {
        let store = InMemoryStateStore::new();
        store
            .set(
                1,
                BidFlowState::AwaitingBidAmount {
                    lot_id: 1,
                    message_id: None,
                },
            )
            .await
            .unwrap();
        store
            .set(
                1,
                BidFlowState::AwaitingBidAmount {
                    lot_id: 2,
                    message_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            store.get(1).await.unwrap(),
            Some(BidFlowState::AwaitingBidAmount {
                lot_id: 2,
                message_id: None,
            })
        );
    }
}
