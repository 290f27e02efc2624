//! Auction database access: users, lots, bids and balances.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use tracing::info;

/// A registered bot user.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub balance: f64,
    pub is_banned: bool,
}

/// An auction lot.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Lot {
    pub id: i64,
    pub title: String,
    pub current_price: f64,
    pub status: String,
    pub seller_id: i64,
    pub end_time: Option<DateTime<Utc>>,
}

impl Lot {
    /// A lot accepts bids while its status is `active` and its end time,
    /// if set, has not passed.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == "active" && self.end_time.map_or(true, |end| end > now)
    }
}

/// A stored auto-bid maximum for one user on one lot.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AutoBid {
    pub user_id: i64,
    pub max_amount: f64,
}

/// One row of a user's bid history, joined with the lot title.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserBid {
    pub lot_id: i64,
    pub lot_title: String,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Initialize the database schema.
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            telegram_id BIGINT NOT NULL UNIQUE,
            username TEXT,
            first_name TEXT,
            balance DOUBLE PRECISION NOT NULL DEFAULT 0,
            is_banned BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create users table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lots (
            id BIGSERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            current_price DOUBLE PRECISION NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            seller_id BIGINT NOT NULL REFERENCES users(id),
            end_time TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create lots table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bids (
            id BIGSERIAL PRIMARY KEY,
            lot_id BIGINT NOT NULL REFERENCES lots(id),
            user_id BIGINT NOT NULL REFERENCES users(id),
            amount DOUBLE PRECISION NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create bids table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS auto_bids (
            lot_id BIGINT NOT NULL REFERENCES lots(id),
            user_id BIGINT NOT NULL REFERENCES users(id),
            max_amount DOUBLE PRECISION NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (lot_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create auto_bids table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS balance_transactions (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id),
            amount DOUBLE PRECISION NOT NULL,
            note TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create balance_transactions table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Look up a user by telegram id, creating them on first contact.
pub async fn get_or_create_user(
    pool: &PgPool,
    telegram_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (telegram_id, username, first_name)
        VALUES ($1, $2, $3)
        ON CONFLICT (telegram_id)
        DO UPDATE SET username = EXCLUDED.username, first_name = EXCLUDED.first_name
        RETURNING id, telegram_id, username, first_name, balance, is_banned
        "#,
    )
    .bind(telegram_id)
    .bind(username)
    .bind(first_name)
    .fetch_one(pool)
    .await
    .context("Failed to upsert user")?;

    Ok(user)
}

pub async fn get_user_by_telegram_id(pool: &PgPool, telegram_id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, telegram_id, username, first_name, balance, is_banned
        FROM users
        WHERE telegram_id = $1
        "#,
    )
    .bind(telegram_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read user")?;

    Ok(user)
}

pub async fn get_lot(pool: &PgPool, lot_id: i64) -> Result<Option<Lot>> {
    let lot = sqlx::query_as::<_, Lot>(
        r#"
        SELECT id, title, current_price, status, seller_id, end_time
        FROM lots
        WHERE id = $1
        "#,
    )
    .bind(lot_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read lot")?;

    Ok(lot)
}

/// Active lots, most recent first.
pub async fn list_active_lots(pool: &PgPool, limit: i64) -> Result<Vec<Lot>> {
    let lots = sqlx::query_as::<_, Lot>(
        r#"
        SELECT id, title, current_price, status, seller_id, end_time
        FROM lots
        WHERE status = 'active' AND (end_time IS NULL OR end_time > NOW())
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to list active lots")?;

    Ok(lots)
}

/// Record a bid and raise the lot price in a single transaction.
///
/// The price update re-checks that the bid still beats the stored price,
/// so two racing bidders cannot both lower the lot.
pub async fn place_bid(pool: &PgPool, lot_id: i64, user_id: i64, amount: f64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let updated = sqlx::query(
        r#"
        UPDATE lots
        SET current_price = $1
        WHERE id = $2 AND current_price < $1 AND status = 'active'
        "#,
    )
    .bind(amount)
    .bind(lot_id)
    .execute(&mut *tx)
    .await
    .context("Failed to update lot price")?;

    if updated.rows_affected() == 0 {
        tx.rollback().await.ok();
        anyhow::bail!("lot {lot_id} no longer accepts a bid of {amount}");
    }

    sqlx::query("INSERT INTO bids (lot_id, user_id, amount) VALUES ($1, $2, $3)")
        .bind(lot_id)
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await
        .context("Failed to insert bid")?;

    tx.commit().await.context("Failed to commit bid")?;

    info!(lot_id, user_id, amount, "bid recorded");
    Ok(())
}

/// Name and amount of the highest bidder on a lot, if any.
pub async fn get_current_leader(pool: &PgPool, lot_id: i64) -> Result<Option<(String, f64)>> {
    let row: Option<(Option<String>, Option<String>, f64)> = sqlx::query_as(
        r#"
        SELECT u.username, u.first_name, b.amount
        FROM bids b
        JOIN users u ON u.id = b.user_id
        WHERE b.lot_id = $1
        ORDER BY b.amount DESC, b.created_at ASC
        LIMIT 1
        "#,
    )
    .bind(lot_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read lot leader")?;

    Ok(row.map(|(username, first_name, amount)| {
        let name = username
            .or(first_name)
            .unwrap_or_else(|| "—".to_string());
        (name, amount)
    }))
}

/// Create or raise an auto bid for a user on a lot.
pub async fn create_auto_bid(pool: &PgPool, lot_id: i64, user_id: i64, max_amount: f64) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO auto_bids (lot_id, user_id, max_amount, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (lot_id, user_id)
        DO UPDATE SET max_amount = EXCLUDED.max_amount, updated_at = NOW()
        "#,
    )
    .bind(lot_id)
    .bind(user_id)
    .bind(max_amount)
    .execute(pool)
    .await
    .context("Failed to upsert auto bid")?;

    info!(lot_id, user_id, max_amount, "auto bid stored");
    Ok(())
}

/// All stored auto-bid maximums for a lot, highest first.
pub async fn list_lot_auto_bids(pool: &PgPool, lot_id: i64) -> Result<Vec<AutoBid>> {
    let auto_bids = sqlx::query_as::<_, AutoBid>(
        r#"
        SELECT user_id, max_amount
        FROM auto_bids
        WHERE lot_id = $1
        ORDER BY max_amount DESC
        "#,
    )
    .bind(lot_id)
    .fetch_all(pool)
    .await
    .context("Failed to list lot auto bids")?;

    Ok(auto_bids)
}

/// Id of the user holding the highest bid on a lot, if any.
pub async fn get_leader_user_id(pool: &PgPool, lot_id: i64) -> Result<Option<i64>> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT user_id
        FROM bids
        WHERE lot_id = $1
        ORDER BY amount DESC, created_at ASC
        LIMIT 1
        "#,
    )
    .bind(lot_id)
    .fetch_optional(pool)
    .await
    .context("Failed to read lot leader")?;

    Ok(row.map(|(user_id,)| user_id))
}

/// A user's bids, most recent first.
pub async fn list_user_bids(pool: &PgPool, user_id: i64) -> Result<Vec<UserBid>> {
    let bids = sqlx::query_as::<_, UserBid>(
        r#"
        SELECT b.lot_id, l.title AS lot_title, b.amount, b.created_at
        FROM bids b
        JOIN lots l ON l.id = b.lot_id
        WHERE b.user_id = $1
        ORDER BY b.created_at DESC
        LIMIT 20
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list user bids")?;

    Ok(bids)
}

/// Credit a user's balance and return the new balance.
pub async fn add_balance(pool: &PgPool, user_id: i64, amount: f64, note: &str) -> Result<f64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let (balance,): (f64,) = sqlx::query_as(
        "UPDATE users SET balance = balance + $1 WHERE id = $2 RETURNING balance",
    )
    .bind(amount)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to credit balance")?;

    sqlx::query("INSERT INTO balance_transactions (user_id, amount, note) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(amount)
        .bind(note)
        .execute(&mut *tx)
        .await
        .context("Failed to record balance transaction")?;

    tx.commit().await.context("Failed to commit top-up")?;

    info!(user_id, amount, "balance credited");
    Ok(balance)
}

/// Debit a user's balance. Returns `None` when funds are insufficient.
pub async fn deduct_balance(
    pool: &PgPool,
    user_id: i64,
    amount: f64,
    note: &str,
) -> Result<Option<f64>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let row: Option<(f64,)> = sqlx::query_as(
        r#"
        UPDATE users
        SET balance = balance - $1
        WHERE id = $2 AND balance >= $1
        RETURNING balance
        "#,
    )
    .bind(amount)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to debit balance")?;

    let Some((balance,)) = row else {
        tx.rollback().await.ok();
        return Ok(None);
    };

    sqlx::query("INSERT INTO balance_transactions (user_id, amount, note) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(-amount)
        .bind(note)
        .execute(&mut *tx)
        .await
        .context("Failed to record balance transaction")?;

    tx.commit().await.context("Failed to commit withdrawal")?;

    info!(user_id, amount, "balance debited");
    Ok(Some(balance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_activity_window() {
        let now = Utc::now();
        let mut lot = Lot {
            id: 1,
            title: "Test lot".to_string(),
            current_price: 100.0,
            status: "active".to_string(),
            seller_id: 1,
            end_time: None,
        };

        assert!(lot.is_active(now));

        lot.end_time = Some(now + chrono::Duration::hours(1));
        assert!(lot.is_active(now));

        lot.end_time = Some(now - chrono::Duration::seconds(1));
        assert!(!lot.is_active(now));

        lot.end_time = None;
        lot.status = "finished".to_string();
        assert!(!lot.is_active(now));
    }
}
