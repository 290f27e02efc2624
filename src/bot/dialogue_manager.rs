//! Amount-input handlers for the bid and balance flows.
//!
//! State discipline: a recoverable input problem (bad format, amount below
//! the minimum) keeps the wait-state so the user can retry; every terminal
//! outcome (recorded bid, finished auction, banned user, own lot) clears it.

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::{info, warn};

use crate::auto_bid;
use crate::bid_calculator::calculate_min_bid;
use crate::db::{self, Lot, User};
use crate::dialogue::parse_amount;
use crate::localization::{t_args_lang, t_lang};
use crate::state_store::UserStateStore;

use super::ui_builder::{
    format_lot_details, format_rub, make_back_to_lot_keyboard, make_lot_keyboard,
};

/// Balance flows are open to registered users who are not banned. Returns
/// the localization key of the refusal otherwise.
pub(crate) fn check_balance_user(user: Option<User>) -> Result<User, &'static str> {
    match user {
        None => Err("error-user-not-found"),
        Some(user) if user.is_banned => Err("error-banned"),
        Some(user) => Ok(user),
    }
}

/// Redraw the lot card the user bid from, so its price and quick-bid button
/// reflect the recorded bid. Editing an old card may fail; that is fine.
async fn refresh_lot_card(
    bot: &Bot,
    chat_id: ChatId,
    message_id: Option<i32>,
    pool: &PgPool,
    lot_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(message_id) = message_id else {
        return Ok(());
    };
    let Some(lot) = db::get_lot(pool, lot_id).await? else {
        return Ok(());
    };

    let leader = db::get_current_leader(pool, lot.id).await?;
    let _ = bot
        .edit_message_text(
            chat_id,
            MessageId(message_id),
            format_lot_details(&lot, leader.as_ref(), language_code),
        )
        .reply_markup(make_lot_keyboard(&lot, language_code))
        .await;

    Ok(())
}

/// Preconditions shared by both bid flows. Returns the user and lot when
/// the bid may proceed; otherwise replies, clears the state and returns
/// `None` (terminal outcomes all leave the flow).
async fn check_bid_preconditions(
    bot: &Bot,
    msg: &Message,
    pool: &PgPool,
    store: &dyn UserStateStore,
    user_id: i64,
    lot_id: i64,
    language_code: Option<&str>,
) -> Result<Option<(User, Lot)>> {
    let user = match db::get_user_by_telegram_id(pool, user_id).await? {
        Some(user) => user,
        None => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang("error-user-not-found", language_code))
                .await?;
            return Ok(None);
        }
    };

    if user.is_banned {
        store.clear(user_id).await?;
        bot.send_message(msg.chat.id, t_lang("error-banned", language_code))
            .await?;
        return Ok(None);
    }

    let lot = match db::get_lot(pool, lot_id).await? {
        Some(lot) => lot,
        None => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang("error-lot-not-found", language_code))
                .await?;
            return Ok(None);
        }
    };

    if !lot.is_active(Utc::now()) {
        store.clear(user_id).await?;
        bot.send_message(msg.chat.id, t_lang("error-auction-finished", language_code))
            .await?;
        return Ok(None);
    }

    if lot.seller_id == user.id {
        store.clear(user_id).await?;
        bot.send_message(msg.chat.id, t_lang("error-own-lot", language_code))
            .await?;
        return Ok(None);
    }

    Ok(Some((user, lot)))
}

/// Handle the typed amount while in the custom bid state.
pub async fn handle_bid_amount_input(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: &dyn UserStateStore,
    user_id: i64,
    lot_id: i64,
    prompt_source: Option<i32>,
    input: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let Some((user, lot)) =
        check_bid_preconditions(bot, msg, &pool, store, user_id, lot_id, language_code).await?
    else {
        return Ok(());
    };

    let amount = match parse_amount(input) {
        Ok(amount) => amount,
        Err(key) => {
            // Recoverable: the user stays in the bid-entry state.
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    let min_bid = calculate_min_bid(lot.current_price);
    if amount < min_bid {
        bot.send_message(
            msg.chat.id,
            t_args_lang(
                "error-bid-too-small",
                &[("min_bid", format_rub(min_bid).as_str())],
                language_code,
            ),
        )
        .await?;
        return Ok(());
    }

    if let Err(e) = db::place_bid(&pool, lot.id, user.id, amount).await {
        warn!(user_id, lot_id = lot.id, amount, error = %e, "bid rejected");
        store.clear(user_id).await?;
        bot.send_message(msg.chat.id, t_lang("error-bid-failed", language_code))
            .await?;
        return Ok(());
    }

    store.clear(user_id).await?;
    info!(user_id, lot_id = lot.id, amount, "custom bid accepted");

    auto_bid::process_auto_bids(&pool, lot.id).await?;

    bot.send_message(
        msg.chat.id,
        t_args_lang(
            "bid-accepted",
            &[
                ("title", lot.title.as_str()),
                ("amount", format_rub(amount).as_str()),
            ],
            language_code,
        ),
    )
    .reply_markup(make_back_to_lot_keyboard(lot.id, language_code))
    .await?;

    refresh_lot_card(bot, msg.chat.id, prompt_source, &pool, lot.id, language_code).await?;

    Ok(())
}

/// Handle the typed maximum amount while in the auto bid state.
pub async fn handle_max_bid_amount_input(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: &dyn UserStateStore,
    user_id: i64,
    lot_id: i64,
    prompt_source: Option<i32>,
    input: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let Some((user, lot)) =
        check_bid_preconditions(bot, msg, &pool, store, user_id, lot_id, language_code).await?
    else {
        return Ok(());
    };

    let max_amount = match parse_amount(input) {
        Ok(amount) => amount,
        Err(key) => {
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    let min_bid = calculate_min_bid(lot.current_price);
    if max_amount < min_bid {
        bot.send_message(
            msg.chat.id,
            t_args_lang(
                "error-bid-too-small",
                &[("min_bid", format_rub(min_bid).as_str())],
                language_code,
            ),
        )
        .await?;
        return Ok(());
    }

    db::create_auto_bid(&pool, lot.id, user.id, max_amount).await?;
    store.clear(user_id).await?;
    info!(user_id, lot_id = lot.id, max_amount, "auto bid configured");

    auto_bid::process_auto_bids(&pool, lot.id).await?;

    bot.send_message(
        msg.chat.id,
        t_args_lang(
            "auto-bid-accepted",
            &[
                ("title", lot.title.as_str()),
                ("amount", format_rub(max_amount).as_str()),
            ],
            language_code,
        ),
    )
    .reply_markup(make_back_to_lot_keyboard(lot.id, language_code))
    .await?;

    refresh_lot_card(bot, msg.chat.id, prompt_source, &pool, lot.id, language_code).await?;

    Ok(())
}

/// Handle the typed amount while in the top-up state.
pub async fn handle_top_up_amount_input(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: &dyn UserStateStore,
    user_id: i64,
    input: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let user = match check_balance_user(db::get_user_by_telegram_id(&pool, user_id).await?) {
        Ok(user) => user,
        Err(key) => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    let amount = match parse_amount(input) {
        Ok(amount) => amount,
        Err("amount-not-positive") => {
            // A zero amount means the user gave up; drop the flow.
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang("balance-cancelled", language_code))
                .await?;
            return Ok(());
        }
        Err(key) => {
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    let balance = db::add_balance(&pool, user.id, amount, "Top-up via bot").await?;
    store.clear(user_id).await?;

    bot.send_message(
        msg.chat.id,
        t_args_lang(
            "top-up-done",
            &[
                ("amount", format_rub(amount).as_str()),
                ("balance", format_rub(balance).as_str()),
            ],
            language_code,
        ),
    )
    .await?;

    Ok(())
}

/// Handle the typed amount while in the withdraw state.
pub async fn handle_withdraw_amount_input(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: &dyn UserStateStore,
    user_id: i64,
    input: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let user = match check_balance_user(db::get_user_by_telegram_id(&pool, user_id).await?) {
        Ok(user) => user,
        Err(key) => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    let amount = match parse_amount(input) {
        Ok(amount) => amount,
        Err("amount-not-positive") => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang("balance-cancelled", language_code))
                .await?;
            return Ok(());
        }
        Err(key) => {
            bot.send_message(msg.chat.id, t_lang(key, language_code))
                .await?;
            return Ok(());
        }
    };

    match db::deduct_balance(&pool, user.id, amount, "Withdrawal via bot").await? {
        Some(balance) => {
            store.clear(user_id).await?;
            bot.send_message(
                msg.chat.id,
                t_args_lang(
                    "withdraw-done",
                    &[
                        ("amount", format_rub(amount).as_str()),
                        ("balance", format_rub(balance).as_str()),
                    ],
                    language_code,
                ),
            )
            .await?;
        }
        None => {
            store.clear(user_id).await?;
            bot.send_message(msg.chat.id, t_lang("error-insufficient-funds", language_code))
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_banned: bool) -> User {
        User {
            id: 1,
            telegram_id: 100,
            username: None,
            first_name: Some("Test".to_string()),
            balance: 500.0,
            is_banned,
        }
    }

    #[test]
    fn test_balance_flows_reject_unknown_users() {
        assert_eq!(check_balance_user(None), Err("error-user-not-found"));
    }

    #[test]
    fn test_balance_flows_reject_banned_users() {
        assert_eq!(check_balance_user(Some(user(true))), Err("error-banned"));
    }

    #[test]
    fn test_balance_flows_admit_registered_users() {
        assert_eq!(check_balance_user(Some(user(false))), Ok(user(false)));
    }
}
