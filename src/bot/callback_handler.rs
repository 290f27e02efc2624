//! Callback handler for inline keyboard buttons.
//!
//! Transition points into the bid-entry flow (`custom_bid:`, `auto_bid:`)
//! and out of it (`lot:`, `lot_details:`, `cancel`) live here. Exit actions
//! call the guard before doing anything else.

use anyhow::Result;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, info};

use crate::auto_bid;
use crate::bid_calculator::calculate_min_bid;
use crate::db::{self, Lot, User};
use crate::dialogue::BidFlowState;
use crate::fsm_guard;
use crate::localization::{t_args_lang, t_lang};
use crate::state_store::UserStateStore;

use super::dialogue_manager::check_balance_user;
use super::ui_builder::{
    format_auto_bid_prompt, format_bid_prompt, format_lot_details, format_rub,
    make_back_to_lot_keyboard, make_lot_keyboard,
};

/// Extract the lot id from callback data like `custom_bid:42`.
pub fn parse_lot_id(data: &str, prefix: &str) -> Option<i64> {
    data.strip_prefix(prefix)?.parse().ok()
}

/// Handle callback queries from inline keyboards.
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    pool: Arc<PgPool>,
    store: Arc<dyn UserStateStore>,
) -> Result<()> {
    let user_id = q.from.id.0 as i64;
    let language_code = q.from.language_code.as_deref();
    let data = q.data.as_deref().unwrap_or("");

    debug!(user_id, data, "Received callback query from user");

    if let Some(lot_id) = parse_lot_id(data, "lot:").or_else(|| parse_lot_id(data, "lot_details:")) {
        // Back to the lot card is a flow exit; clear any pending amount wait.
        fsm_guard::guard_flow_exit(store.as_ref(), user_id, "back_to_lot").await?;
        show_lot_details(&bot, &q, &pool, lot_id, language_code).await?;
    } else if let Some(lot_id) = parse_lot_id(data, "custom_bid:") {
        start_amount_entry(&bot, &q, &pool, store.as_ref(), lot_id, false, language_code).await?;
    } else if let Some(lot_id) = parse_lot_id(data, "auto_bid:") {
        start_amount_entry(&bot, &q, &pool, store.as_ref(), lot_id, true, language_code).await?;
    } else if let Some(lot_id) = parse_lot_id(data, "bid:") {
        quick_bid(&bot, &q, &pool, lot_id, language_code).await?;
    } else if data == "start_top_up" {
        start_balance_entry(
            &bot,
            &q,
            &pool,
            store.as_ref(),
            BidFlowState::AwaitingTopUpAmount,
            language_code,
        )
        .await?;
    } else if data == "start_withdraw" {
        start_balance_entry(
            &bot,
            &q,
            &pool,
            store.as_ref(),
            BidFlowState::AwaitingWithdrawAmount,
            language_code,
        )
        .await?;
    } else if data == "cancel" {
        // Cancel drops whatever flow the user was in, bid or balance.
        store.clear(user_id).await?;
        info!(user_id, "flow cancelled by user");
        if let Some(chat_id) = callback_chat_id(&q) {
            bot.send_message(chat_id, t_lang("action-cancelled", language_code))
                .await?;
        }
    }

    // Answer the callback query to remove the loading state. Some branches
    // already answered with an alert, so a second answer may be rejected.
    let _ = bot.answer_callback_query(q.id).await;

    Ok(())
}

fn callback_chat_id(q: &CallbackQuery) -> Option<ChatId> {
    q.message.as_ref().map(|msg| msg.chat().id)
}

fn callback_message_id(q: &CallbackQuery) -> Option<i32> {
    q.message.as_ref().map(|msg| msg.id().0)
}

/// Fetch the user and lot and run the shared bid preconditions. Replies via
/// a callback answer (alert) when a precondition fails.
async fn check_callback_bid_preconditions(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &PgPool,
    lot_id: i64,
    language_code: Option<&str>,
) -> Result<Option<(User, Lot)>> {
    let user_id = q.from.id.0 as i64;

    let user = match db::get_user_by_telegram_id(pool, user_id).await? {
        Some(user) => user,
        None => {
            answer_alert(bot, q, &t_lang("error-press-start", language_code)).await?;
            return Ok(None);
        }
    };

    if user.is_banned {
        answer_alert(bot, q, &t_lang("error-banned", language_code)).await?;
        return Ok(None);
    }

    let lot = match db::get_lot(pool, lot_id).await? {
        Some(lot) => lot,
        None => {
            answer_alert(bot, q, &t_lang("error-lot-not-found", language_code)).await?;
            return Ok(None);
        }
    };

    if !lot.is_active(Utc::now()) {
        answer_alert(bot, q, &t_lang("error-auction-finished", language_code)).await?;
        return Ok(None);
    }

    if lot.seller_id == user.id {
        answer_alert(bot, q, &t_lang("error-own-lot", language_code)).await?;
        return Ok(None);
    }

    Ok(Some((user, lot)))
}

async fn answer_alert(bot: &Bot, q: &CallbackQuery, text: &str) -> Result<()> {
    bot.answer_callback_query(q.id.clone())
        .text(text)
        .show_alert(true)
        .await?;
    Ok(())
}

async fn show_lot_details(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &PgPool,
    lot_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(lot) = db::get_lot(pool, lot_id).await? else {
        answer_alert(bot, q, &t_lang("error-lot-not-found", language_code)).await?;
        return Ok(());
    };

    let leader = db::get_current_leader(pool, lot.id).await?;
    let text = format_lot_details(&lot, leader.as_ref(), language_code);
    let keyboard = make_lot_keyboard(&lot, language_code);

    if let Some(msg) = &q.message {
        // Editing can fail when the card is unchanged or too old; fall back
        // to a fresh message.
        if bot
            .edit_message_text(msg.chat().id, msg.id(), text.clone())
            .reply_markup(keyboard.clone())
            .await
            .is_err()
        {
            bot.send_message(msg.chat().id, text)
                .reply_markup(keyboard)
                .await?;
        }
    }

    Ok(())
}

/// Transition into a bid-entry state and prompt for the amount.
///
/// Re-tapping the button for another lot overwrites the stored context:
/// the newest prompt is the one the next message answers.
async fn start_amount_entry(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &PgPool,
    store: &dyn UserStateStore,
    lot_id: i64,
    auto_bid: bool,
    language_code: Option<&str>,
) -> Result<()> {
    let Some((_, lot)) =
        check_callback_bid_preconditions(bot, q, pool, lot_id, language_code).await?
    else {
        return Ok(());
    };

    let user_id = q.from.id.0 as i64;
    let message_id = callback_message_id(q);

    let (state, prompt) = if auto_bid {
        (
            BidFlowState::AwaitingMaxBidAmount { lot_id, message_id },
            format_auto_bid_prompt(&lot, language_code),
        )
    } else {
        (
            BidFlowState::AwaitingBidAmount { lot_id, message_id },
            format_bid_prompt(&lot, language_code),
        )
    };

    store.set(user_id, state).await?;
    info!(user_id, lot_id, auto_bid, "entered bid amount entry");

    if let Some(chat_id) = callback_chat_id(q) {
        bot.send_message(chat_id, prompt)
            .reply_markup(make_back_to_lot_keyboard(lot_id, language_code))
            .await?;
    }

    Ok(())
}

/// Place an immediate bid at the minimum increment, with no wait-state.
async fn quick_bid(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &PgPool,
    lot_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let Some((user, lot)) =
        check_callback_bid_preconditions(bot, q, pool, lot_id, language_code).await?
    else {
        return Ok(());
    };

    let amount = calculate_min_bid(lot.current_price);

    if let Err(e) = db::place_bid(pool, lot.id, user.id, amount).await {
        debug!(user_id = user.telegram_id, lot_id, error = %e, "quick bid lost the race");
        answer_alert(bot, q, &t_lang("error-bid-failed", language_code)).await?;
        return Ok(());
    }

    auto_bid::process_auto_bids(pool, lot.id).await?;

    if let Some(chat_id) = callback_chat_id(q) {
        bot.send_message(
            chat_id,
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
    }

    Ok(())
}

async fn start_balance_entry(
    bot: &Bot,
    q: &CallbackQuery,
    pool: &PgPool,
    store: &dyn UserStateStore,
    state: BidFlowState,
    language_code: Option<&str>,
) -> Result<()> {
    let user_id = q.from.id.0 as i64;

    // Same gate as the bid flows: unknown and banned users stay out.
    if let Err(key) = check_balance_user(db::get_user_by_telegram_id(pool, user_id).await?) {
        answer_alert(bot, q, &t_lang(key, language_code)).await?;
        return Ok(());
    }

    let prompt_key = match state {
        BidFlowState::AwaitingTopUpAmount => "top-up-prompt",
        _ => "withdraw-prompt",
    };

    store.set(user_id, state).await?;

    if let Some(chat_id) = callback_chat_id(q) {
        bot.send_message(chat_id, t_lang(prompt_key, language_code))
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lot_id_parsing() {
        assert_eq!(parse_lot_id("custom_bid:42", "custom_bid:"), Some(42));
        assert_eq!(parse_lot_id("lot_details:7", "lot_details:"), Some(7));
        assert_eq!(parse_lot_id("custom_bid:", "custom_bid:"), None);
        assert_eq!(parse_lot_id("custom_bid:abc", "custom_bid:"), None);
        assert_eq!(parse_lot_id("other:42", "custom_bid:"), None);
    }
}
