//! Message handler: routes incoming text to commands or amount input.
//!
//! Routing order matters. Slash commands are dispatched before the stored
//! flow state is consulted, and the command dispatcher clears any stale
//! bid-entry state as its very first action. A user who walked away from a
//! bid prompt therefore never has a command swallowed by the amount parser.

use anyhow::Result;
use sqlx::postgres::PgPool;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use crate::db;
use crate::dialogue::BidFlowState;
use crate::fsm_guard;
use crate::localization::{t_args_lang, t_lang};
use crate::state_store::UserStateStore;

use super::dialogue_manager::{
    handle_bid_amount_input, handle_max_bid_amount_input, handle_top_up_amount_input,
    handle_withdraw_amount_input,
};
use super::ui_builder::{format_my_bids, format_rub, make_balance_keyboard, make_lots_list_keyboard};

/// Telegram id of the message author (the chat id in private chats).
fn sender_id(msg: &Message) -> i64 {
    msg.from
        .as_ref()
        .map(|user| user.id.0 as i64)
        .unwrap_or(msg.chat.id.0)
}

fn sender_language_code(msg: &Message) -> Option<&str> {
    msg.from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str())
}

pub async fn message_handler(
    bot: Bot,
    msg: Message,
    pool: Arc<PgPool>,
    store: Arc<dyn UserStateStore>,
) -> Result<()> {
    if msg.text().is_some() {
        handle_text_message(&bot, &msg, pool, store).await?;
    } else {
        let language_code = sender_language_code(&msg);
        bot.send_message(msg.chat.id, t_lang("unsupported-message", language_code))
            .await?;
    }

    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: Arc<dyn UserStateStore>,
) -> Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = sender_id(msg);
    let language_code = sender_language_code(msg);

    debug!(user_id, message_length = text.len(), "Received text message from user");

    // Commands win over flow state; the dispatcher guards the exit.
    if text.starts_with('/') {
        return dispatch_command(bot, msg, pool, store, user_id, text, language_code).await;
    }

    match store.get(user_id).await? {
        Some(BidFlowState::AwaitingBidAmount { lot_id, message_id }) => {
            handle_bid_amount_input(
                bot,
                msg,
                pool,
                store.as_ref(),
                user_id,
                lot_id,
                message_id,
                text,
                language_code,
            )
            .await
        }
        Some(BidFlowState::AwaitingMaxBidAmount { lot_id, message_id }) => {
            handle_max_bid_amount_input(
                bot,
                msg,
                pool,
                store.as_ref(),
                user_id,
                lot_id,
                message_id,
                text,
                language_code,
            )
            .await
        }
        Some(BidFlowState::AwaitingTopUpAmount) => {
            handle_top_up_amount_input(bot, msg, pool, store.as_ref(), user_id, text, language_code)
                .await
        }
        Some(BidFlowState::AwaitingWithdrawAmount) => {
            handle_withdraw_amount_input(
                bot,
                msg,
                pool,
                store.as_ref(),
                user_id,
                text,
                language_code,
            )
            .await
        }
        Some(BidFlowState::Idle) | None => {
            bot.send_message(msg.chat.id, t_lang("text-hint", language_code))
                .await?;
            Ok(())
        }
    }
}

/// Single dispatch point for all top-level commands.
///
/// `guard_flow_exit` runs before any command logic, so every command —
/// including ones added later — clears a stale bid-entry state without its
/// handler knowing about the state machine.
async fn dispatch_command(
    bot: &Bot,
    msg: &Message,
    pool: Arc<PgPool>,
    store: Arc<dyn UserStateStore>,
    user_id: i64,
    text: &str,
    language_code: Option<&str>,
) -> Result<()> {
    let command = text.split_whitespace().next().unwrap_or(text);
    let command = command.split('@').next().unwrap_or(command);

    fsm_guard::guard_flow_exit(store.as_ref(), user_id, command).await?;

    match command {
        "/start" => cmd_start(bot, msg, &pool, user_id, language_code).await,
        "/help" => cmd_help(bot, msg, language_code).await,
        "/support" => cmd_support(bot, msg, language_code).await,
        "/my_bids" => cmd_my_bids(bot, msg, &pool, user_id, language_code).await,
        "/balance" => cmd_balance(bot, msg, &pool, user_id, language_code).await,
        _ => {
            bot.send_message(msg.chat.id, t_lang("unknown-command", language_code))
                .await?;
            Ok(())
        }
    }
}

async fn cmd_start(
    bot: &Bot,
    msg: &Message,
    pool: &PgPool,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let (username, first_name) = msg
        .from
        .as_ref()
        .map(|u| (u.username.as_deref(), Some(u.first_name.as_str())))
        .unwrap_or((None, None));

    let user = db::get_or_create_user(pool, user_id, username, first_name).await?;

    if user.is_banned {
        bot.send_message(msg.chat.id, t_lang("error-banned", language_code))
            .await?;
        return Ok(());
    }

    let lots = db::list_active_lots(pool, 10).await?;

    let welcome = format!(
        "{}\n\n{}",
        t_lang("welcome-title", language_code),
        if lots.is_empty() {
            t_lang("welcome-no-lots", language_code)
        } else {
            t_lang("welcome-pick-lot", language_code)
        }
    );

    let mut request = bot.send_message(msg.chat.id, welcome);
    if !lots.is_empty() {
        request = request.reply_markup(make_lots_list_keyboard(&lots));
    }
    request.await?;

    Ok(())
}

async fn cmd_help(bot: &Bot, msg: &Message, language_code: Option<&str>) -> Result<()> {
    let help_message = [
        t_lang("help-title", language_code),
        t_lang("help-browse", language_code),
        t_lang("help-bids", language_code),
        t_lang("help-commands", language_code),
    ]
    .join("\n\n");

    bot.send_message(msg.chat.id, help_message).await?;
    Ok(())
}

async fn cmd_support(bot: &Bot, msg: &Message, language_code: Option<&str>) -> Result<()> {
    bot.send_message(msg.chat.id, t_lang("support-info", language_code))
        .await?;
    Ok(())
}

async fn cmd_my_bids(
    bot: &Bot,
    msg: &Message,
    pool: &PgPool,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(user) = db::get_user_by_telegram_id(pool, user_id).await? else {
        bot.send_message(msg.chat.id, t_lang("error-user-not-found", language_code))
            .await?;
        return Ok(());
    };

    let bids = db::list_user_bids(pool, user.id).await?;
    bot.send_message(msg.chat.id, format_my_bids(&bids, language_code))
        .await?;

    Ok(())
}

async fn cmd_balance(
    bot: &Bot,
    msg: &Message,
    pool: &PgPool,
    user_id: i64,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(user) = db::get_user_by_telegram_id(pool, user_id).await? else {
        bot.send_message(msg.chat.id, t_lang("error-user-not-found", language_code))
            .await?;
        return Ok(());
    };

    bot.send_message(
        msg.chat.id,
        t_args_lang(
            "balance-info",
            &[("balance", format_rub(user.balance).as_str())],
            language_code,
        ),
    )
    .reply_markup(make_balance_keyboard(language_code))
    .await?;

    Ok(())
}
