//! UI builder: inline keyboards and message formatting.

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::bid_calculator::calculate_min_bid;
use crate::db::{Lot, UserBid};
use crate::localization::{t_args_lang, t_lang};

/// Format a ruble amount: space-grouped thousands, comma decimals.
pub fn format_rub(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped},{frac:02} ₽")
}

/// Keyboard shown under a lot card.
pub fn make_lot_keyboard(lot: &Lot, language_code: Option<&str>) -> InlineKeyboardMarkup {
    let min_bid = calculate_min_bid(lot.current_price);
    let quick_bid_text = t_args_lang(
        "button-quick-bid",
        &[("amount", format_rub(min_bid).as_str())],
        language_code,
    );

    InlineKeyboardMarkup::new(vec![
        vec![InlineKeyboardButton::callback(
            quick_bid_text,
            format!("bid:{}", lot.id),
        )],
        vec![InlineKeyboardButton::callback(
            t_lang("button-custom-bid", language_code),
            format!("custom_bid:{}", lot.id),
        )],
        vec![InlineKeyboardButton::callback(
            t_lang("button-auto-bid", language_code),
            format!("auto_bid:{}", lot.id),
        )],
    ])
}

/// Single "back to lot" button, shown under amount prompts.
pub fn make_back_to_lot_keyboard(lot_id: i64, language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        t_lang("button-back-to-lot", language_code),
        format!("lot_details:{lot_id}"),
    )]])
}

/// One button per active lot, shown after /start.
pub fn make_lots_list_keyboard(lots: &[Lot]) -> InlineKeyboardMarkup {
    let rows = lots
        .iter()
        .map(|lot| {
            vec![InlineKeyboardButton::callback(
                format!("{} — {}", lot.title, format_rub(lot.current_price)),
                format!("lot:{}", lot.id),
            )]
        })
        .collect::<Vec<_>>();

    InlineKeyboardMarkup::new(rows)
}

/// Top-up / withdraw buttons for the balance view.
pub fn make_balance_keyboard(language_code: Option<&str>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            t_lang("button-top-up", language_code),
            "start_top_up".to_string(),
        ),
        InlineKeyboardButton::callback(
            t_lang("button-withdraw", language_code),
            "start_withdraw".to_string(),
        ),
    ]])
}

/// Lot card text with current price and leader, if any.
pub fn format_lot_details(
    lot: &Lot,
    leader: Option<&(String, f64)>,
    language_code: Option<&str>,
) -> String {
    let mut text = t_args_lang(
        "lot-details",
        &[
            ("title", lot.title.as_str()),
            ("price", format_rub(lot.current_price).as_str()),
            ("min_bid", format_rub(calculate_min_bid(lot.current_price)).as_str()),
        ],
        language_code,
    );

    if let Some((name, amount)) = leader {
        text.push('\n');
        text.push_str(&t_args_lang(
            "lot-leader",
            &[("name", name.as_str()), ("amount", format_rub(*amount).as_str())],
            language_code,
        ));
    }

    text
}

/// Prompt asking the user to type a bid amount for a lot.
pub fn format_bid_prompt(lot: &Lot, language_code: Option<&str>) -> String {
    t_args_lang(
        "bid-prompt",
        &[
            ("title", lot.title.as_str()),
            ("price", format_rub(lot.current_price).as_str()),
            ("min_bid", format_rub(calculate_min_bid(lot.current_price)).as_str()),
        ],
        language_code,
    )
}

/// Prompt asking the user to type the maximum amount for an auto bid.
pub fn format_auto_bid_prompt(lot: &Lot, language_code: Option<&str>) -> String {
    t_args_lang(
        "auto-bid-prompt",
        &[
            ("title", lot.title.as_str()),
            ("min_bid", format_rub(calculate_min_bid(lot.current_price)).as_str()),
        ],
        language_code,
    )
}

/// A user's bid history, one line per bid.
pub fn format_my_bids(bids: &[UserBid], language_code: Option<&str>) -> String {
    if bids.is_empty() {
        return t_lang("my-bids-empty", language_code);
    }

    let mut lines = vec![t_lang("my-bids-title", language_code)];
    for bid in bids {
        lines.push(t_args_lang(
            "my-bids-entry",
            &[
                ("title", bid.lot_title.as_str()),
                ("amount", format_rub(bid.amount).as_str()),
                ("date", bid.created_at.format("%d.%m.%Y %H:%M").to_string().as_str()),
            ],
            language_code,
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruble_formatting() {
        assert_eq!(format_rub(0.0), "0,00 ₽");
        assert_eq!(format_rub(150.0), "150,00 ₽");
        assert_eq!(format_rub(1500.5), "1 500,50 ₽");
        assert_eq!(format_rub(1_000_000.0), "1 000 000,00 ₽");
        assert_eq!(format_rub(-42.9), "-42,90 ₽");
    }
}
