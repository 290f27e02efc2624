//! Per-user bid flow state and amount input validation.

use serde::{Deserialize, Serialize};

/// Represents the flow state of a single user.
///
/// The attached payload lives inside the variant, so an `Idle` user can
/// never carry a stale lot id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum BidFlowState {
    #[default]
    Idle,
    /// The user tapped "enter custom amount" for a lot and the next text
    /// message is expected to be the bid amount.
    AwaitingBidAmount {
        lot_id: i64,
        message_id: Option<i32>,
    },
    /// The user is setting the maximum amount for an auto bid.
    AwaitingMaxBidAmount {
        lot_id: i64,
        message_id: Option<i32>,
    },
    /// The user is entering a balance top-up amount.
    AwaitingTopUpAmount,
    /// The user is entering a withdrawal amount.
    AwaitingWithdrawAmount,
}

impl BidFlowState {
    /// Stable state name for diagnostics and logging.
    pub fn label(&self) -> &'static str {
        match self {
            BidFlowState::Idle => "idle",
            BidFlowState::AwaitingBidAmount { .. } => "awaiting_bid_amount",
            BidFlowState::AwaitingMaxBidAmount { .. } => "awaiting_max_bid_amount",
            BidFlowState::AwaitingTopUpAmount => "awaiting_top_up_amount",
            BidFlowState::AwaitingWithdrawAmount => "awaiting_withdraw_amount",
        }
    }

    /// True for the bid-entry states that the guard is allowed to clear.
    ///
    /// The balance states are deliberately excluded: leaving a top-up flow
    /// is handled by the explicit `cancel` action, not by the bid guard.
    pub fn is_bid_entry(&self) -> bool {
        matches!(
            self,
            BidFlowState::AwaitingBidAmount { .. } | BidFlowState::AwaitingMaxBidAmount { .. }
        )
    }
}

static AMOUNT_PATTERN: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"^\d+(?:\.\d{1,2})?$").unwrap());

/// Validates a typed monetary amount.
///
/// Accepts spaces as thousands separators and a decimal comma
/// ("1 500,50" parses to 1500.5). Returns an error key suitable for
/// localization lookup.
pub fn parse_amount(input: &str) -> Result<f64, &'static str> {
    let normalized: String = input
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if normalized.is_empty() {
        return Err("amount-empty");
    }

    if !AMOUNT_PATTERN.is_match(&normalized) {
        return Err("amount-invalid-format");
    }

    let amount: f64 = normalized.parse().map_err(|_| "amount-invalid-format")?;

    if !amount.is_finite() || amount <= 0.0 {
        return Err("amount-not-positive");
    }

    Ok(amount)
}
