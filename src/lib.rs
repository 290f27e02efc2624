//! # Auction Telegram Bot
//!
//! A Telegram bot for browsing auction lots and placing bids. The heart of
//! the crate is the bid-entry state machine: per-user tracking of whether
//! the bot is waiting for a typed amount, guarded so that navigating away
//! from a bid prompt can never leave a user stranded mid-flow.

pub mod auto_bid;
pub mod bid_calculator;
pub mod bot;
pub mod db;
pub mod dialogue;
pub mod fsm_guard;
pub mod localization;
pub mod state_store;
