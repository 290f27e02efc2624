use std::env;
use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::info;
use tracing_subscriber::EnvFilter;

use auction_bot::state_store::{PgStateStore, UserStateStore};
use auction_bot::{bot, db, localization};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Auction Telegram Bot");

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let bot_token = env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN must be set");
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    db::init_database_schema(&pool).await?;

    let state_store = PgStateStore::new(pool.clone());
    state_store.init_schema().await?;

    localization::init_localization()?;

    let shared_pool = Arc::new(pool);
    let shared_store: Arc<dyn UserStateStore> = Arc::new(state_store);

    let bot = Bot::new(bot_token);

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let pool = Arc::clone(&shared_pool);
            let store = Arc::clone(&shared_store);
            move |bot: Bot, msg: Message| {
                let pool = Arc::clone(&pool);
                let store = Arc::clone(&store);
                async move { bot::message_handler(bot, msg, pool, store).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let pool = Arc::clone(&shared_pool);
            let store = Arc::clone(&shared_store);
            move |bot: Bot, q: CallbackQuery| {
                let pool = Arc::clone(&pool);
                let store = Arc::clone(&store);
                async move { bot::callback_handler(bot, q, pool, store).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
