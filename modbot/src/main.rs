mod config;

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use modbot_common::hub::HubState;
use modbot_common::mongodb::options::ClientOptions;
use modbot_common::mongodb::{Client, Database};
use modbot_common::teloxide::adaptors::throttle::Limits;
use modbot_common::teloxide::adaptors::CacheMe;
use modbot_common::teloxide::prelude::{Bot, RequesterExt};
use modbot_common::tgbot::BotData;
use moderation::store::{MemoryStore, ModerationStore, MongoStore};
use moderation::ModerationModule;

use crate::config::Config;

fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();
    let log_level = if std::env::var("DEBUG").is_ok() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("modbot_common", log_level)
        .with_module_level("moderation", log_level)
        .env()
        .init()?;

    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install AWS LC provider"))?;

    let config = Config::from_env()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            let store: Arc<dyn ModerationStore> = match &config.mongodb_uri {
                Some(uri) => Arc::new(MongoStore::new(get_db(uri).await?).await?),
                None => {
                    warn!("MONGODB_URI not set, warnings and tickets will be lost on restart");
                    Arc::new(MemoryStore::new())
                }
            };

            let hub = Arc::new(HubState::new());
            let bot = BotData::new(
                CacheMe::new(
                    Bot::with_client(
                        config.bot_token.clone(),
                        reqwest::Client::builder()
                            .timeout(Duration::from_secs(30))
                            .build()?,
                    )
                    .set_api_url(config.telegram_api_url.clone())
                    .throttle(Limits::default()),
                ),
                Arc::clone(&hub),
            )
            .await?;
            let bot = Arc::new(bot);
            info!("Logged in as {}", bot.id());

            hub.add_bot_module(ModerationModule::new(
                config.moderation.clone(),
                bot.clone(),
                store,
            ))
            .await;
            hub.start_modules().await?;

            bot.start_polling().await?;
            info!("Started polling");

            tokio::time::sleep(Duration::from_secs(u64::MAX)).await;

            Ok(())
        })
}

async fn get_db(client_uri: &str) -> Result<Database, anyhow::Error> {
    let options = ClientOptions::parse(client_uri).await?;
    let client = Client::with_options(options)?;
    client
        .default_database()
        .ok_or_else(|| anyhow::anyhow!("No default database specified in MONGODB_URI"))
}
