// src/main.rs
use anyhow::Context;
use dotenvy::dotenv;
use pennybot::config::AppConfig;
use pennybot::connectors::binance::BinanceClient;
use pennybot::connectors::traits::MarketGateway;
use pennybot::core::engine::{EngineConfig, TradingEngine};
use pennybot::core::selector::list_viable_coins;
use pennybot::forecast::LinearForecaster;
use pennybot::notify::{Notifier, NullNotifier, TelegramNotifier};
use pennybot::storage::StateStore;
use pennybot::types::EngineEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let config = AppConfig::new().context("failed to load configuration")?;
    let _log_guard = init_tracing(&config);

    println!("========================================");
    println!("         PENNYBOT - v0.1.0");
    println!("========================================");
    println!("Budget:   {} USDT", config.trading.initial_balance);
    println!("Interval: {}s", config.trading.update_interval_secs);
    println!(
        "Alerts:   {}",
        if config.telegram.is_some() {
            "Telegram"
        } else {
            "log only"
        }
    );
    println!("========================================");

    // 2. Initialize Components
    let client = BinanceClient::new(config.api.key.clone(), config.api.secret.clone());
    client.ping().await.context("exchange is unreachable")?;
    let gateway: Arc<dyn MarketGateway> = Arc::new(client);

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(t) => Arc::new(TelegramNotifier::new(t.token.clone(), t.chat_id.clone())),
        None => Arc::new(NullNotifier),
    };

    let store = StateStore::new(&config.state_file);
    let forecaster = Box::new(LinearForecaster::new(config.forecast.lookback));

    // 3. Start the Engine
    let (event_tx, mut event_rx) = mpsc::channel(100);
    let handle = TradingEngine::start(
        EngineConfig::from(&config.trading),
        gateway.clone(),
        forecaster,
        notifier.clone(),
        store,
        event_tx,
    )
    .await;

    // 4. Pick a coin unless one survived the restart or is pinned in config
    if handle.snapshot().active_symbol.is_none() {
        let symbol = match &config.trading.symbol {
            Some(s) => Some(s.clone()),
            None => {
                let coins = list_viable_coins(
                    gateway.as_ref(),
                    notifier.as_ref(),
                    config.trading.max_coin_price,
                    config.trading.top_candidates,
                )
                .await;
                for coin in &coins {
                    info!(
                        "candidate {}: price={} quote_volume={:.0}",
                        coin.symbol, coin.price, coin.quote_volume
                    );
                }
                coins.first().map(|c| c.symbol.clone())
            }
        };

        match symbol {
            Some(s) => handle.set_active_symbol(Some(s)).await,
            None => warn!("no viable coin found; engine idles until a symbol is set"),
        }
    }

    // 5. Mirror engine events into the log until shutdown
    let observer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                EngineEvent::Trade(t) => {
                    info!("trade: {} {} {} at {}", t.side, t.quantity, t.symbol, t.price)
                }
                EngineEvent::Error(e) => error!("engine error: {e}"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    handle.stop().await;
    handle.join().await;
    observer.abort();

    Ok(())
}

fn init_tracing(config: &AppConfig) -> Option<WorkerGuard> {
    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pennybot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_writer(writer).with_ansi(false).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().init();
            None
        }
    }
}
