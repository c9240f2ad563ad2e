// src/core/engine.rs
use crate::config::{SizingPolicy, TradingConfig};
use crate::connectors::traits::MarketGateway;
use crate::core::metrics;
use crate::forecast::Forecaster;
use crate::indicators::{self, DecisionRow};
use crate::notify::Notifier;
use crate::storage::StateStore;
use crate::types::{
    BotState, EngineEvent, Metrics, PositionState, Side, TradeRecord, QUOTE_ASSET,
};
use crate::utils::precision::{normalize_quantity, size_order};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub initial_balance: Decimal,
    pub update_interval: Duration,
    pub candle_interval: String,
    pub candle_limit: u32,
    pub sizing_policy: SizingPolicy,
}

impl From<&TradingConfig> for EngineConfig {
    fn from(cfg: &TradingConfig) -> Self {
        Self {
            initial_balance: cfg.initial_balance,
            update_interval: Duration::from_secs(cfg.update_interval_secs),
            candle_interval: cfg.candle_interval.clone(),
            candle_limit: cfg.candle_limit,
            sizing_policy: cfg.sizing_policy,
        }
    }
}

#[derive(Debug)]
enum Command {
    SetSymbol(Option<String>),
    Stop,
}

/// Control surface over a running engine. Reads see consistent snapshots;
/// all mutation goes through the engine task.
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<BotState>>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Cooperative stop: the loop exits after the in-flight cycle.
    pub async fn stop(&self) {
        if self.commands.send(Command::Stop).await.is_err() {
            debug!("engine already stopped");
        }
    }

    pub async fn set_active_symbol(&self, symbol: Option<String>) {
        if self.commands.send(Command::SetSymbol(symbol)).await.is_err() {
            warn!("engine is not running; symbol change dropped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> Metrics {
        metrics::compute(&self.state.read().unwrap())
    }

    pub fn snapshot(&self) -> BotState {
        self.state.read().unwrap().clone()
    }

    /// Waits for the engine task to finish. Call after `stop`.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("engine task failed: {e}");
        }
    }
}

pub struct TradingEngine {
    config: EngineConfig,
    gateway: Arc<dyn MarketGateway>,
    forecaster: Box<dyn Forecaster>,
    notifier: Arc<dyn Notifier>,
    store: StateStore,
    state: Arc<RwLock<BotState>>,
    events: mpsc::Sender<EngineEvent>,
    running: Arc<AtomicBool>,
}

impl TradingEngine {
    /// Restores persisted state, spawns the control loop, and returns its
    /// handle.
    pub async fn start(
        config: EngineConfig,
        gateway: Arc<dyn MarketGateway>,
        forecaster: Box<dyn Forecaster>,
        notifier: Arc<dyn Notifier>,
        store: StateStore,
        events: mpsc::Sender<EngineEvent>,
    ) -> EngineHandle {
        let state = Arc::new(RwLock::new(store.load(config.initial_balance).await));
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = mpsc::channel(16);

        let engine = TradingEngine {
            config,
            gateway,
            forecaster,
            notifier,
            store,
            state: state.clone(),
            events,
            running: running.clone(),
        };

        let task = tokio::spawn(engine.run(command_rx));

        EngineHandle {
            commands: command_tx,
            state,
            running,
            task,
        }
    }

    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        info!("engine loop running");

        let mut ticker = tokio::time::interval(self.config.update_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::SetSymbol(symbol)) => self.set_symbol(symbol).await,
                    Some(Command::Stop) | None => break,
                },
                _ = ticker.tick() => {
                    // outermost guard: nothing escapes a single cycle
                    if let Err(e) = self.cycle().await {
                        self.report_error(format!("Error in trading loop: {e:#}")).await;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("engine stopped");
    }

    async fn cycle(&self) -> Result<()> {
        let (symbol, balance, position) = {
            let s = self.state.read().unwrap();
            (s.active_symbol.clone(), s.balance, s.position.clone())
        };
        let Some(symbol) = symbol else {
            debug!("no active symbol selected; idling");
            return Ok(());
        };

        let candles = match self
            .gateway
            .get_candles(&symbol, &self.config.candle_interval, self.config.candle_limit)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                self.report_error(format!("Error getting historical data for {symbol}: {e}"))
                    .await;
                return Ok(());
            }
        };

        let series = indicators::enrich(&candles);
        let Some(row) = series.decision_row() else {
            debug!(
                "indicators warming up for {symbol} ({} candles); skipping cycle",
                candles.len()
            );
            return Ok(());
        };

        let forecast = match self.forecaster.predict(&candles, &series).await {
            Ok(p) => p,
            Err(e) => {
                self.report_error(format!("Error forecasting {symbol}: {e:#}")).await;
                return Ok(());
            }
        };
        let spot = match self.gateway.get_spot_price(&symbol).await {
            Ok(p) => p,
            Err(e) => {
                self.report_error(format!("Error getting spot price for {symbol}: {e}"))
                    .await;
                return Ok(());
            }
        };

        match &position {
            PositionState::Flat if balance > Decimal::ZERO && buy_signal(&row, forecast, spot) => {
                info!(
                    "buy conditions met for {symbol}: rsi={:.1} macd={:.6} signal={:.6} forecast={} spot={}",
                    row.rsi, row.macd, row.signal, forecast, spot
                );
                self.try_buy(&symbol, balance, spot).await;
            }
            PositionState::Holding { symbol: held, .. }
                if held == &symbol && sell_signal(&row, forecast, spot) =>
            {
                info!(
                    "sell conditions met for {symbol}: rsi={:.1} macd={:.6} signal={:.6} forecast={} spot={}",
                    row.rsi, row.macd, row.signal, forecast, spot
                );
                self.try_sell(&symbol).await;
            }
            PositionState::Holding { symbol: held, .. } if held != &symbol => {
                debug!("holding {held} while {symbol} is active; no action");
            }
            _ => {}
        }

        Ok(())
    }

    async fn try_buy(&self, symbol: &str, balance: Decimal, spot: Decimal) {
        let rule = match self.gateway.get_symbol_rule(symbol).await {
            Ok(r) => r,
            Err(e) => {
                self.report_error(format!("Error calculating quantity for {symbol}: {e}"))
                    .await;
                return;
            }
        };

        let quantity = match size_order(balance, spot, &rule, self.config.sizing_policy) {
            Ok(q) => q,
            Err(e) => {
                warn!("abandoning {symbol} buy this cycle: {e}");
                return;
            }
        };

        self.execute_trade(symbol, Side::Buy, quantity).await;
    }

    async fn try_sell(&self, symbol: &str) {
        let asset = symbol.strip_suffix(QUOTE_ASSET).unwrap_or(symbol);
        let held = match self.gateway.get_asset_balance(asset).await {
            Ok(b) => b,
            Err(e) => {
                self.report_error(format!("Error getting balance for {asset}: {e}")).await;
                return;
            }
        };
        if held <= Decimal::ZERO {
            warn!("position recorded in {symbol} but the exchange reports no {asset}; skipping sell");
            return;
        }

        let rule = match self.gateway.get_symbol_rule(symbol).await {
            Ok(r) => r,
            Err(e) => {
                self.report_error(format!("Error calculating quantity for {symbol}: {e}"))
                    .await;
                return;
            }
        };

        let quantity = normalize_quantity(held, rule.step_size);
        if quantity.is_zero() {
            warn!("held {held} {asset} is below one lot step; skipping sell");
            return;
        }

        self.execute_trade(symbol, Side::Sell, quantity).await;
    }

    /// Places the order and, only on a confirmed fill, applies the state
    /// mutation as one step: record, balance, position, persistence,
    /// notification, observer event — in that order. A failed order leaves
    /// state untouched.
    async fn execute_trade(&self, symbol: &str, side: Side, quantity: Decimal) {
        let fill = match self.gateway.place_market_order(symbol, side, quantity).await {
            Ok(f) => f,
            Err(e) => {
                self.report_error(format!("Error executing trade: {e}")).await;
                return;
            }
        };

        let record = TradeRecord {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price: fill.fill_price,
        };

        let snapshot = {
            let mut s = self.state.write().unwrap();
            s.history.push(record.clone());
            match side {
                Side::Buy => {
                    // can go negative under the clamp sizing policy; the
                    // overspend is deliberate and warned about at sizing time
                    s.balance -= quantity * fill.fill_price;
                    s.position = PositionState::Holding {
                        symbol: symbol.to_string(),
                        quantity,
                        entry_price: fill.fill_price,
                    };
                }
                Side::Sell => {
                    s.balance += quantity * fill.fill_price;
                    s.position = PositionState::Flat;
                }
            }
            s.last_update = Some(record.timestamp);
            s.clone()
        };

        if let Err(e) = self.store.save(&snapshot).await {
            self.report_error(format!("Error saving state: {e}")).await;
        }

        self.notifier
            .notify(&format!("{} {} {} at {}", side, quantity, symbol, fill.fill_price))
            .await;
        self.emit(EngineEvent::Trade(record));

        info!(
            "✅ order {} filled: {} {} {} at {}",
            fill.order_id, side, quantity, symbol, fill.fill_price
        );
    }

    async fn set_symbol(&self, symbol: Option<String>) {
        let snapshot = {
            let mut s = self.state.write().unwrap();
            s.active_symbol = symbol.clone();
            s.last_update = Some(Utc::now());
            s.clone()
        };

        if let Err(e) = self.store.save(&snapshot).await {
            self.report_error(format!("Error saving state: {e}")).await;
        }

        match symbol {
            Some(s) => info!("active symbol set to {s}"),
            None => info!("active symbol cleared"),
        }
    }

    async fn report_error(&self, message: String) {
        error!("Error: {message}");
        self.notifier.notify(&format!("❌ Error: {message}")).await;
        self.emit(EngineEvent::Error(message));
    }

    fn emit(&self, event: EngineEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("no observer attached; event dropped");
            }
        }
    }
}

fn buy_signal(row: &DecisionRow, forecast: Decimal, spot: Decimal) -> bool {
    row.rsi < RSI_OVERSOLD && row.macd > row.signal && forecast > spot
}

fn sell_signal(row: &DecisionRow, forecast: Decimal, spot: Decimal) -> bool {
    row.rsi > RSI_OVERBOUGHT && row.macd < row.signal && forecast < spot
}
