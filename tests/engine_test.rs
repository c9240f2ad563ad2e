//! End-to-end engine scenarios against in-process mock collaborators.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pennybot::config::SizingPolicy;
use pennybot::connectors::traits::{GatewayError, MarketGateway};
use pennybot::core::engine::{EngineConfig, EngineHandle, TradingEngine};
use pennybot::forecast::Forecaster;
use pennybot::indicators::IndicatorSeries;
use pennybot::notify::Notifier;
use pennybot::storage::StateStore;
use pennybot::types::{
    BotState, Candle, EngineEvent, OrderFill, PositionState, Side, SymbolRule, TickerStats,
    TradeRecord,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const SYMBOL: &str = "DOGEUSDT";

struct MockGateway {
    candles: Vec<Candle>,
    fail_candles: bool,
    candle_calls: AtomicUsize,
    spot: Decimal,
    rule: SymbolRule,
    asset_balance: Decimal,
    fill_price: Decimal,
    orders: Mutex<Vec<(String, Side, Decimal)>>,
}

impl MockGateway {
    fn new(candles: Vec<Candle>, spot: Decimal) -> Self {
        Self {
            candles,
            fail_candles: false,
            candle_calls: AtomicUsize::new(0),
            spot,
            rule: SymbolRule {
                min_quantity: "0.001".parse().unwrap(),
                step_size: "0.001".parse().unwrap(),
            },
            asset_balance: Decimal::ZERO,
            fill_price: spot,
            orders: Mutex::new(Vec::new()),
        }
    }

    fn orders(&self) -> Vec<(String, Side, Decimal)> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketGateway for MockGateway {
    async fn get_all_tickers(&self) -> Result<Vec<TickerStats>, GatewayError> {
        Ok(Vec::new())
    }

    async fn get_candles(
        &self,
        _symbol: &str,
        _interval: &str,
        _limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_candles {
            return Err(GatewayError::Missing("candles (simulated timeout)"));
        }
        Ok(self.candles.clone())
    }

    async fn get_spot_price(&self, _symbol: &str) -> Result<Decimal, GatewayError> {
        Ok(self.spot)
    }

    async fn get_symbol_rule(&self, _symbol: &str) -> Result<SymbolRule, GatewayError> {
        Ok(self.rule.clone())
    }

    async fn get_asset_balance(&self, _asset: &str) -> Result<Decimal, GatewayError> {
        Ok(self.asset_balance)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderFill, GatewayError> {
        self.orders
            .lock()
            .unwrap()
            .push((symbol.to_string(), side, quantity));
        Ok(OrderFill {
            order_id: "1".to_string(),
            fill_price: self.fill_price,
        })
    }
}

struct FixedForecaster(Decimal);

#[async_trait]
impl Forecaster for FixedForecaster {
    async fn predict(
        &self,
        _candles: &[Candle],
        _indicators: &IndicatorSeries,
    ) -> anyhow::Result<Decimal> {
        Ok(self.0)
    }
}

struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: start + ChronoDuration::hours(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

/// A long steep decline followed by a gentler, still mostly-down tail. The
/// last 14 deltas are small losses with tiny gains, so RSI stays deep under
/// 30, while the decelerating decline curls MACD back up through its
/// lagging signal line.
fn oversold_with_bullish_crossover() -> Vec<f64> {
    let mut closes = Vec::with_capacity(500);
    let mut price = 200.0;
    for _ in 0..480 {
        closes.push(price);
        price -= 0.3;
    }
    for i in 0..20 {
        closes.push(price);
        price += if i % 2 == 0 { -0.04 } else { 0.005 };
    }
    closes
}

/// Mirror image: a long rally that decelerates, leaving RSI overbought
/// while MACD drops below its signal line.
fn overbought_with_bearish_crossover() -> Vec<f64> {
    let mut closes = Vec::with_capacity(500);
    let mut price = 10.0;
    for _ in 0..480 {
        closes.push(price);
        price += 0.3;
    }
    for i in 0..20 {
        closes.push(price);
        price += if i % 2 == 0 { 0.04 } else { -0.005 };
    }
    closes
}

fn fast_config() -> EngineConfig {
    EngineConfig {
        initial_balance: Decimal::new(30, 0),
        update_interval: Duration::from_millis(50),
        candle_interval: "1h".to_string(),
        candle_limit: 500,
        sizing_policy: SizingPolicy::Clamp,
    }
}

async fn wait_until_stopped(handle: &EngineHandle) {
    for _ in 0..200 {
        if !handle.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("engine did not stop in time");
}

fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> (Vec<TradeRecord>, Vec<String>) {
    let mut trades = Vec::new();
    let mut errors = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::Trade(t) => trades.push(t),
            EngineEvent::Error(e) => errors.push(e),
        }
    }
    (trades, errors)
}

#[tokio::test]
async fn oversold_market_triggers_exactly_one_sized_buy() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("bot_state.json");

    // active symbol survives from a previous run
    let mut initial = BotState::new(Decimal::new(30, 0));
    initial.active_symbol = Some(SYMBOL.to_string());
    StateStore::new(&state_path).save(&initial).await.unwrap();

    let spot = Decimal::new(56, 0);
    let gateway = Arc::new(MockGateway::new(
        candles_from_closes(&oversold_with_bullish_crossover()),
        spot,
    ));
    let notifier = Arc::new(RecordingNotifier::new());
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let handle = TradingEngine::start(
        fast_config(),
        gateway.clone(),
        Box::new(FixedForecaster(Decimal::new(60, 0))),
        notifier.clone(),
        StateStore::new(&state_path),
        event_tx,
    )
    .await;

    // several cycles; only the first may trade
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop().await;
    wait_until_stopped(&handle).await;

    // 30 / 56 floored to the 0.001 lot grid
    let expected_qty: Decimal = "0.535".parse().unwrap();
    assert_eq!(
        gateway.orders(),
        vec![(SYMBOL.to_string(), Side::Buy, expected_qty)]
    );

    let state = handle.snapshot();
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].side, Side::Buy);
    assert_eq!(state.history[0].price, spot);
    assert_eq!(state.balance, Decimal::new(30, 0) - expected_qty * spot);
    assert_eq!(
        state.position,
        PositionState::Holding {
            symbol: SYMBOL.to_string(),
            quantity: expected_qty,
            entry_price: spot,
        }
    );

    // the fill was persisted, notified, and surfaced to the observer
    let reloaded = StateStore::new(&state_path).load(Decimal::ONE).await;
    assert_eq!(reloaded, state);
    assert!(notifier
        .messages()
        .iter()
        .any(|m| m.starts_with("BUY") && m.contains(SYMBOL)));
    let (trades, errors) = drain_events(&mut event_rx);
    assert_eq!(trades.len(), 1);
    assert!(errors.is_empty());

    handle.join().await;
}

#[tokio::test]
async fn overbought_market_liquidates_the_held_position() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("bot_state.json");

    let buy_record = TradeRecord {
        timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        symbol: SYMBOL.to_string(),
        side: Side::Buy,
        quantity: "123.456".parse().unwrap(),
        price: "0.5".parse().unwrap(),
    };
    let initial = BotState {
        balance: Decimal::ZERO,
        active_symbol: Some(SYMBOL.to_string()),
        position: PositionState::Holding {
            symbol: SYMBOL.to_string(),
            quantity: "123.456".parse().unwrap(),
            entry_price: "0.5".parse().unwrap(),
        },
        history: vec![buy_record],
        last_update: None,
    };
    StateStore::new(&state_path).save(&initial).await.unwrap();

    let spot = Decimal::new(150, 0);
    let mut mock = MockGateway::new(
        candles_from_closes(&overbought_with_bearish_crossover()),
        spot,
    );
    mock.asset_balance = "123.456".parse().unwrap();
    mock.rule = SymbolRule {
        min_quantity: "0.01".parse().unwrap(),
        step_size: "0.01".parse().unwrap(),
    };
    let gateway = Arc::new(mock);
    let notifier = Arc::new(RecordingNotifier::new());
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let handle = TradingEngine::start(
        fast_config(),
        gateway.clone(),
        Box::new(FixedForecaster(Decimal::new(140, 0))),
        notifier.clone(),
        StateStore::new(&state_path),
        event_tx,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.stop().await;
    wait_until_stopped(&handle).await;

    // the whole exchange-reported holding, floored to the lot grid
    let expected_qty: Decimal = "123.45".parse().unwrap();
    assert_eq!(
        gateway.orders(),
        vec![(SYMBOL.to_string(), Side::Sell, expected_qty)]
    );

    let state = handle.snapshot();
    assert_eq!(state.history.len(), 2);
    assert_eq!(state.history[1].side, Side::Sell);
    assert_eq!(state.balance, expected_qty * spot);
    assert!(state.position.is_flat());

    // one completed round trip, and it won
    let metrics = handle.metrics();
    assert_eq!(metrics.total_trades, 2);
    assert_eq!(metrics.win_rate, 100.0);

    let (trades, errors) = drain_events(&mut event_rx);
    assert_eq!(trades.len(), 1);
    assert!(errors.is_empty());

    handle.join().await;
}

#[tokio::test]
async fn repeated_fetch_failures_leave_state_untouched_and_engine_running() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("bot_state.json");

    let mut initial = BotState::new(Decimal::new(30, 0));
    initial.active_symbol = Some(SYMBOL.to_string());
    StateStore::new(&state_path).save(&initial).await.unwrap();

    let mut mock = MockGateway::new(Vec::new(), Decimal::ONE);
    mock.fail_candles = true;
    let gateway = Arc::new(mock);
    let notifier = Arc::new(RecordingNotifier::new());
    let (event_tx, mut event_rx) = mpsc::channel(100);

    let handle = TradingEngine::start(
        fast_config(),
        gateway.clone(),
        Box::new(FixedForecaster(Decimal::ONE)),
        notifier.clone(),
        StateStore::new(&state_path),
        event_tx,
    )
    .await;

    tokio::time::sleep(Duration::from_millis(300)).await;

    // still alive after repeated failures
    assert!(handle.is_running());
    assert!(gateway.candle_calls.load(Ordering::SeqCst) >= 2);

    let (trades, errors) = drain_events(&mut event_rx);
    assert!(trades.is_empty());
    assert!(errors.len() >= 2);
    assert!(errors[0].contains("historical data"));

    // no orders, no mutation
    assert!(gateway.orders().is_empty());
    assert_eq!(handle.snapshot(), initial);

    handle.stop().await;
    wait_until_stopped(&handle).await;
    handle.join().await;
}
