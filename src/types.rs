// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The bot only trades pairs quoted in USDT.
pub const QUOTE_ASSET: &str = "USDT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One OHLCV interval. Prices and volume stay in `f64` for indicator and
/// forecast math; money that reaches the exchange is `Decimal`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 24h ticker snapshot as the exchange reports it.
#[derive(Debug, Clone)]
pub struct TickerStats {
    pub symbol: String,
    pub last_price: Decimal,
    pub volume: Decimal,
}

/// Candidate coin produced by a market scan. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ViableCoin {
    pub symbol: String,
    pub price: Decimal,
    pub quote_volume: Decimal,
}

/// Exchange lot-size constraints for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRule {
    pub min_quantity: Decimal,
    pub step_size: Decimal,
}

/// Acknowledged market order.
#[derive(Debug, Clone)]
pub struct OrderFill {
    pub order_id: String,
    pub fill_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Explicit position tag. `Holding` exists iff the last fill for the symbol
/// was a BUY with no matching SELL yet; at most one open position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PositionState {
    Flat,
    Holding {
        symbol: String,
        quantity: Decimal,
        entry_price: Decimal,
    },
}

impl Default for PositionState {
    fn default() -> Self {
        PositionState::Flat
    }
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }
}

/// The bot's whole durable state. Owned by the engine task; everyone else
/// sees cloned snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct BotState {
    pub balance: Decimal,
    pub active_symbol: Option<String>,
    pub position: PositionState,
    pub history: Vec<TradeRecord>,
    pub last_update: Option<DateTime<Utc>>,
}

impl BotState {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            active_symbol: None,
            position: PositionState::Flat,
            history: Vec::new(),
            last_update: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_profit: Decimal,
    pub win_rate: f64,
    pub total_trades: usize,
    pub current_balance: Decimal,
}

/// Engine-to-observer events. Delivery is best-effort; the loop never waits
/// on a slow or absent observer.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Trade(TradeRecord),
    Error(String),
}

/// Snapshot timestamps are stored as `YYYY-MM-DD HH:MM:SS` (UTC, second
/// precision).
pub mod timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)?;
        Ok(naive.and_utc())
    }
}

/// Same format for optional timestamps (`last_update` before the first save).
pub mod opt_timestamp_format {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::timestamp_format::FORMAT;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => serializer.serialize_str(&d.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => {
                let naive =
                    NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom)?;
                Ok(Some(naive.and_utc()))
            }
        }
    }
}
