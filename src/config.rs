// src/config.rs

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

/// What to do when the budget-sized quantity lands below the exchange
/// minimum. `Clamp` submits the minimum lot anyway, which can spend more
/// quote than the available balance.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SizingPolicy {
    #[default]
    Clamp,
    Reject,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
    #[serde(default = "default_max_coin_price")]
    pub max_coin_price: Decimal,
    #[serde(default = "default_top_candidates")]
    pub top_candidates: usize,
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,
    /// Pin the traded symbol instead of scanning for one at startup.
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub sizing_policy: SizingPolicy,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            max_coin_price: default_max_coin_price(),
            top_candidates: default_top_candidates(),
            update_interval_secs: default_update_interval_secs(),
            candle_interval: default_candle_interval(),
            candle_limit: default_candle_limit(),
            symbol: None,
            sizing_policy: SizingPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("Settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        config.try_deserialize()
    }
}

fn default_initial_balance() -> Decimal {
    Decimal::new(30, 0)
}

fn default_max_coin_price() -> Decimal {
    Decimal::ONE
}

fn default_top_candidates() -> usize {
    10
}

fn default_update_interval_secs() -> u64 {
    60
}

fn default_candle_interval() -> String {
    "1h".to_string()
}

fn default_candle_limit() -> u32 {
    500
}

fn default_lookback() -> usize {
    60
}

fn default_state_file() -> String {
    "bot_state.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let trading = TradingConfig::default();
        assert_eq!(trading.initial_balance, Decimal::new(30, 0));
        assert_eq!(trading.max_coin_price, Decimal::ONE);
        assert_eq!(trading.top_candidates, 10);
        assert_eq!(trading.update_interval_secs, 60);
        assert_eq!(trading.candle_interval, "1h");
        assert_eq!(trading.candle_limit, 500);
        assert_eq!(trading.sizing_policy, SizingPolicy::Clamp);
        assert_eq!(ForecastConfig::default().lookback, 60);
    }

    #[test]
    fn sizing_policy_parses_lowercase() {
        let policy: SizingPolicy = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(policy, SizingPolicy::Reject);
    }
}
