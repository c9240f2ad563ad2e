use crate::types::{Candle, OrderFill, Side, SymbolRule, TickerStats};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Any of these can surface from a flaky exchange; the engine treats every
/// variant as recoverable.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("exchange request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange response missing {0}")]
    Missing(&'static str),

    #[error("exchange response malformed: {0}")]
    Malformed(String),

    #[error("invalid api credentials: {0}")]
    Credentials(String),
}

#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// 24h snapshots for every symbol on the exchange.
    async fn get_all_tickers(&self) -> Result<Vec<TickerStats>, GatewayError>;

    /// Most recent `limit` candles for `symbol`, ascending by open time.
    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError>;

    async fn get_spot_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    async fn get_symbol_rule(&self, symbol: &str) -> Result<SymbolRule, GatewayError>;

    /// Free balance of `asset`; an asset absent from the account reads as 0.
    async fn get_asset_balance(&self, asset: &str) -> Result<Decimal, GatewayError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderFill, GatewayError>;
}
