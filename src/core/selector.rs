//! Scan for cheap, heavily traded USDT pairs.

use crate::connectors::traits::MarketGateway;
use crate::notify::Notifier;
use crate::types::{TickerStats, ViableCoin, QUOTE_ASSET};
use rust_decimal::Decimal;
use tracing::error;

/// USDT pairs priced strictly below `max_price`, ranked by quote-denominated
/// volume, top `top_n`. The sort is stable so ties keep gateway order.
pub fn filter_viable(
    tickers: Vec<TickerStats>,
    max_price: Decimal,
    top_n: usize,
) -> Vec<ViableCoin> {
    let mut coins: Vec<ViableCoin> = tickers
        .into_iter()
        .filter(|t| {
            t.symbol.ends_with(QUOTE_ASSET)
                && t.last_price > Decimal::ZERO
                && t.last_price < max_price
        })
        .map(|t| ViableCoin {
            quote_volume: t.volume * t.last_price,
            symbol: t.symbol,
            price: t.last_price,
        })
        .collect();

    coins.sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume));
    coins.truncate(top_n);
    coins
}

/// Full scan through the gateway. Soft-fails: a gateway error is reported
/// and an empty list returned, never an Err.
pub async fn list_viable_coins(
    gateway: &dyn MarketGateway,
    notifier: &dyn Notifier,
    max_price: Decimal,
    top_n: usize,
) -> Vec<ViableCoin> {
    match gateway.get_all_tickers().await {
        Ok(tickers) => filter_viable(tickers, max_price, top_n),
        Err(e) => {
            let message = format!("Error getting viable coins: {e}");
            error!("{message}");
            notifier.notify(&format!("❌ Error: {message}")).await;
            Vec::new()
        }
    }
}
