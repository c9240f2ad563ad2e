// src/connectors/binance.rs
use crate::connectors::traits::{GatewayError, MarketGateway};
use crate::types::{Candle, OrderFill, Side, SymbolRule, TickerStats};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Exchange calls are bounded; an unresponsive endpoint becomes a failed
/// cycle instead of a wedged loop.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct BinanceClient {
    api_key: String,
    secret_key: String,
    http_client: Client,
    base_rest_url: String,
}

impl BinanceClient {
    pub fn new(api_key: String, secret_key: String) -> Self {
        Self {
            api_key,
            secret_key,
            http_client: Client::new(),
            base_rest_url: "https://api.binance.com".to_string(),
        }
    }

    /// Connectivity check against the public ping endpoint.
    pub async fn ping(&self) -> Result<(), GatewayError> {
        let url = format!("{}/api/v3/ping", self.base_rest_url);
        self.http_client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn sign_and_build_query(&self, params: Vec<(&str, String)>) -> Result<String, GatewayError> {
        let mut params = params;
        let timestamp = Utc::now().timestamp_millis().to_string();
        params.push(("timestamp", timestamp));

        let query_string = serde_urlencoded::to_string(&params)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| GatewayError::Credentials(e.to_string()))?;
        mac.update(query_string.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query_string, signature))
    }

    async fn send_signed_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<T, GatewayError> {
        let full_query = self.sign_and_build_query(params)?;
        let url = format!("{}{}?{}", self.base_rest_url, endpoint, full_query);

        let response = self
            .http_client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }

    async fn send_public_request<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<T, GatewayError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_rest_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_rest_url, endpoint, query)
        };

        let response = self
            .http_client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

/// One kline row as Binance sends it: open time, OHLCV as strings, close
/// time, quote volume, trade count, taker volumes, and an ignored field.
type RawKline = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

fn parse_price(field: &'static str, raw: &str) -> Result<f64, GatewayError> {
    raw.parse::<f64>()
        .map_err(|_| GatewayError::Malformed(format!("{field} is not numeric: {raw:?}")))
}

fn candle_from_kline(row: RawKline) -> Result<Candle, GatewayError> {
    let timestamp = Utc
        .timestamp_millis_opt(row.0)
        .single()
        .ok_or_else(|| GatewayError::Malformed(format!("bad kline open time: {}", row.0)))?;

    Ok(Candle {
        timestamp,
        open: parse_price("open", &row.1)?,
        high: parse_price("high", &row.2)?,
        low: parse_price("low", &row.3)?,
        close: parse_price("close", &row.4)?,
        volume: parse_price("volume", &row.5)?,
    })
}

#[async_trait]
impl MarketGateway for BinanceClient {
    async fn get_all_tickers(&self) -> Result<Vec<TickerStats>, GatewayError> {
        #[derive(Deserialize)]
        struct Ticker24h {
            symbol: String,
            #[serde(rename = "lastPrice")]
            last_price: String,
            volume: String,
        }

        let raw: Vec<Ticker24h> = self.send_public_request("/api/v3/ticker/24hr", "").await?;

        // Delisted pairs occasionally report junk numbers; a bad row is
        // dropped rather than failing the whole scan.
        let mut tickers = Vec::with_capacity(raw.len());
        for t in raw {
            match (t.last_price.parse::<Decimal>(), t.volume.parse::<Decimal>()) {
                (Ok(last_price), Ok(volume)) => tickers.push(TickerStats {
                    symbol: t.symbol,
                    last_price,
                    volume,
                }),
                _ => debug!("skipping unparsable ticker row for {}", t.symbol),
            }
        }
        Ok(tickers)
    }

    async fn get_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        let query = format!("symbol={symbol}&interval={interval}&limit={limit}");
        let rows: Vec<RawKline> = self.send_public_request("/api/v3/klines", &query).await?;

        rows.into_iter().map(candle_from_kline).collect()
    }

    async fn get_spot_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        #[derive(Deserialize)]
        struct PriceTicker {
            price: Decimal,
        }

        let query = format!("symbol={symbol}");
        let resp: PriceTicker = self
            .send_public_request("/api/v3/ticker/price", &query)
            .await?;
        Ok(resp.price)
    }

    async fn get_symbol_rule(&self, symbol: &str) -> Result<SymbolRule, GatewayError> {
        #[derive(Deserialize)]
        struct RawFilter {
            #[serde(rename = "filterType")]
            filter_type: String,
            #[serde(rename = "minQty")]
            min_qty: Option<Decimal>,
            #[serde(rename = "stepSize")]
            step_size: Option<Decimal>,
        }
        #[derive(Deserialize)]
        struct SymbolInfo {
            filters: Vec<RawFilter>,
        }
        #[derive(Deserialize)]
        struct ExchangeInfo {
            symbols: Vec<SymbolInfo>,
        }

        let query = format!("symbol={symbol}");
        let info: ExchangeInfo = self
            .send_public_request("/api/v3/exchangeInfo", &query)
            .await?;

        let lot_size = info
            .symbols
            .into_iter()
            .flat_map(|s| s.filters)
            .find(|f| f.filter_type == "LOT_SIZE")
            .ok_or(GatewayError::Missing("LOT_SIZE filter"))?;

        match (lot_size.min_qty, lot_size.step_size) {
            (Some(min_quantity), Some(step_size)) => Ok(SymbolRule {
                min_quantity,
                step_size,
            }),
            _ => Err(GatewayError::Missing("LOT_SIZE bounds")),
        }
    }

    async fn get_asset_balance(&self, asset: &str) -> Result<Decimal, GatewayError> {
        #[derive(Deserialize)]
        struct Balance {
            asset: String,
            free: Decimal,
        }
        #[derive(Deserialize)]
        struct AccountInfo {
            balances: Vec<Balance>,
        }

        let resp: AccountInfo = self
            .send_signed_request(Method::GET, "/api/v3/account", vec![])
            .await?;

        Ok(resp
            .balances
            .into_iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderFill, GatewayError> {
        #[derive(Deserialize)]
        struct Fill {
            price: Decimal,
        }
        #[derive(Deserialize)]
        struct BinanceOrderResponse {
            #[serde(rename = "orderId")]
            order_id: u64,
            #[serde(default)]
            fills: Vec<Fill>,
        }

        let client_order_id = Uuid::new_v4().simple().to_string();
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("newClientOrderId", client_order_id),
            // FULL responses carry the fills we price the trade from
            ("newOrderRespType", "FULL".to_string()),
        ];

        info!("🚀 Sending Order: {} {} {}", side, quantity, symbol);

        let resp: BinanceOrderResponse = self
            .send_signed_request(Method::POST, "/api/v3/order", params)
            .await?;

        let fill_price = resp
            .fills
            .first()
            .map(|f| f.price)
            .ok_or(GatewayError::Missing("order fills"))?;

        Ok(OrderFill {
            order_id: resp.order_id.to_string(),
            fill_price,
        })
    }
}
