//! Price forecasting behind a narrow contract.
//!
//! The engine only ever asks for one number: the expected price one interval
//! ahead, given the enriched candle window. Heavier models plug in behind
//! the same trait; the shipped forecaster is a small least-squares stand-in.

use crate::indicators::IndicatorSeries;
use crate::types::Candle;
use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

#[async_trait]
pub trait Forecaster: Send + Sync {
    /// Expected price one interval past the end of the window.
    async fn predict(&self, candles: &[Candle], indicators: &IndicatorSeries) -> Result<Decimal>;
}

/// Ordinary least-squares trend over the last `lookback` closes,
/// extrapolated one step.
pub struct LinearForecaster {
    lookback: usize,
}

impl LinearForecaster {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(2),
        }
    }

    fn fit_next(&self, closes: &[f64]) -> Result<f64> {
        let window = if closes.len() > self.lookback {
            &closes[closes.len() - self.lookback..]
        } else {
            closes
        };
        ensure!(window.len() >= 2, "not enough history to fit a trend");

        let n = window.len() as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = window.iter().sum::<f64>() / n;

        let mut cov = 0.0;
        let mut var = 0.0;
        for (i, &y) in window.iter().enumerate() {
            let dx = i as f64 - mean_x;
            cov += dx * (y - mean_y);
            var += dx * dx;
        }

        let slope = cov / var;
        let intercept = mean_y - slope * mean_x;
        Ok(slope * n + intercept)
    }
}

#[async_trait]
impl Forecaster for LinearForecaster {
    async fn predict(&self, candles: &[Candle], _indicators: &IndicatorSeries) -> Result<Decimal> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let predicted = self.fit_next(&closes)?;

        Decimal::from_f64(predicted)
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| anyhow!("forecast produced an unusable price: {predicted}"))
    }
}
