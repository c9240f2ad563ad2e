//! RSI, MACD, and MACD-signal columns over a candle window.
//!
//! RSI(14) uses simple 14-period rolling means of close-delta gains and
//! losses. MACD is EMA(close,12) − EMA(close,26) with the non-adjusted EMA
//! (α = 2/(span+1), seeded with the first value); Signal is EMA(MACD,9).
//! Warm-up rows carry `None`; callers must not act on an undefined row.

use crate::types::Candle;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

/// Indicator columns aligned with the candle window that produced them.
#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
}

/// The last row of an enriched window with every column defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionRow {
    pub rsi: f64,
    pub macd: f64,
    pub signal: f64,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.rsi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rsi.is_empty()
    }

    /// `None` while any column is still warming up on the last row.
    pub fn decision_row(&self) -> Option<DecisionRow> {
        let idx = self.len().checked_sub(1)?;
        match (self.rsi[idx], self.macd[idx], self.signal[idx]) {
            (Some(rsi), Some(macd), Some(signal)) => Some(DecisionRow { rsi, macd, signal }),
            _ => None,
        }
    }
}

/// Deterministic, side-effect free. Short input never errors; it just
/// leaves the warm-up region undefined.
pub fn enrich(candles: &[Candle]) -> IndicatorSeries {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let (macd, signal) = macd_lines(&closes);

    IndicatorSeries {
        rsi: rsi(&closes, RSI_PERIOD),
        macd,
        signal,
    }
}

/// Non-adjusted EMA over the full series, seeded with the first value.
fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut current = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(current);

    for &v in &values[1..] {
        current = alpha * v + (1.0 - alpha) * current;
        out.push(current);
    }
    out
}

/// Rolling-mean RSI. Row `i` needs `period` deltas, so the first defined
/// row is index `period`. A windowful of pure gains clamps to 100 instead
/// of dividing by a zero average loss.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    for i in period..n {
        let window = (i - period + 1)..=i;
        let avg_gain: f64 = window.clone().map(|j| gains[j]).sum::<f64>() / period as f64;
        let avg_loss: f64 = window.map(|j| losses[j]).sum::<f64>() / period as f64;

        let value = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };
        out[i] = Some(value);
    }
    out
}

/// MACD line and its signal line. MACD is reported from the slow warm-up
/// onward; Signal needs a further `MACD_SIGNAL − 1` rows on top of that.
fn macd_lines(closes: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = closes.len();
    let ema_fast = ema(closes, MACD_FAST);
    let ema_slow = ema(closes, MACD_SLOW);

    let macd_raw: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(fast, slow)| fast - slow)
        .collect();
    let signal_raw = ema(&macd_raw, MACD_SIGNAL);

    let macd_from = MACD_SLOW - 1;
    let signal_from = MACD_SLOW + MACD_SIGNAL - 2;

    let macd = (0..n)
        .map(|i| (i >= macd_from).then(|| macd_raw[i]))
        .collect();
    let signal = (0..n)
        .map(|i| (i >= signal_from).then(|| signal_raw[i]))
        .collect();
    (macd, signal)
}
