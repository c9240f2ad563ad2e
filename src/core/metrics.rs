//! Performance figures derived from the trade history. Consumers rely on
//! the history being chronological with BUY/SELL alternation per symbol.

use crate::types::{BotState, Metrics, Side, TradeRecord};
use rust_decimal::Decimal;

/// Realized profit: every SELL is paired with the trade immediately before
/// it, `(sell − buy) × quantity`.
pub fn total_profit(history: &[TradeRecord]) -> Decimal {
    let mut total = Decimal::ZERO;
    for i in 1..history.len() {
        if history[i].side == Side::Sell {
            total += (history[i].price - history[i - 1].price) * history[i].quantity;
        }
    }
    total
}

/// Share of completed BUY/SELL round trips that closed higher than they
/// opened, in percent. No completed pair yields 0, never a division error.
pub fn win_rate(history: &[TradeRecord]) -> f64 {
    let mut pairs = 0usize;
    let mut wins = 0usize;

    for chunk in history.chunks_exact(2) {
        if chunk[0].side == Side::Buy && chunk[1].side == Side::Sell {
            pairs += 1;
            if chunk[1].price > chunk[0].price {
                wins += 1;
            }
        }
    }

    if pairs == 0 {
        0.0
    } else {
        wins as f64 / pairs as f64 * 100.0
    }
}

pub fn compute(state: &BotState) -> Metrics {
    Metrics {
        total_profit: total_profit(&state.history),
        win_rate: win_rate(&state.history),
        total_trades: state.history.len(),
        current_balance: state.balance,
    }
}
