// src/utils/precision.rs
use crate::config::SizingPolicy;
use crate::types::SymbolRule;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("sized quantity {quantity} is below the exchange minimum {min}")]
    BelowMinimum { quantity: Decimal, min: Decimal },
}

/// Rounds a quantity DOWN to the nearest multiple of step_size.
/// Example: amount=10.999, step=1.0 -> 10.0
pub fn normalize_quantity(amount: Decimal, step_size: Decimal) -> Decimal {
    if step_size.is_zero() {
        return amount;
    }
    (amount / step_size).floor() * step_size
}

/// Sizes a market order from the available quote budget at the given price.
///
/// The result is floored to the lot grid. When it lands below the exchange
/// minimum, `policy` decides: `Clamp` submits the minimum lot anyway — which
/// can spend more quote than `available` — while `Reject` abandons the trade.
pub fn size_order(
    available: Decimal,
    price: Decimal,
    rule: &SymbolRule,
    policy: SizingPolicy,
) -> Result<Decimal, SizingError> {
    if price <= Decimal::ZERO {
        return Err(SizingError::NonPositivePrice(price));
    }

    let raw_qty = available / price;
    let quantity = normalize_quantity(raw_qty, rule.step_size);

    if quantity < rule.min_quantity {
        match policy {
            SizingPolicy::Clamp => {
                warn!(
                    "minimum lot {} exceeds the budget-sized quantity {}; clamping up may overspend the {} budget",
                    rule.min_quantity, quantity, available
                );
                Ok(rule.min_quantity)
            }
            SizingPolicy::Reject => Err(SizingError::BelowMinimum {
                quantity,
                min: rule.min_quantity,
            }),
        }
    } else {
        Ok(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(min: &str, step: &str) -> SymbolRule {
        SymbolRule {
            min_quantity: min.parse().unwrap(),
            step_size: step.parse().unwrap(),
        }
    }

    #[test]
    fn normalize_floors_to_step() {
        let qty = normalize_quantity("10.999".parse().unwrap(), Decimal::ONE);
        assert_eq!(qty, Decimal::new(10, 0));

        let qty = normalize_quantity("0.5428".parse().unwrap(), "0.001".parse().unwrap());
        assert_eq!(qty, "0.542".parse::<Decimal>().unwrap());
    }

    #[test]
    fn normalize_with_zero_step_is_identity() {
        let amount: Decimal = "3.1415".parse().unwrap();
        assert_eq!(normalize_quantity(amount, Decimal::ZERO), amount);
    }

    #[test]
    fn sized_quantity_is_a_step_multiple_at_or_above_minimum() {
        let r = rule("1", "0.1");
        let qty = size_order(
            Decimal::new(30, 0),
            Decimal::new(7, 0),
            &r,
            SizingPolicy::Clamp,
        )
        .unwrap();

        // 30 / 7 = 4.2857... -> 4.2
        assert_eq!(qty, "4.2".parse::<Decimal>().unwrap());
        assert!(qty >= r.min_quantity);
        assert!((qty / r.step_size).fract().is_zero());
    }

    #[test]
    fn clamp_returns_minimum_when_budget_is_too_small() {
        let r = rule("10", "1");
        let qty = size_order(
            Decimal::new(5, 0),
            Decimal::new(2, 0),
            &r,
            SizingPolicy::Clamp,
        )
        .unwrap();
        assert_eq!(qty, Decimal::new(10, 0));
    }

    #[test]
    fn reject_refuses_a_sub_minimum_order() {
        let r = rule("10", "1");
        let err = size_order(
            Decimal::new(5, 0),
            Decimal::new(2, 0),
            &r,
            SizingPolicy::Reject,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SizingError::BelowMinimum {
                quantity: Decimal::new(2, 0),
                min: Decimal::new(10, 0),
            }
        );
    }

    #[test]
    fn zero_price_is_a_sizing_error() {
        let r = rule("1", "1");
        let err = size_order(Decimal::new(30, 0), Decimal::ZERO, &r, SizingPolicy::Clamp)
            .unwrap_err();
        assert_eq!(err, SizingError::NonPositivePrice(Decimal::ZERO));
    }
}
