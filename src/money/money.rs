//! Currency-tagged decimal amounts.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Mul;

use rust_decimal::Decimal;

use super::currency::Currency;

/// An exact decimal amount in a single currency.
///
/// Arithmetic between `Money` values is only defined within one currency;
/// the checked operations return `None` on a currency mismatch instead of
/// producing a nonsense sum. Multiplying by a dimensionless `Decimal` is
/// always valid and is how an order's size is converted into its notional
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Add another amount of the same currency. `None` on mismatch.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount + other.amount, self.currency))
    }

    /// Subtract another amount of the same currency. `None` on mismatch.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        Some(Money::new(self.amount - other.amount, self.currency))
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, rate: Decimal) -> Money {
        Money::new(self.amount * rate, self.currency)
    }
}

impl PartialOrd for Money {
    /// Ordering is only defined within one currency; cross-currency
    /// comparisons yield `None`.
    fn partial_cmp(&self, other: &Money) -> Option<Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_same_currency_arithmetic() {
        let a = Money::new(dec!(1.5), Currency::Btc);
        let b = Money::new(dec!(0.5), Currency::Btc);

        assert_eq!(a.checked_add(b), Some(Money::new(dec!(2.0), Currency::Btc)));
        assert_eq!(a.checked_sub(b), Some(Money::new(dec!(1.0), Currency::Btc)));
    }

    #[test]
    fn test_cross_currency_arithmetic_is_undefined() {
        let btc = Money::new(dec!(1), Currency::Btc);
        let usd = Money::new(dec!(1), Currency::Usd);

        assert_eq!(btc.checked_add(usd), None);
        assert_eq!(btc.checked_sub(usd), None);
    }

    #[test]
    fn test_notional_via_scalar_multiply() {
        // 0.75 BTC at a rate of 203.50 quote units each
        let size = Money::new(dec!(203.50), Currency::Usd) * dec!(0.75);
        assert_eq!(size, Money::new(dec!(152.625), Currency::Usd));
    }

    #[test]
    fn test_comparison_within_currency_only() {
        let a = Money::new(dec!(1), Currency::Btc);
        let b = Money::new(dec!(2), Currency::Btc);
        let c = Money::new(dec!(2), Currency::Usd);

        assert!(a < b);
        assert_eq!(a.partial_cmp(&c), None);
    }
}
