//! Multi-currency aggregates.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use rust_decimal::Decimal;

use super::currency::Currency;
use super::money::Money;

/// An unordered collection holding at most one amount per currency.
///
/// Crediting a [`Money`] merges it into the matching entry or inserts a new
/// one, so cross-currency aggregation is always well-defined. Zero entries
/// are dropped, which makes equality canonical: an account that held and
/// then spent 1 BTC compares equal to one that never held any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiMoney {
    amounts: BTreeMap<Currency, Decimal>,
}

impl MultiMoney {
    pub fn new() -> Self {
        Self::default()
    }

    /// The held amount for a currency, zero when absent.
    pub fn get(&self, currency: Currency) -> Money {
        let amount = self.amounts.get(&currency).copied().unwrap_or(Decimal::ZERO);
        Money::new(amount, currency)
    }

    /// Merge an amount into the aggregate.
    pub fn credit(&mut self, money: Money) {
        let amount = self.get(money.currency()).amount() + money.amount();
        self.set(money.currency(), amount);
    }

    /// Remove an amount from the aggregate. May go negative on bad venue
    /// data; callers that care check the sign.
    pub fn debit(&mut self, money: Money) {
        let amount = self.get(money.currency()).amount() - money.amount();
        self.set(money.currency(), amount);
    }

    pub fn iter(&self) -> impl Iterator<Item = Money> + '_ {
        self.amounts
            .iter()
            .map(|(currency, amount)| Money::new(*amount, *currency))
    }

    pub fn is_zero(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.amounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    fn set(&mut self, currency: Currency, amount: Decimal) {
        if amount.is_zero() {
            self.amounts.remove(&currency);
        } else {
            self.amounts.insert(currency, amount);
        }
    }
}

impl AddAssign<Money> for MultiMoney {
    fn add_assign(&mut self, money: Money) {
        self.credit(money);
    }
}

impl SubAssign<Money> for MultiMoney {
    fn sub_assign(&mut self, money: Money) {
        self.debit(money);
    }
}

impl Add for MultiMoney {
    type Output = MultiMoney;

    fn add(mut self, other: MultiMoney) -> MultiMoney {
        for money in other.iter() {
            self.credit(money);
        }
        self
    }
}

impl Sub for MultiMoney {
    type Output = MultiMoney;

    fn sub(mut self, other: MultiMoney) -> MultiMoney {
        for money in other.iter() {
            self.debit(money);
        }
        self
    }
}

impl FromIterator<Money> for MultiMoney {
    fn from_iter<I: IntoIterator<Item = Money>>(iter: I) -> Self {
        let mut total = MultiMoney::new();
        for money in iter {
            total.credit(money);
        }
        total
    }
}

impl fmt::Display for MultiMoney {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for money in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}", money)?;
            first = false;
        }
        if first {
            f.write_str("0")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_credit_merges_per_currency() {
        let mut balance = MultiMoney::new();
        balance += Money::new(dec!(1.0), Currency::Btc);
        balance += Money::new(dec!(0.5), Currency::Btc);
        balance += Money::new(dec!(100), Currency::Usd);

        assert_eq!(balance.len(), 2);
        assert_eq!(balance.get(Currency::Btc).amount(), dec!(1.5));
        assert_eq!(balance.get(Currency::Usd).amount(), dec!(100));
        assert_eq!(balance.get(Currency::Eur).amount(), dec!(0));
    }

    #[test]
    fn test_aggregate_add_sub() {
        let total: MultiMoney = [
            Money::new(dec!(2), Currency::Btc),
            Money::new(dec!(500), Currency::Usd),
        ]
        .into_iter()
        .collect();
        let tied_up: MultiMoney = [
            Money::new(dec!(0.5), Currency::Btc),
            Money::new(dec!(100), Currency::Usd),
        ]
        .into_iter()
        .collect();

        let available = total.clone() - tied_up.clone();
        assert_eq!(available.get(Currency::Btc).amount(), dec!(1.5));
        assert_eq!(available.get(Currency::Usd).amount(), dec!(400));

        assert_eq!(available + tied_up, total);
    }

    #[test]
    fn test_zero_entries_are_dropped() {
        let mut balance = MultiMoney::new();
        balance += Money::new(dec!(1), Currency::Btc);
        balance -= Money::new(dec!(1), Currency::Btc);

        assert!(balance.is_zero());
        assert_eq!(balance, MultiMoney::new());
    }
}
