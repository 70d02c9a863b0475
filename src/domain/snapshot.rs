use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One (price, size) pair on a single side of the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        PriceLevel { price, size }
    }
}

/// Normalized top-of-book view emitted by every venue adapter.
///
/// Bids are strictly descending by price, asks strictly ascending,
/// each side truncated to the projection depth. With both sides
/// non-empty the book is never crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Feed timestamp when the wire carries one, else local clock.
    pub ts_ms: i64,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }

    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some(ask - bid)
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn snapshot() -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: vec![
                PriceLevel::new(dec!(50000), dec!(1.5)),
                PriceLevel::new(dec!(49990), dec!(2.0)),
            ],
            asks: vec![
                PriceLevel::new(dec!(50010), dec!(0.5)),
                PriceLevel::new(dec!(50020), dec!(3.0)),
            ],
            ts_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_top_of_book_accessors() {
        let snap = snapshot();
        assert_eq!(snap.best_bid().unwrap().price, dec!(50000));
        assert_eq!(snap.best_ask().unwrap().price, dec!(50010));
        assert_eq!(snap.mid_price().unwrap(), dec!(50005));
        assert_eq!(snap.spread().unwrap(), dec!(10));
    }

    #[test]
    fn test_one_sided_book_has_no_mid() {
        let mut snap = snapshot();
        snap.asks.clear();
        assert!(snap.mid_price().is_none());
        assert!(snap.spread().is_none());
        assert!(!snap.is_empty());
    }
}
