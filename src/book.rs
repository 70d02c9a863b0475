//! Per-session reconciliation buffer.
//!
//! Holds the mutable price→size maps a venue feed is reconciled into,
//! and projects them into the normalized snapshot shape after every
//! applied message.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::domain::{OrderBookSnapshot, PriceLevel};

/// Levels kept per side after projection.
pub const MAX_DEPTH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}

/// Side-tagged price→size buffer.
///
/// Full-snapshot feeds call [`BookBuffer::replace`] on every tick;
/// delta feeds call [`BookBuffer::apply`] per level, with size zero
/// meaning removal. Inserting a level prunes any opposite-side levels
/// it crosses, so a projection never yields best bid ≥ best ask.
#[derive(Debug, Default)]
pub struct BookBuffer {
    bids: BTreeMap<Decimal, Decimal>,
    asks: BTreeMap<Decimal, Decimal>,
}

impl BookBuffer {
    pub fn new() -> Self {
        BookBuffer::default()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Reset to a fresh full snapshot. The result is independent of
    /// whatever was buffered before.
    pub fn replace(&mut self, bids: &[(Decimal, Decimal)], asks: &[(Decimal, Decimal)]) {
        self.clear();
        for &(price, size) in bids {
            self.apply(Side::Bid, price, size);
        }
        for &(price, size) in asks {
            self.apply(Side::Ask, price, size);
        }
    }

    /// Insert, update, or (at size ≤ 0) remove one level.
    pub fn apply(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Bid => {
                if size <= Decimal::ZERO {
                    self.bids.remove(&price);
                } else {
                    self.bids.insert(price, size);
                    // Drop asks at or below the new bid.
                    let mut above = self.asks.split_off(&price);
                    above.remove(&price);
                    self.asks = above;
                }
            }
            Side::Ask => {
                if size <= Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                    // Drop bids at or above the new ask.
                    self.bids.split_off(&price);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Project into bids-descending / asks-ascending, truncated to
    /// [`MAX_DEPTH`] per side.
    pub fn project(&self, ts_ms: i64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            bids: self
                .bids
                .iter()
                .rev()
                .take(MAX_DEPTH)
                .map(|(p, s)| PriceLevel::new(*p, *s))
                .collect(),
            asks: self
                .asks
                .iter()
                .take(MAX_DEPTH)
                .map(|(p, s)| PriceLevel::new(*p, *s))
                .collect(),
            ts_ms,
        }
    }
}

/// Classify an untagged price→size buffer into bids and asks by
/// splitting around the median buffered price (entries at or below
/// the median become bids).
///
/// Last-resort fallback for feeds that do not tag levels by side.
/// Unreliable for thin or one-sided books: with few levels the median
/// lands inside one side and misclassifies the rest. Feeds that tag
/// bids/asks explicitly must use that separation directly; none of
/// the built-in venue feeds route through this.
pub fn split_untagged_levels(levels: &BTreeMap<Decimal, Decimal>) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
    let prices: Vec<Decimal> = levels.keys().copied().collect();
    let Some(median) = prices.get(prices.len() / 2) else {
        return (Vec::new(), Vec::new());
    };

    let mut bids: Vec<PriceLevel> = Vec::new();
    let mut asks: Vec<PriceLevel> = Vec::new();
    for (&price, &size) in levels {
        if size <= Decimal::ZERO {
            continue;
        }
        if price <= *median {
            bids.push(PriceLevel::new(price, size));
        } else {
            asks.push(PriceLevel::new(price, size));
        }
    }

    bids.reverse();
    bids.truncate(MAX_DEPTH);
    asks.truncate(MAX_DEPTH);
    (bids, asks)
}
