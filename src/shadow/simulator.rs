//! Queue-position-aware fill simulator for resting virtual limit orders.

use std::collections::{BTreeMap, HashMap};

use crate::models::Side;

/// Fixed-point price key so price levels can live in a `BTreeMap` without
/// float `Eq`/`Ord` pitfalls, mirroring the teacher's integer `PriceTicks`
/// keying (`backtest_v2::matching::PriceTicks`) without requiring a
/// configured tick size.
type PriceKey = i64;

const PRICE_SCALE: f64 = 1_000_000.0;

fn price_key(price: f64) -> PriceKey {
    (price * PRICE_SCALE).round() as PriceKey
}

#[derive(Debug, Clone)]
pub struct ShadowOrder {
    pub order_id: String,
    pub side: Side,
    pub price: f64,
    pub qty: f64,
    pub joined_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadowFill {
    pub order_id: String,
    pub avg_px: f64,
    /// Signed: positive for a filled BUY, negative for a filled SELL,
    /// matching `Fill::qty`'s convention elsewhere on the bus.
    pub qty: f64,
}

/// Tracks resting virtual limit orders and fills them once on-tape
/// executions at their price exceed the size that was ahead of them in
/// the queue when they arrived.
pub struct QueueAwareSimulator {
    latency_ms: i64,
    orders: HashMap<String, ShadowOrder>,
    queue_ahead: [BTreeMap<PriceKey, f64>; 2],
    exec_since: [BTreeMap<PriceKey, f64>; 2],
    latest_bids: Vec<(f64, f64)>,
    latest_asks: Vec<(f64, f64)>,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

impl QueueAwareSimulator {
    pub fn new(latency_ms: i64) -> Self {
        Self {
            latency_ms,
            orders: HashMap::new(),
            queue_ahead: [BTreeMap::new(), BTreeMap::new()],
            exec_since: [BTreeMap::new(), BTreeMap::new()],
            latest_bids: Vec::new(),
            latest_asks: Vec::new(),
        }
    }

    pub fn on_book(&mut self, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) {
        self.latest_bids = bids;
        self.latest_asks = asks;
    }

    /// A trade print hits the resting side opposite the aggressor.
    pub fn on_trade(&mut self, price: f64, size: f64, aggressor: Side) {
        let side_hit = aggressor.opposite();
        let book = &mut self.exec_since[side_index(side_hit)];
        *book.entry(price_key(price)).or_insert(0.0) += size;
    }

    pub fn place_limit(&mut self, order: ShadowOrder) {
        let queued_ahead = self.displayed_size_at(order.side, order.price);
        let entry = self.queue_ahead[side_index(order.side)]
            .entry(price_key(order.price))
            .or_insert(0.0);
        *entry += queued_ahead;
        self.orders.insert(order.order_id.clone(), order);
    }

    pub fn cancel(&mut self, order_id: &str) {
        self.orders.remove(order_id);
    }

    /// Size displayed at `price` on `side`'s book in the most recent
    /// snapshot. Zero if the price isn't currently displayed.
    pub fn displayed_size_at(&self, side: Side, price: f64) -> f64 {
        let book = match side {
            Side::Buy => &self.latest_bids,
            Side::Sell => &self.latest_asks,
        };
        book.iter()
            .find(|(px, _)| (px - price).abs() < 1e-9)
            .map(|(_, sz)| *sz)
            .unwrap_or(0.0)
    }

    /// Fills every resting order past its cold-start latency gate whose
    /// price has seen more executions than were queued ahead of it.
    pub fn try_fills(&mut self, now_ms: i64) -> Vec<ShadowFill> {
        let mut fills = Vec::new();
        let ready: Vec<String> = self
            .orders
            .iter()
            .filter(|(_, o)| now_ms - o.joined_at_ms >= self.latency_ms)
            .map(|(id, _)| id.clone())
            .collect();

        for order_id in ready {
            let order = match self.orders.get(&order_id) {
                Some(o) => o.clone(),
                None => continue,
            };
            let key = price_key(order.price);
            let execd = self.exec_since[side_index(order.side)]
                .get(&key)
                .copied()
                .unwrap_or(0.0);
            let ahead = self.queue_ahead[side_index(order.side)]
                .get(&key)
                .copied()
                .unwrap_or(0.0);
            let available = execd - ahead;
            if available <= 0.0 {
                continue;
            }
            let qty = order.side.signed(available.min(order.qty));
            fills.push(ShadowFill {
                order_id: order_id.clone(),
                avg_px: order.price,
                qty,
            });
            self.orders.remove(&order_id);
        }
        fills
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displayed_size_matches_the_latest_book() {
        let mut sim = QueueAwareSimulator::new(60);
        sim.on_book(vec![(100.0, 7.0)], vec![(101.0, 3.0)]);
        assert_eq!(sim.displayed_size_at(Side::Buy, 100.0), 7.0);
        assert_eq!(sim.displayed_size_at(Side::Sell, 101.0), 3.0);
        assert_eq!(sim.displayed_size_at(Side::Buy, 99.0), 0.0);
    }

    #[test]
    fn order_does_not_fill_before_latency_gate() {
        let mut sim = QueueAwareSimulator::new(60);
        sim.on_book(vec![(100.0, 0.0)], vec![]);
        sim.place_limit(ShadowOrder {
            order_id: "o1".to_string(),
            side: Side::Buy,
            price: 100.0,
            qty: 5.0,
            joined_at_ms: 1_000,
        });
        sim.on_trade(100.0, 10.0, Side::Sell);
        assert!(sim.try_fills(1_010).is_empty());
    }

    #[test]
    fn order_fills_once_queue_ahead_is_consumed() {
        let mut sim = QueueAwareSimulator::new(60);
        // 4 units already displayed ahead of us at 100.0 on the bid.
        sim.on_book(vec![(100.0, 4.0)], vec![]);
        sim.place_limit(ShadowOrder {
            order_id: "o1".to_string(),
            side: Side::Buy,
            price: 100.0,
            qty: 5.0,
            joined_at_ms: 1_000,
        });
        // Only 3 executed so far: still behind the queue.
        sim.on_trade(100.0, 3.0, Side::Sell);
        assert!(sim.try_fills(1_100).is_empty());
        // 3 more executed (6 total) clears the 4 ahead of us by 2.
        sim.on_trade(100.0, 3.0, Side::Sell);
        let fills = sim.try_fills(1_100);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, 2.0);
        assert_eq!(fills[0].avg_px, 100.0);
    }

    #[test]
    fn sell_side_fills_carry_a_negative_signed_qty() {
        let mut sim = QueueAwareSimulator::new(0);
        sim.on_book(vec![], vec![(100.0, 0.0)]);
        sim.place_limit(ShadowOrder {
            order_id: "o1".to_string(),
            side: Side::Sell,
            price: 100.0,
            qty: 5.0,
            joined_at_ms: 0,
        });
        sim.on_trade(100.0, 10.0, Side::Buy);
        let fills = sim.try_fills(1_000);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].qty, -5.0);
    }

    #[test]
    fn cancel_removes_a_resting_order() {
        let mut sim = QueueAwareSimulator::new(0);
        sim.place_limit(ShadowOrder {
            order_id: "o1".to_string(),
            side: Side::Buy,
            price: 100.0,
            qty: 5.0,
            joined_at_ms: 0,
        });
        sim.cancel("o1");
        sim.on_trade(100.0, 100.0, Side::Sell);
        assert!(sim.try_fills(1_000_000).is_empty());
    }
}
