//! Shadow fill service: wires the queue-aware simulator to the bus.

pub mod simulator;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::bus::{EventBus, Handler};
use crate::models::{Fill, FillKind, Side};

use simulator::{QueueAwareSimulator, ShadowOrder};

#[derive(Debug, Clone)]
pub struct ShadowConfig {
    pub topic_book: String,
    pub topic_trades: String,
    pub topic_orders: String,
    pub topic_shadow_fills: String,
    pub latency_ms: i64,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            topic_book: "ticks.book".to_string(),
            topic_trades: "ticks.trades".to_string(),
            topic_orders: "broker.orders".to_string(),
            topic_shadow_fills: "shadow.fills".to_string(),
            latency_ms: 60,
        }
    }
}

pub struct ShadowService {
    config: ShadowConfig,
    bus: Arc<EventBus>,
    sim: Mutex<QueueAwareSimulator>,
}

impl ShadowService {
    pub fn new(config: ShadowConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let latency_ms = config.latency_ms;
        Arc::new(Self {
            config,
            bus,
            sim: Mutex::new(QueueAwareSimulator::new(latency_ms)),
        })
    }

    /// Subscribes to order intake, book, and trade topics. Subscriptions
    /// live as long as the returned guards; hold them for the service's
    /// lifetime.
    pub fn subscribe(self: &Arc<Self>) -> Vec<crate::bus::Subscription> {
        vec![
            self.bus.subscription(
                &self.config.topic_orders,
                Arc::new(OrderIntakeHandler { shadow: self.clone() }),
            ),
            self.bus.subscription(
                &self.config.topic_book,
                Arc::new(BookHandler { shadow: self.clone() }),
            ),
            self.bus.subscription(
                &self.config.topic_trades,
                Arc::new(TradeHandler { shadow: self.clone() }),
            ),
        ]
    }
}

struct OrderIntakeHandler {
    shadow: Arc<ShadowService>,
}

#[async_trait]
impl Handler for OrderIntakeHandler {
    async fn call(&self, payload: serde_json::Value) {
        if payload.get("status").and_then(|v| v.as_str()) != Some("accepted") {
            return;
        }
        let Some(order_id) = payload.get("orderId").and_then(|v| v.as_str()) else {
            return;
        };
        let Some(order) = payload.get("order") else {
            return;
        };
        if order.get("type").and_then(|v| v.as_str()) != Some("LMT") {
            return;
        }
        let Some(price) = order.get("price").and_then(|v| v.as_f64()) else {
            return;
        };
        let Some(qty) = order.get("qty").and_then(|v| v.as_f64()) else {
            return;
        };
        let side = match order.get("side").and_then(|v| v.as_str()) {
            Some("BUY") => Side::Buy,
            Some("SELL") => Side::Sell,
            _ => return,
        };

        self.shadow.sim.lock().place_limit(ShadowOrder {
            order_id: order_id.to_string(),
            side,
            price,
            qty,
            joined_at_ms: Utc::now().timestamp_millis(),
        });
    }
}

struct BookHandler {
    shadow: Arc<ShadowService>,
}

#[async_trait]
impl Handler for BookHandler {
    async fn call(&self, payload: serde_json::Value) {
        let parse_levels = |key: &str| -> Vec<(f64, f64)> {
            payload
                .get(key)
                .and_then(|v| v.as_array())
                .map(|levels| {
                    levels
                        .iter()
                        .filter_map(|lvl| {
                            let pair = lvl.as_array()?;
                            Some((pair.first()?.as_f64()?, pair.get(1)?.as_f64()?))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let bids = parse_levels("bids");
        let asks = parse_levels("asks");
        self.shadow.sim.lock().on_book(bids, asks);
    }
}

#[cfg(test)]
mod shadow_tests;

struct TradeHandler {
    shadow: Arc<ShadowService>,
}

#[async_trait]
impl Handler for TradeHandler {
    async fn call(&self, payload: serde_json::Value) {
        let price = payload.get("price").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let size = payload.get("size").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let aggressor = match payload.get("aggressor").and_then(|v| v.as_str()) {
            Some("SELL") => Side::Sell,
            _ => Side::Buy,
        };
        let symbol = payload
            .get("symbol")
            .and_then(|v| v.as_str())
            .unwrap_or("UNKNOWN")
            .to_string();

        let fills = {
            let mut sim = self.shadow.sim.lock();
            sim.on_trade(price, size, aggressor);
            sim.try_fills(Utc::now().timestamp_millis())
        };

        for fill in fills {
            debug!(order_id = %fill.order_id, qty = fill.qty, "shadow fill");
            self.shadow
                .bus
                .publish_value(
                    &self.shadow.config.topic_shadow_fills,
                    &Fill {
                        order_id: fill.order_id,
                        symbol: symbol.clone(),
                        ts: Utc::now(),
                        px: fill.avg_px,
                        qty: fill.qty,
                        kind: FillKind::Shadow,
                        venue: "SIM".to_string(),
                    },
                )
                .await;
        }
    }
}
