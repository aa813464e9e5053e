use std::sync::Arc;

use super::{ShadowConfig, ShadowService};
use crate::bus::EventBus;

#[tokio::test]
async fn accepted_limit_order_then_matching_trades_produce_a_shadow_fill() {
    let bus = Arc::new(EventBus::new());
    let mut captured = Vec::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    struct Capture(tokio::sync::mpsc::UnboundedSender<serde_json::Value>);
    #[async_trait::async_trait]
    impl crate::bus::Handler for Capture {
        async fn call(&self, payload: serde_json::Value) {
            let _ = self.0.send(payload);
        }
    }
    let _sub = bus.subscription("shadow.fills", Arc::new(Capture(tx)));

    let mut cfg = ShadowConfig::default();
    cfg.latency_ms = 0;
    let shadow = ShadowService::new(cfg, bus.clone());
    let _subs = shadow.subscribe();

    bus.publish(
        "ticks.book",
        serde_json::json!({"bids": [[100.0, 4.0]], "asks": []}),
    )
    .await;
    bus.publish(
        "broker.orders",
        serde_json::json!({
            "status": "accepted",
            "orderId": "o1",
            "order": {"side": "BUY", "qty": 5.0, "type": "LMT", "price": 100.0},
            "symbol": "AAPL",
        }),
    )
    .await;
    bus.publish(
        "ticks.trades",
        serde_json::json!({"symbol": "AAPL", "price": 100.0, "size": 10.0, "aggressor": "SELL"}),
    )
    .await;

    while let Ok(payload) = rx.try_recv() {
        captured.push(payload);
    }
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0]["orderId"], "o1");
    // available = exec_since(10) - queue_ahead(4) = 6, capped at the
    // resting order's own qty of 5; signed positive for a BUY.
    assert_eq!(captured[0]["qty"], 5.0);
}
