use std::sync::Arc;

use super::guardrails::GuardrailConfig;
use super::{BrokerConfig, BrokerService};
use crate::bus::EventBus;
use crate::error::CoreError;
use crate::models::{OrderRequest, Side};

async fn spawn_broker(trading_enabled: bool) -> Arc<BrokerService> {
    let bus = Arc::new(EventBus::new());
    let mut cfg = BrokerConfig::default();
    cfg.trading_enabled = trading_enabled;
    let broker = BrokerService::new(cfg, GuardrailConfig::default(), bus);
    let run_handle = broker.clone();
    tokio::spawn(async move { run_handle.run().await });
    // `run`'s tick subscription registers on its first poll; yield once so
    // it's in place before the caller publishes anything.
    tokio::task::yield_now().await;
    broker
}

#[tokio::test]
async fn accepted_order_fills_and_opens_a_position() {
    let broker = spawn_broker(true).await;
    let ack = broker
        .place("AAPL", OrderRequest::limit(Side::Buy, 10.0, 100.0))
        .await
        .expect("order should be accepted");
    assert!(!ack.order_id.is_empty());
}

#[tokio::test]
async fn trading_disabled_blocks_every_order() {
    let broker = spawn_broker(false).await;
    let err = broker
        .place("AAPL", OrderRequest::market(Side::Buy, 1.0))
        .await
        .unwrap_err();
    assert_eq!(err, CoreError::TradingDisabled);
}

#[tokio::test]
async fn wide_spread_blocks_the_order() {
    let broker = spawn_broker(true).await;
    broker
        .bus
        .publish(
            "ticks",
            serde_json::json!({"symbol": "AAPL", "mid": 100.0, "spreadBp": 80.0}),
        )
        .await;
    let result = broker.place("AAPL", OrderRequest::market(Side::Buy, 1.0)).await;
    assert!(matches!(result, Err(CoreError::GuardrailBlocked { .. })));
}

#[tokio::test]
async fn flip_across_zero_reseeds_average_price() {
    let broker = spawn_broker(true).await;
    broker
        .place("AAPL", OrderRequest::market(Side::Buy, 10.0))
        .await
        .unwrap();
    // selling through to a short leaves a fresh avg_px at the fill price.
    let result = broker.place("AAPL", OrderRequest::limit(Side::Sell, 15.0, 90.0)).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn flatten_on_a_flat_symbol_is_a_noop() {
    let broker = spawn_broker(true).await;
    broker.flatten("AAPL").await.unwrap();
}
