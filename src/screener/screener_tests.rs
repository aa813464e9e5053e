use std::sync::Arc;

use serde_json::json;

use super::{ScreenerConfig, ScreenerService};
use crate::bus::EventBus;

#[tokio::test]
async fn ticks_with_trades_accumulate_dollar_volume_and_rank_by_it() {
    let bus = Arc::new(EventBus::new());
    let screener = ScreenerService::new(ScreenerConfig::default(), bus.clone());
    let _sub = screener.subscribe();

    bus.publish(
        "ticks",
        json!({
            "symbol": "aapl",
            "ts": "2026-01-05T15:00:00Z",
            "trades": [{"px": 100.0, "size": 10.0}],
            "spreadBp": 4.0,
        }),
    )
    .await;
    bus.publish(
        "ticks",
        json!({
            "symbol": "msft",
            "ts": "2026-01-05T15:00:01Z",
            "trades": [{"px": 200.0, "size": 100.0}],
            "spreadBp": 2.0,
        }),
    )
    .await;

    screener.emit_refresh().await;
    let state = screener.state.lock();
    let snapshot = state.snapshots.get("MSFT").unwrap();
    assert_eq!(snapshot.dollar_volume, 20_000.0);
    let aapl = state.snapshots.get("AAPL").unwrap();
    assert_eq!(aapl.dollar_volume, 1_000.0);
}

#[tokio::test]
async fn tick_without_trades_falls_back_to_mid_times_volume() {
    let bus = Arc::new(EventBus::new());
    let screener = ScreenerService::new(ScreenerConfig::default(), bus.clone());
    let _sub = screener.subscribe();

    bus.publish(
        "ticks",
        json!({"symbol": "AAPL", "ts": "2026-01-05T15:00:00Z", "mid": 50.0, "volume": 4.0}),
    )
    .await;

    let state = screener.state.lock();
    let snapshot = state.snapshots.get("AAPL").unwrap();
    assert_eq!(snapshot.dollar_volume, 200.0);
}

#[tokio::test]
async fn a_new_eastern_session_resets_accumulated_stats() {
    let bus = Arc::new(EventBus::new());
    let screener = ScreenerService::new(ScreenerConfig::default(), bus.clone());
    let _sub = screener.subscribe();

    bus.publish(
        "ticks",
        json!({"symbol": "AAPL", "ts": "2026-01-05T15:00:00Z", "mid": 50.0, "volume": 4.0}),
    )
    .await;
    assert_eq!(screener.state.lock().snapshots.len(), 1);

    bus.publish(
        "ticks",
        json!({"symbol": "AAPL", "ts": "2026-01-06T15:00:00Z", "mid": 50.0, "volume": 4.0}),
    )
    .await;
    let state = screener.state.lock();
    assert_eq!(state.snapshots.len(), 1);
    assert_eq!(state.snapshots.get("AAPL").unwrap().dollar_volume, 200.0);
}

#[tokio::test]
async fn emit_refresh_truncates_to_max_symbols_and_persists_state() {
    let dir = tempfile::tempdir().unwrap();
    let state_file = dir.path().join("screener.json");
    let config = ScreenerConfig {
        max_symbols: 1,
        state_file: Some(state_file.clone()),
        ..Default::default()
    };
    let bus = Arc::new(EventBus::new());
    let screener = ScreenerService::new(config, bus.clone());
    let _sub = screener.subscribe();

    bus.publish(
        "ticks",
        json!({"symbol": "AAPL", "ts": "2026-01-05T15:00:00Z", "mid": 10.0, "volume": 1.0}),
    )
    .await;
    bus.publish(
        "ticks",
        json!({"symbol": "MSFT", "ts": "2026-01-05T15:00:00Z", "mid": 100.0, "volume": 100.0}),
    )
    .await;

    screener.emit_refresh().await;
    let contents = std::fs::read_to_string(&state_file).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let top = parsed["todayTop"].as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["symbol"], "MSFT");
}

#[test]
fn a_malformed_tick_without_a_symbol_is_ignored() {
    let bus = Arc::new(EventBus::new());
    let screener = ScreenerService::new(ScreenerConfig::default(), bus);
    screener.ingest_tick(&json!({"mid": 1.0}));
    assert!(screener.state.lock().snapshots.is_empty());
}
