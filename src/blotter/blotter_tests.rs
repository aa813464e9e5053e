use std::sync::Arc;
use std::time::Duration;

use super::feed::{RawBookUpdate, SimFeed};
use super::symbols::SymbolSpec;
use super::{BlotterConfig, BlotterService};
use crate::bus::EventBus;

struct Capture(tokio::sync::mpsc::UnboundedSender<(String, serde_json::Value)>);

#[async_trait::async_trait]
impl crate::bus::Handler for Capture {
    async fn call(&self, payload: serde_json::Value) {
        let _ = self.0.send((payload["symbol"].as_str().unwrap_or_default().to_string(), payload));
    }
}

#[tokio::test]
async fn a_valid_book_update_emits_tick_and_book() {
    let bus = Arc::new(EventBus::new());
    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::unbounded_channel();
    let (book_tx, mut book_rx) = tokio::sync::mpsc::unbounded_channel();
    let _tick_sub = bus.subscription("ticks", Arc::new(Capture(tick_tx)));
    let _book_sub = bus.subscription("ticks.book", Arc::new(Capture(book_tx)));

    let config = BlotterConfig {
        symbols: vec![SymbolSpec::new("AAPL")],
        ..Default::default()
    };
    let blotter = BlotterService::new(config, bus.clone());
    let (mut raw_feed, rx) = SimFeed::new();
    raw_feed.start().await.unwrap();
    raw_feed.update_symbols(&[SymbolSpec::new("AAPL")]).await.unwrap();
    raw_feed.push(RawBookUpdate {
        symbol: "AAPL".to_string(),
        best_bid: 99.0,
        best_ask: 101.0,
        bids: vec![(99.0, 5.0)],
        asks: vec![(101.0, 5.0)],
        last_trade: Some((100.0, 2.0)),
    });
    drop(raw_feed);

    blotter.run(Box::new(NoopFeed), rx).await.unwrap();

    let (symbol, tick) = tick_rx.try_recv().expect("tick should be published");
    assert_eq!(symbol, "AAPL");
    assert_eq!(tick["mid"], 100.0);

    let (symbol, _book) = book_rx.try_recv().expect("book should be published");
    assert_eq!(symbol, "AAPL");
}

#[tokio::test]
async fn a_crossed_or_zero_book_is_dropped() {
    let bus = Arc::new(EventBus::new());
    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::unbounded_channel();
    let _sub = bus.subscription("ticks", Arc::new(Capture(tick_tx)));

    let config = BlotterConfig {
        symbols: vec![SymbolSpec::new("AAPL")],
        ..Default::default()
    };
    let blotter = BlotterService::new(config, bus.clone());
    let (mut raw_feed, rx) = SimFeed::new();
    raw_feed.start().await.unwrap();
    raw_feed.update_symbols(&[SymbolSpec::new("AAPL")]).await.unwrap();
    raw_feed.push(RawBookUpdate {
        symbol: "AAPL".to_string(),
        best_bid: 0.0,
        best_ask: 0.0,
        bids: vec![],
        asks: vec![],
        last_trade: None,
    });
    drop(raw_feed);

    blotter.run(Box::new(NoopFeed), rx).await.unwrap();
    assert!(tick_rx.try_recv().is_err());
}

/// A feed double whose `start`/`update_symbols`/`stop` are no-ops, used as
/// the `run()` argument when the test drives updates through a raw channel
/// instead of through the feed handle itself.
struct NoopFeed;

#[async_trait::async_trait]
impl super::feed::Feed for NoopFeed {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn update_symbols(&mut self, _symbols: &[SymbolSpec]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn symbol_poll_interval_defaults_are_sane() {
    let config = BlotterConfig::default();
    assert!(config.symbol_poll_interval >= Duration::from_secs(1));
}
