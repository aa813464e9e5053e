//! Feed adapter: turns raw book updates into normalized bus events.
//!
//! Grounded on `original_source/services/blotter/service.py`
//! (`BlotterService`, `IBKRFeed._process_update`): per-update feature
//! computation + standardization, the `tick`/`book`/`trade` event triad,
//! filesystem symbol hot-reload, and off-thread CSV recording.

pub mod feed;
pub mod recorder;
pub mod symbols;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bus::EventBus;
use crate::features::{self, Standardizer};
use crate::models::{BookSnapshot, Side, Tick, Trade, TradePrint};

use feed::{Feed, RawBookUpdate};
use recorder::TickRecorder;
use symbols::{diff_symbols, SymbolFileWatcher, SymbolSpec};

#[derive(Debug, Clone)]
pub struct BlotterConfig {
    pub symbols: Vec<SymbolSpec>,
    pub topic_ticks: String,
    pub topic_book: String,
    pub topic_trades: String,
    pub feature_window: usize,
    pub record_path: Option<PathBuf>,
    pub symbols_file: Option<PathBuf>,
    pub symbol_poll_interval: Duration,
}

impl Default for BlotterConfig {
    fn default() -> Self {
        Self {
            symbols: vec![SymbolSpec::new("AAPL")],
            topic_ticks: "ticks".to_string(),
            topic_book: "ticks.book".to_string(),
            topic_trades: "ticks.trades".to_string(),
            feature_window: 30,
            record_path: None,
            symbols_file: None,
            symbol_poll_interval: Duration::from_secs(2),
        }
    }
}

pub struct BlotterService {
    config: Mutex<BlotterConfig>,
    bus: Arc<EventBus>,
    standardizer: Mutex<Standardizer>,
    recorder: Option<TickRecorder>,
}

impl BlotterService {
    pub fn new(config: BlotterConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let window = config.feature_window;
        let recorder = config.record_path.clone().map(TickRecorder::spawn);
        Arc::new(Self {
            config: Mutex::new(config),
            bus,
            standardizer: Mutex::new(Standardizer::new(window)),
            recorder,
        })
    }

    /// Connects `feed`, applies the initial symbol set, then drains raw
    /// updates and the symbol-file poll timer until `rx` closes. Feed
    /// connect failure is fatal to the blotter per SPEC_FULL.md §4.3/§7.
    pub async fn run(
        self: &Arc<Self>,
        mut feed: Box<dyn Feed>,
        mut rx: tokio::sync::mpsc::UnboundedReceiver<RawBookUpdate>,
    ) -> anyhow::Result<()> {
        feed.start().await.map_err(|err| {
            error!(%err, "feed connect failed; blotter exiting");
            err
        })?;
        let initial_symbols = self.config.lock().symbols.clone();
        feed.update_symbols(&initial_symbols).await?;
        info!(count = initial_symbols.len(), "blotter subscribed to initial symbols");

        let mut watcher = self
            .config
            .lock()
            .symbols_file
            .clone()
            .map(|path| SymbolFileWatcher::new(path, SymbolSpec::new("AAPL")));
        let poll_interval = self.config.lock().symbol_poll_interval;
        let mut poll_timer = tokio::time::interval(poll_interval);
        poll_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                update = rx.recv() => {
                    match update {
                        Some(update) => self.handle_update(update).await,
                        None => break,
                    }
                }
                _ = poll_timer.tick(), if watcher.is_some() => {
                    if let Some(watcher) = watcher.as_mut() {
                        if let Some(desired) = watcher.poll() {
                            self.apply_symbol_update(feed.as_mut(), desired).await;
                        }
                    }
                }
            }
        }
        feed.stop().await?;
        Ok(())
    }

    async fn apply_symbol_update(&self, feed: &mut dyn Feed, desired: Vec<SymbolSpec>) {
        let current = self.config.lock().symbols.clone();
        let diff = diff_symbols(&current, &desired);
        if diff.to_add.is_empty() && diff.to_remove.is_empty() {
            return;
        }
        if let Err(err) = feed.update_symbols(&desired).await {
            warn!(%err, "failed to apply symbol update to feed");
            return;
        }
        self.config.lock().symbols = desired;
        info!(added = diff.to_add.len(), removed = diff.to_remove.len(), "symbol set updated");
    }

    async fn handle_update(&self, update: RawBookUpdate) {
        if update.best_bid <= 0.0 || update.best_ask <= 0.0 {
            return;
        }
        let mid = features::mid(update.best_bid, update.best_ask);
        let spread_bp = features::spread_bp(update.best_bid, update.best_ask);
        let imb = features::order_flow_imbalance(&update.bids, &update.asks);
        let microprice = features::microprice(&update.bids, &update.asks);
        let vol = features::rolling_volatility(&[mid, microprice]);
        let raw = [mid, spread_bp, imb, microprice, vol];

        let standardized = self.standardizer.lock().transform(&update.symbol, &raw);
        let (topic_ticks, topic_book, topic_trades) = {
            let cfg = self.config.lock();
            (cfg.topic_ticks.clone(), cfg.topic_book.clone(), cfg.topic_trades.clone())
        };

        let ts = Utc::now();
        let mut depth: Vec<(f64, f64)> = update.bids.iter().take(3).cloned().collect();
        depth.extend(update.asks.iter().take(3).cloned());

        let trades = update.last_trade.map(|(px, size)| {
            let side = if px >= mid { Side::Buy } else { Side::Sell };
            vec![Trade { px, size, side }]
        });

        let tick = Tick {
            symbol: update.symbol.clone(),
            ts,
            mid,
            spread_bp,
            imb,
            depth: Some(depth),
            trades: trades.clone(),
            features: standardized,
        };

        self.bus.publish_value(&topic_ticks, &tick).await;
        if let Some(recorder) = &self.recorder {
            recorder.record(&update.symbol, &tick);
        }

        let book = BookSnapshot {
            symbol: update.symbol.clone(),
            ts,
            bids: update.bids.iter().take(5).cloned().collect(),
            asks: update.asks.iter().take(5).cloned().collect(),
        };
        self.bus.publish_value(&topic_book, &book).await;

        if let Some(trades) = trades {
            if let Some(trade) = trades.first() {
                let print = TradePrint {
                    symbol: update.symbol,
                    ts,
                    price: trade.px,
                    size: trade.size,
                    aggressor: trade.side,
                };
                self.bus.publish_value(&topic_trades, &print).await;
            }
        }
    }
}

#[cfg(test)]
mod blotter_tests;
