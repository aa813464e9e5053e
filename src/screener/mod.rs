//! Session-scoped dollar-volume screener: accumulates per-symbol stats
//! from the tick stream and periodically emits a ranked top-N.
//!
//! Grounded on `original_source/services/universe/service.py`
//! (`ScreenerService`, `SymbolSnapshot`, `_handle_tick`,
//! `_schedule_next_refresh`, `_emit_refresh`, state-file persistence).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bus::{EventBus, Handler};
use crate::models::{ScreenerEntry, ScreenerRefresh};
use crate::session::{eastern_date, next_refresh_after};

#[derive(Debug, Clone)]
pub struct ScreenerConfig {
    pub tick_topic: String,
    pub output_topic: String,
    pub state_file: Option<PathBuf>,
    pub max_symbols: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            tick_topic: "ticks".to_string(),
            output_topic: "screener.today_top10".to_string(),
            state_file: None,
            max_symbols: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SymbolSnapshot {
    dollar_volume: f64,
    trades: u64,
    spread_sum: f64,
    spread_samples: u64,
    last_seen: Option<DateTime<Utc>>,
}

impl SymbolSnapshot {
    fn to_entry(&self, symbol: &str) -> ScreenerEntry {
        let avg_spread_bp = if self.spread_samples > 0 {
            self.spread_sum / self.spread_samples as f64
        } else {
            0.0
        };
        ScreenerEntry {
            symbol: symbol.to_string(),
            dollar_volume: self.dollar_volume,
            total_trades: self.trades,
            avg_spread_bp,
            last_seen: self.last_seen.unwrap_or_else(Utc::now),
        }
    }
}

struct SessionState {
    session_date: Option<NaiveDate>,
    snapshots: HashMap<String, SymbolSnapshot>,
    next_refresh_at: Option<DateTime<Utc>>,
}

/// Accumulates dollar-volume stats per Eastern session and periodically
/// ranks and publishes the top-N.
pub struct ScreenerService {
    config: ScreenerConfig,
    bus: Arc<EventBus>,
    state: Mutex<SessionState>,
}

impl ScreenerService {
    pub fn new(config: ScreenerConfig, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            state: Mutex::new(SessionState {
                session_date: None,
                snapshots: HashMap::new(),
                next_refresh_at: None,
            }),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> crate::bus::Subscription {
        self.bus
            .subscription(&self.config.tick_topic, Arc::new(TickHandler { screener: self.clone() }))
    }

    /// Runs the periodic refresh timer. Intended to be spawned as its own
    /// task; checks every second, matching the original's `asyncio.sleep(1)`
    /// polling step.
    pub async fn run(self: &Arc<Self>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let due = {
                let state = self.state.lock();
                state.next_refresh_at.map(|at| Utc::now() >= at).unwrap_or(false)
            };
            if due {
                self.emit_refresh().await;
            }
        }
    }

    fn ingest_tick(&self, payload: &serde_json::Value) {
        let Some(symbol) = payload.get("symbol").and_then(|v| v.as_str()) else {
            return;
        };
        let symbol = symbol.to_uppercase();
        let ts = parse_ts(payload.get("ts"));

        let mut state = self.state.lock();
        let today = eastern_date(ts);
        if state.session_date != Some(today) {
            info!(session_date = %today, "resetting screener session");
            state.snapshots.clear();
            state.session_date = Some(today);
            state.next_refresh_at = Some(next_refresh_after(ts));
        }

        let snapshot = state.snapshots.entry(symbol).or_default();

        let mut dollar_volume = 0.0;
        let mut trade_count = 0u64;
        if let Some(trades) = payload.get("trades").and_then(|v| v.as_array()) {
            for trade in trades {
                let px = trade.get("px").and_then(|v| v.as_f64());
                let size = trade.get("size").and_then(|v| v.as_f64());
                if let (Some(px), Some(size)) = (px, size) {
                    if px > 0.0 && size.abs() > 0.0 {
                        dollar_volume += px * size.abs();
                        trade_count += 1;
                    }
                }
            }
        }
        // Fall back to mid x volume when no discrete trades are present,
        // per SPEC_FULL.md §10.5's supplemented dollar-volume rule.
        if dollar_volume == 0.0 {
            let mid = payload.get("mid").and_then(|v| v.as_f64());
            let volume = payload
                .get("volume")
                .or_else(|| payload.get("qty"))
                .and_then(|v| v.as_f64());
            if let (Some(mid), Some(volume)) = (mid, volume) {
                if mid > 0.0 && volume.abs() > 0.0 {
                    dollar_volume = mid * volume.abs();
                }
            }
        }
        snapshot.dollar_volume += dollar_volume;
        snapshot.trades += trade_count;

        if let Some(spread) = payload
            .get("spreadBp")
            .or_else(|| payload.get("spread_bp"))
            .and_then(|v| v.as_f64())
        {
            if spread >= 0.0 {
                snapshot.spread_sum += spread;
                snapshot.spread_samples += 1;
            }
        }
        snapshot.last_seen = Some(ts);
    }

    async fn emit_refresh(&self) {
        let (entries, next_refresh_ts) = {
            let mut state = self.state.lock();
            let now = Utc::now();
            state.next_refresh_at = Some(next_refresh_after(now));
            let mut entries: Vec<ScreenerEntry> = state
                .snapshots
                .iter()
                .map(|(symbol, snap)| snap.to_entry(symbol))
                .collect();
            entries.sort_by(|a, b| b.dollar_volume.partial_cmp(&a.dollar_volume).unwrap_or(std::cmp::Ordering::Equal));
            entries.truncate(self.config.max_symbols);
            (entries, state.next_refresh_at)
        };

        let refresh = ScreenerRefresh {
            ts: Utc::now(),
            next_refresh_ts,
            today_top: entries,
        };
        self.bus.publish_value(&self.config.output_topic, &refresh).await;
        info!(count = refresh.today_top.len(), "screener emitted top symbols");
        self.persist_state(&refresh);
    }

    fn persist_state(&self, refresh: &ScreenerRefresh) {
        let Some(path) = &self.config.state_file else {
            return;
        };
        let json = match serde_json::to_string_pretty(refresh) {
            Ok(json) => json,
            Err(err) => {
                error!(%err, "failed to serialize screener state");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(%err, "failed to create screener state directory");
                return;
            }
        }
        if let Err(err) = std::fs::write(path, json) {
            warn!(%err, "failed writing screener state");
        }
    }
}

fn parse_ts(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    match value {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
            .unwrap_or_else(Utc::now),
        _ => Utc::now(),
    }
}

struct TickHandler {
    screener: Arc<ScreenerService>,
}

#[async_trait]
impl Handler for TickHandler {
    async fn call(&self, payload: serde_json::Value) {
        self.screener.ingest_tick(&payload);
    }
}

#[cfg(test)]
mod screener_tests;
