//! Active-symbol churn control: intersects the screener's top-N with
//! symbols that have a ready model, and swaps the active set on a
//! churn-guarded cadence so the algo never sees symbol list thrash.
//!
//! Grounded on `original_source/services/universe/service.py`
//! (`UniverseService._handle_screener`, `_discover_ready_models`).

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bus::{EventBus, Handler};
use crate::models::{ActiveReason, ActiveSymbol, IntersectionEntry, Position, SymbolStatus, UniverseSummary};

#[derive(Debug, Clone)]
pub struct UniverseConfig {
    pub screener_topic: String,
    pub positions_topic: String,
    pub output_topic: String,
    pub state_file: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub max_symbols: usize,
    pub churn_minutes: i64,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            screener_topic: "screener.today_top10".to_string(),
            positions_topic: "broker.positions".to_string(),
            output_topic: "universe.active_symbols".to_string(),
            state_file: None,
            model_dir: PathBuf::from("ml-service/models"),
            max_symbols: 10,
            churn_minutes: 15,
        }
    }
}

struct UniverseState {
    positions: HashMap<String, f64>,
    active: Vec<String>,
    last_active: Vec<String>,
    last_swap_at: Option<DateTime<Utc>>,
}

/// Maintains the algo's active symbol set: top-N by dollar volume,
/// intersected with symbols that have a ready model, churn-guarded so
/// a symbol isn't dropped and re-added across consecutive refreshes.
pub struct UniverseService {
    config: UniverseConfig,
    bus: Arc<EventBus>,
    state: Mutex<UniverseState>,
}

impl UniverseService {
    pub fn new(config: UniverseConfig, bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            config,
            bus,
            state: Mutex::new(UniverseState {
                positions: HashMap::new(),
                active: Vec::new(),
                last_active: Vec::new(),
                last_swap_at: None,
            }),
        })
    }

    pub fn subscribe(self: &Arc<Self>) -> (crate::bus::Subscription, crate::bus::Subscription) {
        let screener = self
            .bus
            .subscription(&self.config.screener_topic, Arc::new(ScreenerHandler { universe: self.clone() }));
        let positions = self
            .bus
            .subscription(&self.config.positions_topic, Arc::new(PositionHandler { universe: self.clone() }));
        (screener, positions)
    }

    fn record_position(&self, position: &Position) {
        self.state
            .lock()
            .positions
            .insert(position.symbol.to_uppercase(), position.qty);
    }

    /// Scans `model_dir` for `*_metadata.json` files and returns the set of
    /// symbols with a ready model, creating the directory if it's absent.
    fn discover_ready_models(&self) -> HashSet<String> {
        let mut ready = HashSet::new();
        if std::fs::create_dir_all(&self.config.model_dir).is_err() {
            return ready;
        }
        let Ok(entries) = std::fs::read_dir(&self.config.model_dir) else {
            return ready;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with("_metadata.json") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(data) = serde_json::from_str::<serde_json::Value>(&raw) else {
                continue;
            };
            if let Some(symbol) = data.get("symbol").and_then(|v| v.as_str()) {
                ready.insert(symbol.to_uppercase());
            }
        }
        ready
    }

    async fn handle_screener(&self, payload: &serde_json::Value) {
        let top_entries: Vec<serde_json::Value> = payload
            .get("todayTop")
            .or_else(|| payload.get("todayTop10"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let ready_models = self.discover_ready_models();
        let mut reasons: HashMap<String, ActiveReason> = HashMap::new();
        let mut missing_models = Vec::new();

        let top_symbols: Vec<String> = top_entries
            .iter()
            .filter_map(|e| e.get("symbol").and_then(|v| v.as_str()).map(|s| s.to_uppercase()))
            .collect();

        for symbol in &top_symbols {
            if !ready_models.contains(symbol) {
                reasons.insert(symbol.clone(), ActiveReason::NoReadyModel);
                missing_models.push(symbol.clone());
            }
        }

        let candidate: Vec<String> = top_symbols.iter().filter(|s| ready_models.contains(*s)).cloned().collect();
        let ready_for_today = candidate.len().min(top_symbols.len());

        let now = Utc::now();
        let max_symbols = self.config.max_symbols;
        let churn_minutes = self.config.churn_minutes;

        let (active, last_active, next_refresh_ts, next_churn_ts) = {
            let mut state = self.state.lock();

            if state.active.is_empty() {
                state.active = candidate.iter().take(max_symbols).cloned().collect();
                state.last_swap_at = Some(now);
            } else {
                let churn_elapsed_minutes = state
                    .last_swap_at
                    .map(|at| (now - at).num_seconds() as f64 / 60.0);
                let churn_ready = churn_elapsed_minutes.map(|m| m >= churn_minutes as f64).unwrap_or(true);

                if churn_ready {
                    let desired: HashSet<&String> = candidate.iter().take(max_symbols).collect();
                    let mut next_active = Vec::new();
                    for sym in &state.active {
                        if desired.contains(sym) {
                            next_active.push(sym.clone());
                        } else {
                            let qty = state.positions.get(sym).copied().unwrap_or(0.0).abs();
                            if qty > 0.0 {
                                reasons.insert(sym.clone(), ActiveReason::OpenPosition);
                                next_active.push(sym.clone());
                            }
                        }
                    }
                    for sym in &candidate {
                        if next_active.contains(sym) {
                            continue;
                        }
                        if next_active.len() >= max_symbols {
                            break;
                        }
                        next_active.push(sym.clone());
                    }
                    let retired_now = state.active.iter().any(|s| !next_active.contains(s));
                    let added_now = next_active.iter().any(|s| !state.last_active.contains(s));
                    state.active = next_active;
                    if retired_now || added_now {
                        state.last_swap_at = Some(now);
                    }
                } else {
                    for sym in candidate.iter().filter(|s| !state.active.contains(s)) {
                        reasons.insert(sym.clone(), ActiveReason::ChurnGuard);
                    }
                }
            }

            let next_churn_ts = state.last_swap_at.map(|at| at + ChronoDuration::minutes(churn_minutes));
            let next_refresh_ts = payload
                .get("nextRefreshTs")
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc));

            let last_active = state.last_active.clone();
            let active = state.active.clone();
            state.last_active = active.clone();
            (active, last_active, next_refresh_ts, next_churn_ts)
        };

        let previous_set: HashSet<&String> = last_active.iter().collect();
        let mut active_symbols = Vec::with_capacity(active.len());
        for symbol in &active {
            let reason = reasons.get(symbol).copied();
            let status = if reason == Some(ActiveReason::OpenPosition) && !previous_set.contains(symbol) {
                SymbolStatus::Retained
            } else if previous_set.contains(symbol) {
                SymbolStatus::Kept
            } else {
                SymbolStatus::Added
            };
            let traded = reason != Some(ActiveReason::OpenPosition);
            active_symbols.push(ActiveSymbol {
                symbol: symbol.clone(),
                traded,
                reason,
                status,
            });
        }

        let current_set: HashSet<&String> = active.iter().collect();
        let retired_symbols: Vec<String> = {
            let state = self.state.lock();
            last_active
                .iter()
                .filter(|sym| !current_set.contains(sym))
                .filter(|sym| state.positions.get(*sym).copied().unwrap_or(0.0).abs() == 0.0)
                .cloned()
                .collect()
        };

        let intersection: Vec<IntersectionEntry> = top_entries
            .iter()
            .filter_map(|entry| {
                let symbol = entry.get("symbol")?.as_str()?.to_uppercase();
                let dollar_volume = entry.get("dollarVolume").and_then(|v| v.as_f64()).unwrap_or(0.0);
                Some(IntersectionEntry {
                    ready: ready_models.contains(&symbol),
                    reason: reasons.get(&symbol).copied(),
                    dollar_volume,
                    symbol,
                })
            })
            .collect();

        let mut ready_models_sorted: Vec<String> = ready_models.into_iter().collect();
        ready_models_sorted.sort();

        let summary = UniverseSummary {
            ts: now,
            next_refresh_ts,
            next_churn_ts,
            active_symbols,
            retired_symbols,
            intersection,
            ready_models: ready_models_sorted,
            ready_count: ready_for_today,
            missing_models,
            models_required: max_symbols.min(top_symbols.len()),
        };

        self.bus.publish_value(&self.config.output_topic, &summary).await;
        info!(active = summary.active_symbols.len(), "universe refreshed active set");
        self.persist_state(&summary);
    }

    fn persist_state(&self, summary: &UniverseSummary) {
        let Some(path) = &self.config.state_file else {
            return;
        };
        let json = match serde_json::to_string_pretty(summary) {
            Ok(json) => json,
            Err(err) => {
                error!(%err, "failed to serialize universe state");
                return;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(%err, "failed to create universe state directory");
                return;
            }
        }
        if let Err(err) = std::fs::write(path, json) {
            warn!(%err, "failed writing universe state");
        }
    }
}

struct ScreenerHandler {
    universe: Arc<UniverseService>,
}

#[async_trait]
impl Handler for ScreenerHandler {
    async fn call(&self, payload: serde_json::Value) {
        self.universe.handle_screener(&payload).await;
    }
}

struct PositionHandler {
    universe: Arc<UniverseService>,
}

#[async_trait]
impl Handler for PositionHandler {
    async fn call(&self, payload: serde_json::Value) {
        if let Ok(position) = serde_json::from_value::<Position>(payload) {
            self.universe.record_position(&position);
        }
    }
}
