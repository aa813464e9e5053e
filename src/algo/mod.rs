//! Wires ticks through inference and a decision policy into broker orders.
//!
//! Grounded on `original_source/services/algo/service.py` (`AlgoService`):
//! a per-service queue decouples tick ingestion from inference latency, the
//! active symbol set narrows to the universe controller's output once one
//! arrives, and a guardrail rejection is logged and swallowed rather than
//! propagated — the feed keeps running.

pub mod inference;
pub mod policy;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::broker::BrokerService;
use crate::bus::{EventBus, Handler};
use crate::models::Tick;

use inference::InferenceClient;
use policy::Policy;

#[derive(Debug, Clone)]
pub struct AlgoConfig {
    pub symbols: Vec<String>,
    pub tick_topic: String,
    pub universe_topic: Option<String>,
}

impl Default for AlgoConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            tick_topic: "ticks".to_string(),
            universe_topic: Some("universe.active_symbols".to_string()),
        }
    }
}

/// Drives the symbol universe + tick stream into inference, policy, and
/// broker order submission. One queue per service: a slow `/infer` call
/// never blocks the bus, and ticks for a busy symbol simply queue behind it.
pub struct AlgoService {
    config: AlgoConfig,
    bus: Arc<EventBus>,
    broker: Arc<BrokerService>,
    hmm: Arc<dyn InferenceClient>,
    policy: Mutex<Box<dyn Policy>>,
    active_symbols: Mutex<HashMap<String, bool>>,
    queue_tx: mpsc::UnboundedSender<Tick>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Tick>>>,
}

impl AlgoService {
    pub fn new(
        config: AlgoConfig,
        bus: Arc<EventBus>,
        broker: Arc<BrokerService>,
        hmm: Arc<dyn InferenceClient>,
        policy: Box<dyn Policy>,
    ) -> Arc<Self> {
        let active_symbols = config.symbols.iter().map(|s| (s.to_uppercase(), true)).collect();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            bus,
            broker,
            hmm,
            policy: Mutex::new(policy),
            active_symbols: Mutex::new(active_symbols),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        })
    }

    /// Subscribes to the tick stream and (if configured) the universe
    /// controller's output. Keep the returned subscriptions alive for as
    /// long as the service should run.
    pub fn subscribe(self: &Arc<Self>) -> Vec<crate::bus::Subscription> {
        let mut subs = vec![self
            .bus
            .subscription(&self.config.tick_topic, Arc::new(TickHandler { algo: self.clone() }))];
        if let Some(topic) = &self.config.universe_topic {
            subs.push(self.bus.subscription(topic, Arc::new(UniverseHandler { algo: self.clone() })));
        }
        subs
    }

    /// Drains the tick queue until the sender side (and every subscription)
    /// is dropped. Intended to be spawned as its own task.
    pub async fn run(self: &Arc<Self>) {
        let mut rx = match self.queue_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("AlgoService::run called more than once");
                return;
            }
        };
        while let Some(tick) = rx.recv().await {
            self.handle_tick(tick).await;
        }
    }

    async fn handle_tick(&self, tick: Tick) {
        if tick.features.is_empty() {
            return;
        }
        let ts_secs = tick.ts.timestamp() as f64 + tick.ts.timestamp_subsec_nanos() as f64 / 1e9;
        let inference = match self.hmm.infer(&tick.symbol, &tick.features, ts_secs).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, symbol = %tick.symbol, "/infer failed, using fallback");
                inference::InferResponse::fallback()
            }
        };

        let order = self.policy.lock().decide(&tick.symbol, &inference.probs, inference.confidence);
        let Some(order) = order else {
            return;
        };
        info!(symbol = %tick.symbol, ?order, "policy generated order");
        if let Err(err) = self.broker.place(&tick.symbol, order).await {
            warn!(%err, symbol = %tick.symbol, "order rejected");
        }
    }

    fn should_trade(&self, symbol: &str) -> bool {
        if symbol.is_empty() {
            return false;
        }
        let active = self.active_symbols.lock();
        if active.is_empty() {
            return self.config.symbols.is_empty()
                || self.config.symbols.iter().any(|s| s.eq_ignore_ascii_case(symbol));
        }
        active.get(&symbol.to_uppercase()).copied().unwrap_or(false)
    }

    fn update_universe(&self, payload: &serde_json::Value) {
        let mut next_map: HashMap<String, bool> = HashMap::new();
        if let Some(entries) = payload.get("activeSymbols").and_then(|v| v.as_array()) {
            for entry in entries {
                let Some(symbol) = entry.get("symbol").and_then(|v| v.as_str()) else {
                    continue;
                };
                if symbol.is_empty() {
                    continue;
                }
                let traded = entry.get("traded").and_then(|v| v.as_bool()).unwrap_or(false);
                next_map.insert(symbol.to_uppercase(), traded);
            }
        }
        if next_map.is_empty() && !self.config.symbols.is_empty() {
            next_map = self.config.symbols.iter().map(|s| (s.to_uppercase(), true)).collect();
        }

        let mut active = self.active_symbols.lock();
        let before: std::collections::HashSet<String> = active.keys().cloned().collect();
        let after: std::collections::HashSet<String> = next_map.keys().cloned().collect();
        if before != after {
            let traded: Vec<&String> = next_map.iter().filter(|(_, ok)| **ok).map(|(s, _)| s).collect();
            info!(?traded, "universe update changed active symbol set");
        }
        *active = next_map;
    }
}

struct TickHandler {
    algo: Arc<AlgoService>,
}

#[async_trait]
impl Handler for TickHandler {
    async fn call(&self, payload: serde_json::Value) {
        let tick: Tick = match serde_json::from_value(payload) {
            Ok(tick) => tick,
            Err(err) => {
                error!(%err, "invalid tick payload");
                return;
            }
        };
        if !self.algo.should_trade(&tick.symbol) {
            return;
        }
        if self.algo.queue_tx.send(tick).is_err() {
            warn!("algo queue closed; dropping tick");
        }
    }
}

struct UniverseHandler {
    algo: Arc<AlgoService>,
}

#[async_trait]
impl Handler for UniverseHandler {
    async fn call(&self, payload: serde_json::Value) {
        self.algo.update_universe(&payload);
    }
}
