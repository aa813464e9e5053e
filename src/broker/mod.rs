//! Paper-trading broker: single-consumer order intake, guardrail gating,
//! instant paper fills, and position/P&L bookkeeping.

pub mod guardrails;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, Handler};
use crate::error::CoreError;
use crate::models::{Fill, FillKind, GuardrailEvent, OrderAck, OrderEvent, OrderRequest, Position, Side};

use guardrails::{GuardrailConfig, GuardrailEngine, GuardrailRule};

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub topic_orders: String,
    pub topic_fills: String,
    pub topic_positions: String,
    pub topic_guardrails: String,
    pub tick_topic: String,
    pub trading_enabled: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            topic_orders: "broker.orders".to_string(),
            topic_fills: "broker.fills".to_string(),
            topic_positions: "broker.positions".to_string(),
            topic_guardrails: "broker.guardrails".to_string(),
            tick_topic: "ticks".to_string(),
            trading_enabled: true,
        }
    }
}

struct PendingOrder {
    submitted_at: chrono::DateTime<Utc>,
}

struct SubmitTask {
    symbol: String,
    order: OrderRequest,
    reply: oneshot::Sender<Result<OrderAck, CoreError>>,
}

struct Inner {
    pending: HashMap<String, PendingOrder>,
    positions: HashMap<String, Position>,
    pnl: HashMap<String, f64>,
    last_mid: HashMap<String, f64>,
    guardrails: GuardrailEngine,
}

/// Owns the intake queue and all broker-side state. One cooperative worker
/// (spawned by `run`) drains `submit_tx`, so every order is handled to
/// completion before the next is dequeued — this linearizes state
/// transitions across symbols.
pub struct BrokerService {
    config: BrokerConfig,
    bus: Arc<EventBus>,
    submit_tx: mpsc::UnboundedSender<SubmitTask>,
    submit_rx: Mutex<Option<mpsc::UnboundedReceiver<SubmitTask>>>,
    inner: Mutex<Inner>,
}

impl BrokerService {
    pub fn new(config: BrokerConfig, guardrail_config: GuardrailConfig, bus: Arc<EventBus>) -> Arc<Self> {
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            bus,
            submit_tx,
            submit_rx: Mutex::new(Some(submit_rx)),
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                positions: HashMap::new(),
                pnl: HashMap::new(),
                last_mid: HashMap::new(),
                guardrails: GuardrailEngine::new(guardrail_config),
            }),
        })
    }

    /// Subscribes to ticks and drains the intake queue until the bus/process
    /// shuts down. Intended to be spawned as its own task.
    pub async fn run(self: &Arc<Self>) {
        let _sub = self.bus.subscription(
            &self.config.tick_topic,
            Arc::new(TickHandler {
                broker: self.clone(),
            }),
        );

        let mut rx = match self.submit_rx.lock().take() {
            Some(rx) => rx,
            None => {
                warn!("BrokerService::run called more than once");
                return;
            }
        };

        while let Some(task) = rx.recv().await {
            self.handle_task(task).await;
        }
    }

    pub async fn place(&self, symbol: &str, order: OrderRequest) -> Result<OrderAck, CoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task = SubmitTask {
            symbol: symbol.to_string(),
            order,
            reply: reply_tx,
        };
        if self.submit_tx.send(task).is_err() {
            return Err(CoreError::BrokerStopping);
        }
        reply_rx.await.unwrap_or(Err(CoreError::BrokerStopping))
    }

    pub async fn flatten(&self, symbol: &str) -> Result<(), CoreError> {
        let qty = {
            let inner = self.inner.lock();
            inner.positions.get(symbol).map(|p| p.qty).unwrap_or(0.0)
        };
        if qty == 0.0 {
            return Ok(());
        }
        let side = if qty > 0.0 { Side::Sell } else { Side::Buy };
        self.place(symbol, OrderRequest::market(side, qty.abs())).await?;
        Ok(())
    }

    pub async fn flatten_all(&self) -> Result<(), CoreError> {
        let symbols: Vec<String> = {
            let inner = self.inner.lock();
            inner
                .positions
                .iter()
                .filter(|(_, p)| !p.is_flat())
                .map(|(s, _)| s.clone())
                .collect()
        };
        for symbol in symbols {
            self.flatten(&symbol).await?;
        }
        Ok(())
    }

    /// Real brokerage cancellation plumbing is out of scope for this core;
    /// acknowledge and move on.
    pub async fn cancel(&self, order_id: &str) {
        info!(order_id, "cancel requested (no-op)");
    }

    async fn handle_task(&self, task: SubmitTask) {
        let SubmitTask { symbol, order, reply } = task;

        if !self.config.trading_enabled {
            warn!(symbol, ?order, "order blocked (trading disabled)");
            self.emit_guardrail(&symbol, &order, GuardrailRule::Kill, "Trading disabled".to_string())
                .await;
            let _ = reply.send(Err(CoreError::TradingDisabled));
            return;
        }

        let blocked = {
            let mut inner = self.inner.lock();
            inner.guardrails.evaluate(&symbol, &order)
        };
        if let Some(rule) = blocked {
            let reason = {
                let inner = self.inner.lock();
                inner.guardrails.reason_text(rule, &symbol)
            };
            warn!(symbol, ?rule, "order blocked by guardrail");
            self.emit_guardrail(&symbol, &order, rule, reason.clone()).await;
            self.bus
                .publish_value(
                    &self.config.topic_orders,
                    &OrderEvent::Blocked {
                        reason: rule,
                        symbol: symbol.clone(),
                        order: order.clone(),
                    },
                )
                .await;
            let _ = reply.send(Err(CoreError::GuardrailBlocked { rule, reason }));
            return;
        }

        let order_id = Uuid::new_v4().to_string();
        let submitted_at = Utc::now();
        {
            let mut inner = self.inner.lock();
            inner.pending.insert(order_id.clone(), PendingOrder { submitted_at });
        }
        self.bus
            .publish_value(
                &self.config.topic_orders,
                &OrderEvent::Accepted {
                    order_id: order_id.clone(),
                    symbol: symbol.clone(),
                    order: order.clone(),
                },
            )
            .await;
        info!(symbol, order_id, "order accepted");
        let _ = reply.send(Ok(OrderAck {
            order_id: order_id.clone(),
        }));

        let px = {
            let inner = self.inner.lock();
            order.price.or_else(|| inner.last_mid.get(&symbol).copied()).unwrap_or(0.0)
        };
        let fill = Fill {
            order_id: order_id.clone(),
            symbol: symbol.clone(),
            ts: Utc::now(),
            px,
            qty: order.side.signed(order.qty),
            kind: FillKind::Paper,
            venue: "SIM".to_string(),
        };
        self.bus.publish_value(&self.config.topic_fills, &fill).await;

        let mut inner = self.inner.lock();
        let pending = inner.pending.remove(&order_id);
        let latency_ms = pending
            .map(|p| (Utc::now() - p.submitted_at).num_milliseconds().max(0) as f64)
            .unwrap_or(0.0);
        let (realized, position) = apply_fill(&mut inner.positions, &symbol, &fill);
        inner.guardrails.update_latency(&symbol, latency_ms);
        let total_pnl = inner.pnl.entry(symbol.clone()).or_insert(0.0);
        *total_pnl += realized;
        let total_pnl = *total_pnl;
        inner.guardrails.update_pnl(&symbol, total_pnl);
        inner.guardrails.update_position(&symbol, position.qty, position.avg_px);
        drop(inner);

        self.bus.publish_value(&self.config.topic_positions, &position).await;
    }

    async fn emit_guardrail(&self, symbol: &str, order: &OrderRequest, rule: GuardrailRule, message: String) {
        self.bus
            .publish_value(
                &self.config.topic_guardrails,
                &GuardrailEvent {
                    rule,
                    message,
                    symbol: symbol.to_string(),
                    order: order.clone(),
                    severity: "block".to_string(),
                    ts: Utc::now(),
                },
            )
            .await;
    }
}

/// Applies a fill's signed qty to a position, returning the newly realized
/// P&L and the updated position. Handles the direction-flip edge case:
/// closing through zero realizes against the old average price for the
/// closing leg, then reseeds the average price at the fill price for
/// whatever remains open in the new direction.
fn apply_fill(positions: &mut HashMap<String, Position>, symbol: &str, fill: &Fill) -> (f64, Position) {
    let mut pos = positions
        .get(symbol)
        .cloned()
        .unwrap_or_else(|| Position::flat(symbol));

    let qty_before = pos.qty;
    let avg_before = pos.avg_px;
    let qty_after = qty_before + fill.qty;

    let mut realized = 0.0;
    let avg_after;

    if qty_before == 0.0 {
        avg_after = fill.px;
    } else if qty_before > 0.0 && fill.qty < 0.0 {
        let closing = qty_before.min(-fill.qty);
        realized = (fill.px - avg_before) * closing;
        avg_after = if qty_after > 0.0 {
            avg_before
        } else if qty_after < 0.0 {
            fill.px
        } else {
            0.0
        };
    } else if qty_before < 0.0 && fill.qty > 0.0 {
        let closing = (-qty_before).min(fill.qty);
        realized = (avg_before - fill.px) * closing;
        avg_after = if qty_after < 0.0 {
            avg_before
        } else if qty_after > 0.0 {
            fill.px
        } else {
            0.0
        };
    } else if qty_after != 0.0 {
        avg_after = (avg_before * qty_before + fill.px * fill.qty) / qty_after;
    } else {
        avg_after = 0.0;
    }

    pos.qty = qty_after;
    pos.avg_px = if qty_after != 0.0 { avg_after } else { 0.0 };
    positions.insert(symbol.to_string(), pos.clone());
    (realized, pos)
}

struct TickHandler {
    broker: Arc<BrokerService>,
}

#[async_trait]
impl Handler for TickHandler {
    async fn call(&self, payload: serde_json::Value) {
        let Some(symbol) = payload.get("symbol").and_then(|v| v.as_str()) else {
            return;
        };
        let mut inner = self.broker.inner.lock();
        if let Some(mid) = payload.get("mid").and_then(|v| v.as_f64()) {
            inner.last_mid.insert(symbol.to_string(), mid);
        }
        if let Some(spread) = payload.get("spreadBp").and_then(|v| v.as_f64()) {
            inner.guardrails.update_spread(symbol, spread);
        }
    }
}

#[cfg(test)]
mod broker_tests;
