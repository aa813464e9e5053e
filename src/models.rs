//! Wire types for every bus topic in SPEC_FULL.md §6.
//!
//! Mirrors `original_source/services/common/schemas.py` field-for-field;
//! camelCase aliases keep the JSON shape stable across the bus even though
//! Rust-side code reads/writes the snake_case field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::guardrails::GuardrailRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn signed(self, qty: f64) -> f64 {
        match self {
            Side::Buy => qty,
            Side::Sell => -qty,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Mkt,
    Lmt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    Day,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    Paper,
    Live,
    Shadow,
}

/// One trade print carried inline on a `Tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub px: f64,
    pub size: f64,
    pub side: Side,
}

/// Normalized top-of-book snapshot plus derived features for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub mid: f64,
    #[serde(rename = "spreadBp")]
    pub spread_bp: f64,
    pub imb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades: Option<Vec<Trade>>,
    pub features: Vec<f64>,
}

/// Top-5 depth snapshot, published alongside every `Tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

/// A single trade print on the tape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePrint {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub price: f64,
    pub size: f64,
    pub aggressor: Side,
}

/// A submission to the broker: place/cancel/flatten only (no modify).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub qty: f64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tif: Option<TimeInForce>,
}

impl OrderRequest {
    pub fn market(side: Side, qty: f64) -> Self {
        Self {
            side,
            qty,
            order_type: OrderType::Mkt,
            price: None,
            tif: None,
        }
    }

    pub fn limit(side: Side, qty: f64, price: f64) -> Self {
        Self {
            side,
            qty,
            order_type: OrderType::Lmt,
            price: Some(price),
            tif: None,
        }
    }
}

/// Acknowledgement returned to the submitter on acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// A fill, whether paper, live, or simulated by the shadow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    #[serde(rename = "orderId")]
    pub order_id: String,
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub px: f64,
    /// Signed: positive for buys, negative for sells.
    pub qty: f64,
    pub kind: FillKind,
    pub venue: String,
}

/// Per-symbol net position and cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed: positive long, negative short.
    pub qty: f64,
    #[serde(rename = "avgPx")]
    pub avg_px: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            qty: 0.0,
            avg_px: 0.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.qty == 0.0
    }
}

/// One entry in the screener's ranked top-N.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerEntry {
    pub symbol: String,
    #[serde(rename = "dollarVolume")]
    pub dollar_volume: f64,
    #[serde(rename = "totalTrades")]
    pub total_trades: u64,
    #[serde(rename = "avgSpreadBp")]
    pub avg_spread_bp: f64,
    #[serde(rename = "lastSeen")]
    pub last_seen: DateTime<Utc>,
}

/// The `screener.today_top10` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerRefresh {
    pub ts: DateTime<Utc>,
    #[serde(rename = "nextRefreshTs")]
    pub next_refresh_ts: Option<DateTime<Utc>>,
    #[serde(rename = "todayTop")]
    pub today_top: Vec<ScreenerEntry>,
}

/// Why an order was or wasn't accepted, published on `broker.orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderEvent {
    Accepted {
        #[serde(rename = "orderId")]
        order_id: String,
        symbol: String,
        order: OrderRequest,
    },
    Blocked {
        reason: GuardrailRule,
        symbol: String,
        order: OrderRequest,
    },
}

/// A pre-trade guardrail decision, published on `broker.guardrails`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailEvent {
    pub rule: GuardrailRule,
    pub message: String,
    pub symbol: String,
    pub order: OrderRequest,
    /// Always `"block"` today; left as a string so a future severity
    /// tier (e.g. a non-blocking warn) doesn't require a wire change.
    pub severity: String,
    pub ts: DateTime<Utc>,
}

/// Per-symbol lifecycle status reported by the universe controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    Added,
    Kept,
    Retained,
    Retired,
}

/// Reason a symbol did or did not make the active set this refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActiveReason {
    ChurnGuard,
    OpenPosition,
    NoReadyModel,
}

/// One entry in `universe.active_symbols::activeSymbols`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSymbol {
    pub symbol: String,
    pub traded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ActiveReason>,
    pub status: SymbolStatus,
}

/// One entry in the screener/ready-model intersection report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntersectionEntry {
    pub symbol: String,
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ActiveReason>,
    #[serde(rename = "dollarVolume")]
    pub dollar_volume: f64,
}

/// The `universe.active_symbols` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSummary {
    pub ts: DateTime<Utc>,
    #[serde(rename = "nextRefreshTs")]
    pub next_refresh_ts: Option<DateTime<Utc>>,
    #[serde(rename = "nextChurnTs")]
    pub next_churn_ts: Option<DateTime<Utc>>,
    #[serde(rename = "activeSymbols")]
    pub active_symbols: Vec<ActiveSymbol>,
    #[serde(rename = "retiredSymbols")]
    pub retired_symbols: Vec<String>,
    pub intersection: Vec<IntersectionEntry>,
    #[serde(rename = "readyModels")]
    pub ready_models: Vec<String>,
    #[serde(rename = "readyCount")]
    pub ready_count: usize,
    #[serde(rename = "missingModels")]
    pub missing_models: Vec<String>,
    #[serde(rename = "modelsRequired")]
    pub models_required: usize,
}
