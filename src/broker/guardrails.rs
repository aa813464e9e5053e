//! Pre-trade risk rules evaluated before every order submission.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{OrderRequest, Side};

/// A guardrail that can block an order, in the fixed evaluation order
/// `evaluate` checks them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuardrailRule {
    #[serde(rename = "SPREAD")]
    Spread,
    #[serde(rename = "POS")]
    Position,
    #[serde(rename = "COOLDOWN")]
    Cooldown,
    #[serde(rename = "LATENCY")]
    Latency,
    #[serde(rename = "DD")]
    Drawdown,
    #[serde(rename = "KILL")]
    Kill,
}

/// Accumulated per-symbol state the engine evaluates orders against.
#[derive(Debug, Clone, Default)]
pub struct GuardrailState {
    pub current_pos: f64,
    pub last_flip_ts: Option<DateTime<Utc>>,
    pub intraday_pnl: f64,
    pub last_spread_bp: Option<f64>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GuardrailConfig {
    pub max_spread_bp: f64,
    pub max_position: f64,
    pub cooldown_ms: i64,
    pub latency_ms_limit: f64,
    pub max_drawdown: f64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_spread_bp: 50.0,
            max_position: 100.0,
            cooldown_ms: 5_000,
            latency_ms_limit: 1_000.0,
            max_drawdown: 5_000.0,
        }
    }
}

/// Evaluates orders against accumulated per-symbol risk state.
///
/// `KILL` is not checked here — a global trading-disabled switch is the
/// broker's own first check before it ever calls `evaluate`.
pub struct GuardrailEngine {
    cfg: GuardrailConfig,
    state_by_symbol: HashMap<String, GuardrailState>,
}

impl GuardrailEngine {
    pub fn new(cfg: GuardrailConfig) -> Self {
        Self {
            cfg,
            state_by_symbol: HashMap::new(),
        }
    }

    fn state_mut(&mut self, symbol: &str) -> &mut GuardrailState {
        self.state_by_symbol.entry(symbol.to_string()).or_default()
    }

    pub fn state(&self, symbol: &str) -> Option<&GuardrailState> {
        self.state_by_symbol.get(symbol)
    }

    /// Returns the first violated rule, in fixed order
    /// `SPREAD, POS, COOLDOWN, LATENCY, DD`, or `None` to accept.
    pub fn evaluate(&mut self, symbol: &str, order: &OrderRequest) -> Option<GuardrailRule> {
        let now = Utc::now();
        let state = self.state_mut(symbol);

        if let Some(spread) = state.last_spread_bp {
            if spread > self.cfg.max_spread_bp {
                return Some(GuardrailRule::Spread);
            }
        }

        let proposed = state.current_pos + order.side.signed(order.qty);
        if proposed.abs() > self.cfg.max_position {
            return Some(GuardrailRule::Position);
        }

        if let Some(last_flip) = state.last_flip_ts {
            let delta_ms = (now - last_flip).num_milliseconds();
            if delta_ms < self.cfg.cooldown_ms {
                return Some(GuardrailRule::Cooldown);
            }
        }

        if state.latency_ms > self.cfg.latency_ms_limit {
            return Some(GuardrailRule::Latency);
        }

        if state.intraday_pnl < -self.cfg.max_drawdown {
            return Some(GuardrailRule::Drawdown);
        }

        None
    }

    /// Human-readable reason text embedding the offending state, matching
    /// `broker/guardrails.py::_reason_text`.
    pub fn reason_text(&self, rule: GuardrailRule, symbol: &str) -> String {
        let state = self.state_by_symbol.get(symbol);
        match rule {
            GuardrailRule::Spread => match state.and_then(|s| s.last_spread_bp) {
                Some(spread) => format!("Spread {spread:.2}bp exceeds limit"),
                None => "Spread exceeds limit".to_string(),
            },
            GuardrailRule::Position => {
                let current = state.map(|s| s.current_pos).unwrap_or(0.0);
                format!("Position limit hit (current {current})")
            }
            GuardrailRule::Cooldown => "Cooldown in effect".to_string(),
            GuardrailRule::Latency => "Latency above limit".to_string(),
            GuardrailRule::Drawdown => "Drawdown limit breached".to_string(),
            GuardrailRule::Kill => "Trading disabled".to_string(),
        }
    }

    pub fn update_spread(&mut self, symbol: &str, spread_bp: f64) {
        self.state_mut(symbol).last_spread_bp = Some(spread_bp);
    }

    /// Records the new signed position and, if it crossed or touched
    /// zero, stamps `last_flip_ts` for the cooldown rule.
    pub fn update_position(&mut self, symbol: &str, qty: f64, _avg_px: f64) {
        let now = Utc::now();
        let state = self.state_mut(symbol);
        let prev = state.current_pos;
        state.current_pos = qty;
        let flipped = prev == 0.0 || qty == 0.0 || (prev > 0.0 && qty < 0.0) || (prev < 0.0 && qty > 0.0);
        if flipped {
            state.last_flip_ts = Some(now);
        }
    }

    pub fn update_latency(&mut self, symbol: &str, latency_ms: f64) {
        self.state_mut(symbol).latency_ms = latency_ms;
    }

    pub fn update_pnl(&mut self, symbol: &str, intraday_pnl: f64) {
        self.state_mut(symbol).intraday_pnl = intraday_pnl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderType;

    fn order(side: Side, qty: f64) -> OrderRequest {
        OrderRequest {
            side,
            qty,
            order_type: OrderType::Mkt,
            price: None,
            tif: None,
        }
    }

    #[test]
    fn accepts_with_no_state() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        assert_eq!(e.evaluate("AAPL", &order(Side::Buy, 1.0)), None);
    }

    #[test]
    fn spread_blocks_before_anything_else() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_spread("AAPL", 80.0);
        assert_eq!(
            e.evaluate("AAPL", &order(Side::Buy, 1.0)),
            Some(GuardrailRule::Spread)
        );
    }

    #[test]
    fn position_limit_blocks() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_position("AAPL", 99.0, 100.0);
        assert_eq!(
            e.evaluate("AAPL", &order(Side::Buy, 5.0)),
            Some(GuardrailRule::Position)
        );
    }

    #[test]
    fn cooldown_blocks_immediately_after_a_flip() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_position("AAPL", 1.0, 100.0);
        assert_eq!(
            e.evaluate("AAPL", &order(Side::Buy, 1.0)),
            Some(GuardrailRule::Cooldown)
        );
    }

    #[test]
    fn latency_blocks() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_latency("AAPL", 5_000.0);
        assert_eq!(
            e.evaluate("AAPL", &order(Side::Buy, 1.0)),
            Some(GuardrailRule::Latency)
        );
    }

    #[test]
    fn drawdown_blocks() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_pnl("AAPL", -10_000.0);
        assert_eq!(
            e.evaluate("AAPL", &order(Side::Buy, 1.0)),
            Some(GuardrailRule::Drawdown)
        );
    }

    #[test]
    fn reason_text_embeds_state() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_spread("AAPL", 40.0);
        assert_eq!(
            e.reason_text(GuardrailRule::Spread, "AAPL"),
            "Spread 40.00bp exceeds limit"
        );
    }

    #[test]
    fn symbols_are_isolated() {
        let mut e = GuardrailEngine::new(GuardrailConfig::default());
        e.update_spread("AAPL", 80.0);
        assert_eq!(e.evaluate("MSFT", &order(Side::Buy, 1.0)), None);
    }
}
