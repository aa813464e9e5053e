//! Decision policy: turns inference output into an (optional) order.

use crate::models::{OrderRequest, Side};

#[derive(Debug, Clone, Copy)]
pub struct PolicyConfig {
    pub base_qty: f64,
    pub confidence_threshold: f64,
    pub force_trade: bool,
    pub alternate_sides: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            base_qty: 10.0,
            confidence_threshold: 0.55,
            force_trade: false,
            alternate_sides: true,
        }
    }
}

pub trait Policy: Send + Sync {
    fn decide(&mut self, symbol: &str, probs: &[f64], confidence: f64) -> Option<OrderRequest>;
}

/// Alternates sides deterministically under `force_trade`; otherwise trades
/// the `up - down` probability skew above a confidence floor.
pub struct SimplePolicy {
    cfg: PolicyConfig,
    last_side: Side,
}

impl SimplePolicy {
    pub fn new(cfg: PolicyConfig) -> Self {
        Self {
            cfg,
            last_side: Side::Sell,
        }
    }
}

impl Policy for SimplePolicy {
    fn decide(&mut self, _symbol: &str, probs: &[f64], confidence: f64) -> Option<OrderRequest> {
        if self.cfg.force_trade {
            let side = if self.cfg.alternate_sides && self.last_side == Side::Sell {
                Side::Buy
            } else {
                Side::Sell
            };
            self.last_side = side;
            return Some(OrderRequest::market(side, self.cfg.base_qty));
        }

        if confidence < self.cfg.confidence_threshold {
            return None;
        }
        let up = probs.get(2).copied().unwrap_or(0.0);
        let down = probs.first().copied().unwrap_or(0.0);
        if up - down > 0.05 {
            return Some(OrderRequest::market(Side::Buy, self.cfg.base_qty));
        }
        if down - up > 0.05 {
            return Some(OrderRequest::market(Side::Sell, self.cfg.base_qty));
        }
        None
    }
}
