//! Domain error types.
//!
//! Anything a caller is expected to match on gets a `thiserror` variant;
//! everything else (service wiring, file I/O at the boundaries) stays in
//! `anyhow::Result` and is logged and suppressed at its subsystem boundary
//! per the error taxonomy in SPEC_FULL.md §7.

use thiserror::Error;

use crate::broker::guardrails::GuardrailRule;

/// Failure modes for `Broker::place`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("order blocked by {rule:?}: {reason}")]
    GuardrailBlocked {
        rule: GuardrailRule,
        reason: String,
    },

    #[error("trading disabled")]
    TradingDisabled,

    #[error("broker stopping")]
    BrokerStopping,

    #[error("feed error: {0}")]
    Feed(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
