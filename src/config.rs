//! Aggregates every service's config into one `AppConfig`, loaded the way
//! the teacher's `Config::from_env` loads its settings: `dotenv` first,
//! then `env::var` with documented fallbacks, then an optional TOML
//! overlay, then CLI flags — each layer only overriding what it sets.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::warn;

use crate::algo::inference::HttpInferenceClient;
use crate::algo::policy::PolicyConfig;
use crate::algo::AlgoConfig;
use crate::blotter::symbols::SymbolSpec;
use crate::blotter::BlotterConfig;
use crate::broker::guardrails::GuardrailConfig;
use crate::broker::BrokerConfig;
use crate::screener::ScreenerConfig;
use crate::shadow::ShadowConfig;
use crate::universe::UniverseConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub blotter: BlotterConfig,
    pub broker: BrokerConfig,
    pub guardrails: GuardrailConfig,
    pub shadow: ShadowConfig,
    pub algo: AlgoConfig,
    pub policy: PolicyConfig,
    pub screener: ScreenerConfig,
    pub universe: UniverseConfig,
    pub hmm_url: String,
    pub sessions_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            blotter: BlotterConfig::default(),
            broker: BrokerConfig::default(),
            guardrails: GuardrailConfig::default(),
            shadow: ShadowConfig::default(),
            algo: AlgoConfig::default(),
            policy: PolicyConfig::default(),
            screener: ScreenerConfig::default(),
            universe: UniverseConfig::default(),
            hmm_url: "http://127.0.0.1:8000".to_string(),
            sessions_dir: PathBuf::from("sessions"),
        }
    }
}

impl AppConfig {
    /// Loads `.env` into the process environment, then builds a config from
    /// `env::var` with the same documented-default-on-parse-failure
    /// behavior as the teacher's `Config::from_env`. Never fails: an
    /// unparseable or missing value falls back to the default and is
    /// logged at `warn`.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        if let Ok(symbols) = std::env::var("TAPELINE_SYMBOLS") {
            let specs: Vec<SymbolSpec> = symbols.split(',').map(|s| SymbolSpec::new(s.trim().to_uppercase())).collect();
            config.algo.symbols = specs.iter().map(|s| s.symbol.clone()).collect();
            config.blotter.symbols = specs;
        }

        if let Ok(raw) = std::env::var("TAPELINE_FEATURE_WINDOW") {
            match raw.parse() {
                Ok(window) => config.blotter.feature_window = window,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_FEATURE_WINDOW, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_RECORD_PATH") {
            config.blotter.record_path = Some(PathBuf::from(raw));
        }

        if let Ok(raw) = std::env::var("TAPELINE_SYMBOLS_FILE") {
            config.blotter.symbols_file = Some(PathBuf::from(raw));
        }

        if let Ok(raw) = std::env::var("TAPELINE_TRADING_ENABLED") {
            match raw.parse() {
                Ok(enabled) => config.broker.trading_enabled = enabled,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_TRADING_ENABLED, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_MAX_SPREAD_BP") {
            match raw.parse() {
                Ok(v) => config.guardrails.max_spread_bp = v,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_MAX_SPREAD_BP, keeping default"),
            }
        }
        if let Ok(raw) = std::env::var("TAPELINE_MAX_POSITION") {
            match raw.parse() {
                Ok(v) => config.guardrails.max_position = v,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_MAX_POSITION, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_SHADOW_LATENCY_MS") {
            match raw.parse() {
                Ok(v) => config.shadow.latency_ms = v,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_SHADOW_LATENCY_MS, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_HMM_URL") {
            config.hmm_url = raw;
        }

        if let Ok(raw) = std::env::var("TAPELINE_BASE_QTY") {
            match raw.parse() {
                Ok(v) => config.policy.base_qty = v,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_BASE_QTY, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_MODEL_DIR") {
            config.universe.model_dir = PathBuf::from(raw);
        }
        if let Ok(raw) = std::env::var("TAPELINE_CHURN_MINUTES") {
            match raw.parse() {
                Ok(v) => config.universe.churn_minutes = v,
                Err(_) => warn!(value = %raw, "invalid TAPELINE_CHURN_MINUTES, keeping default"),
            }
        }

        if let Ok(raw) = std::env::var("TAPELINE_SESSIONS_DIR") {
            config.sessions_dir = PathBuf::from(raw);
        }
        config.screener.state_file = Some(config.sessions_dir.join("universe-state.json"));
        config.universe.state_file = Some(config.sessions_dir.join("universe-state.json"));

        config
    }

    /// Merges a `tapeline.toml` overlay onto `self`, applied after
    /// `from_env` so the file takes precedence over plain env vars but not
    /// over CLI flags. A missing file is fine; a malformed one is logged
    /// at `warn` and ignored, matching §7's "Configuration" error class.
    pub fn apply_toml_overlay(&mut self, path: &std::path::Path) {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return,
        };
        let overlay: TomlOverlay = match toml::from_str(&raw) {
            Ok(overlay) => overlay,
            Err(err) => {
                warn!(path = %path.display(), %err, "invalid tapeline.toml, ignoring overlay");
                return;
            }
        };
        overlay.apply(self);
    }

    /// Applies CLI flags, the final and highest-precedence layer.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(symbols) = &cli.symbols {
            let specs: Vec<SymbolSpec> = symbols.split(',').map(|s| SymbolSpec::new(s.trim().to_uppercase())).collect();
            self.algo.symbols = specs.iter().map(|s| s.symbol.clone()).collect();
            self.blotter.symbols = specs;
        }
        if let Some(url) = &cli.hmm_url {
            self.hmm_url = url.clone();
        }
        if let Some(path) = &cli.record_path {
            self.blotter.record_path = Some(path.clone());
        }
        if let Some(enabled) = cli.trading_enabled {
            self.broker.trading_enabled = enabled;
        }
    }

    pub fn inference_client(&self) -> HttpInferenceClient {
        HttpInferenceClient::new(self.hmm_url.clone())
    }
}

#[derive(Debug, Deserialize, Default)]
struct TomlOverlay {
    symbols: Option<Vec<String>>,
    feature_window: Option<usize>,
    record_path: Option<PathBuf>,
    trading_enabled: Option<bool>,
    max_spread_bp: Option<f64>,
    max_position: Option<f64>,
    shadow_latency_ms: Option<i64>,
    hmm_url: Option<String>,
    base_qty: Option<f64>,
    model_dir: Option<PathBuf>,
    churn_minutes: Option<i64>,
}

impl TomlOverlay {
    fn apply(self, config: &mut AppConfig) {
        if let Some(symbols) = self.symbols {
            let specs: Vec<SymbolSpec> = symbols.iter().map(|s| SymbolSpec::new(s.to_uppercase())).collect();
            config.algo.symbols = specs.iter().map(|s| s.symbol.clone()).collect();
            config.blotter.symbols = specs;
        }
        if let Some(window) = self.feature_window {
            config.blotter.feature_window = window;
        }
        if let Some(path) = self.record_path {
            config.blotter.record_path = Some(path);
        }
        if let Some(enabled) = self.trading_enabled {
            config.broker.trading_enabled = enabled;
        }
        if let Some(v) = self.max_spread_bp {
            config.guardrails.max_spread_bp = v;
        }
        if let Some(v) = self.max_position {
            config.guardrails.max_position = v;
        }
        if let Some(v) = self.shadow_latency_ms {
            config.shadow.latency_ms = v;
        }
        if let Some(url) = self.hmm_url {
            config.hmm_url = url;
        }
        if let Some(v) = self.base_qty {
            config.policy.base_qty = v;
        }
        if let Some(dir) = self.model_dir {
            config.universe.model_dir = dir;
        }
        if let Some(v) = self.churn_minutes {
            config.universe.churn_minutes = v;
        }
    }
}

/// CLI overrides, the highest-precedence configuration layer.
#[derive(Debug, Parser)]
#[command(name = "tapeline-core", about = "Market-data and paper-trading pipeline")]
pub struct Cli {
    /// Path to a `tapeline.toml` overlay, applied before CLI flags.
    #[arg(long, env = "TAPELINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated symbol list, e.g. "AAPL,MSFT,TSLA".
    #[arg(long, env = "TAPELINE_SYMBOLS")]
    pub symbols: Option<String>,

    /// Base URL of the HMM inference service.
    #[arg(long, env = "TAPELINE_HMM_URL")]
    pub hmm_url: Option<String>,

    /// Directory to record per-symbol tick CSVs into.
    #[arg(long, env = "TAPELINE_RECORD_PATH")]
    pub record_path: Option<PathBuf>,

    /// Disable order submission without tearing down the rest of the pipeline.
    #[arg(long, env = "TAPELINE_TRADING_ENABLED")]
    pub trading_enabled: Option<bool>,
}
