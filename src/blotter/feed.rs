//! The feed seam: the external brokerage gateway is out of scope
//! (SPEC_FULL.md §1), so the blotter only needs a trait to drive it and a
//! concrete feed or two to demonstrate the threading contract in §9
//! ("the feed library likely invokes callbacks on its own thread").

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::symbols::SymbolSpec;

/// One raw top-of-book update as the feed reports it, before any feature
/// computation. `bids`/`asks` are full depth as reported; the blotter
/// truncates to the top few levels itself.
#[derive(Debug, Clone)]
pub struct RawBookUpdate {
    pub symbol: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
    pub last_trade: Option<(f64, f64)>,
}

/// A feed adapter: connects, accepts a desired symbol set, and forwards raw
/// updates to whoever is driving it. Real implementations marshal their own
/// callback thread's updates onto an async channel; `start` must not return
/// until that marshaling is wired up.
#[async_trait]
pub trait Feed: Send + Sync {
    async fn start(&mut self) -> anyhow::Result<()>;
    async fn update_symbols(&mut self, symbols: &[SymbolSpec]) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
}

/// In-process feed used by tests and local replay: updates are pushed
/// directly rather than arriving over a socket.
pub struct SimFeed {
    tx: mpsc::UnboundedSender<RawBookUpdate>,
    subscribed: Vec<String>,
}

impl SimFeed {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RawBookUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                subscribed: Vec::new(),
            },
            rx,
        )
    }

    /// Test/replay hook: push an update as if it arrived from the wire.
    /// Silently dropped if the symbol isn't currently subscribed, mirroring
    /// a real feed that would never deliver updates for unsubscribed
    /// symbols.
    pub fn push(&self, update: RawBookUpdate) {
        if self.subscribed.iter().any(|s| s == &update.symbol) {
            let _ = self.tx.send(update);
        }
    }
}

#[async_trait]
impl Feed for SimFeed {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn update_symbols(&mut self, symbols: &[SymbolSpec]) -> anyhow::Result<()> {
        self.subscribed = symbols.iter().map(|s| s.symbol.clone()).collect();
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.subscribed.clear();
        Ok(())
    }
}

/// Websocket feed: owns a dedicated reader thread the way
/// `src/edge/receiver.rs` owns its Binance socket thread, forwarding parsed
/// updates back to the async side over an `mpsc` channel rather than
/// mutating shared state directly from the feed thread.
pub struct WsFeed {
    url: String,
    handle: Option<std::thread::JoinHandle<()>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    tx: mpsc::UnboundedSender<RawBookUpdate>,
}

impl WsFeed {
    pub fn new(url: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<RawBookUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                url: url.into(),
                handle: None,
                shutdown: None,
                tx,
            },
            rx,
        )
    }
}

#[async_trait]
impl Feed for WsFeed {
    async fn start(&mut self) -> anyhow::Result<()> {
        let url = self.url.clone();
        let tx = self.tx.clone();
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown = Some(shutdown_tx);

        // Connectivity is proven once, up front, on the calling task so a
        // bad URL fails `start()` fatally per §4.3's "feed-connect failure
        // is fatal" rule; the reader thread then owns the live socket.
        let (ws, _resp) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|err| anyhow::anyhow!("feed connect failed: {err}"))?;

        let handle = std::thread::Builder::new()
            .name("blotter-ws-feed".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(err) => {
                        error!(%err, "failed to build feed thread runtime");
                        return;
                    }
                };
                rt.block_on(async move {
                    use futures_util::StreamExt;
                    let mut ws = ws;
                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => {
                                info!("feed thread shutting down");
                                break;
                            }
                            msg = ws.next() => {
                                match msg {
                                    Some(Ok(tokio_tungstenite::tungstenite::Message::Text(text))) => {
                                        match parse_update(&text) {
                                            Ok(update) => {
                                                if tx.send(update).is_err() {
                                                    break;
                                                }
                                            }
                                            Err(err) => warn!(%err, "dropping unparseable feed message"),
                                        }
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(err)) => {
                                        error!(%err, "feed socket error");
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                });
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    async fn update_symbols(&mut self, _symbols: &[SymbolSpec]) -> anyhow::Result<()> {
        // The concrete subscribe/unsubscribe wire protocol belongs to the
        // real brokerage gateway, out of scope here (SPEC_FULL §1); the
        // symbol-diffing logic that calls this lives in `BlotterService`.
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn parse_update(text: &str) -> anyhow::Result<RawBookUpdate> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let symbol = value
        .get("symbol")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing symbol"))?
        .to_string();
    let best_bid = value.get("bid").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let best_ask = value.get("ask").and_then(|v| v.as_f64()).unwrap_or(0.0);
    Ok(RawBookUpdate {
        symbol,
        best_bid,
        best_ask,
        bids: vec![(best_bid, value.get("bidSize").and_then(|v| v.as_f64()).unwrap_or(0.0))],
        asks: vec![(best_ask, value.get("askSize").and_then(|v| v.as_f64()).unwrap_or(0.0))],
        last_trade: None,
    })
}
