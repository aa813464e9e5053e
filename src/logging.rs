//! Tracing init, grounded on the teacher's `main.rs::init_tracing`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global tracing subscriber. `RUST_LOG` wins when set; falls
/// back to `tapeline_core=info` so a default run is quiet but not silent.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "tapeline_core=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
