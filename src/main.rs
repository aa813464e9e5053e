//! tapeline-core: wires the blotter, broker, shadow, algo, screener, and
//! universe services onto one shared event bus and runs them to
//! completion.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use tapeline_core::algo::policy::SimplePolicy;
use tapeline_core::algo::AlgoService;
use tapeline_core::blotter::feed::{Feed, SimFeed, WsFeed};
use tapeline_core::blotter::BlotterService;
use tapeline_core::broker::BrokerService;
use tapeline_core::config::{AppConfig, Cli};
use tapeline_core::logging::init_tracing;
use tapeline_core::screener::ScreenerService;
use tapeline_core::shadow::ShadowService;
use tapeline_core::universe::UniverseService;
use tapeline_core::EventBus;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();
    if let Some(path) = &cli.config {
        config.apply_toml_overlay(path);
    }
    config.apply_cli(&cli);

    info!("tapeline-core starting");

    let bus = Arc::new(EventBus::new());

    let broker = BrokerService::new(config.broker.clone(), config.guardrails, bus.clone());
    let blotter = BlotterService::new(config.blotter.clone(), bus.clone());
    let shadow = ShadowService::new(config.shadow.clone(), bus.clone());
    let screener = ScreenerService::new(config.screener.clone(), bus.clone());
    let universe = UniverseService::new(config.universe.clone(), bus.clone());
    let algo = AlgoService::new(
        config.algo.clone(),
        bus.clone(),
        broker.clone(),
        Arc::new(config.inference_client()),
        Box::new(SimplePolicy::new(config.policy)),
    );

    // Subscriptions unsubscribe on drop; keep them alive for the process
    // lifetime rather than threading guards through every task.
    let mut subscriptions = shadow.subscribe();
    let (universe_screener_sub, universe_positions_sub) = universe.subscribe();
    subscriptions.push(universe_screener_sub);
    subscriptions.push(universe_positions_sub);
    subscriptions.extend(algo.subscribe());
    subscriptions.push(screener.subscribe());

    let broker_task = tokio::spawn({
        let broker = broker.clone();
        async move { broker.run().await }
    });
    let algo_task = tokio::spawn({
        let algo = algo.clone();
        async move { algo.run().await }
    });
    let screener_task = tokio::spawn({
        let screener = screener.clone();
        async move { screener.run().await }
    });

    let (feed, feed_rx): (Box<dyn Feed>, _) = match std::env::var("TAPELINE_FEED_URL") {
        Ok(url) => {
            let (feed, rx) = WsFeed::new(url);
            (Box::new(feed), rx)
        }
        Err(_) => {
            info!("TAPELINE_FEED_URL unset; running against an idle simulated feed");
            let (feed, rx) = SimFeed::new();
            (Box::new(feed), rx)
        }
    };

    let blotter_result = blotter.run(feed, feed_rx).await;

    broker_task.abort();
    algo_task.abort();
    screener_task.abort();
    drop(subscriptions);

    if let Err(err) = blotter_result {
        error!(%err, "blotter exited with an error");
        return Err(err);
    }

    info!("tapeline-core shutting down");
    Ok(())
}
