use std::sync::Arc;

use tokio::sync::mpsc;

use pincer::config::Config;
use pincer::engine::machine::StrategyStateMachine;
use pincer::engine::reconcile::reconcile;
use pincer::engine::runner::run_engine;
use pincer::engine::tick::tick_loop;
use pincer::feeds::binance::cex_depth_feed;
use pincer::feeds::binance_user::cex_user_feed;
use pincer::feeds::hyperliquid::dex_feed;
use pincer::gateway::binance::BinanceFutures;
use pincer::gateway::client::VenueClient;
use pincer::gateway::hyperliquid::Hyperliquid;
use pincer::market::board::{FeeSchedule, PriceBoard};
use pincer::types::FeedEvent;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env();
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("http client");

    eprintln!("╔══════════════════════════════════════════════════╗");
    eprintln!("║  Pincer {} / {} execution engine", config.cex_symbol, config.dex_symbol);
    eprintln!("║  Base qty: {} | Spread threshold: {}", config.base_quantity, config.min_spread_threshold);
    eprintln!("║  Order timeout: {}s | Chase retries: {} | Max delay: {}s",
        config.order_timeout_sec, config.max_chase_retries, config.max_delay_sec);
    eprintln!("╚══════════════════════════════════════════════════╝");

    // ── Venue adapters ──
    let cex: Arc<dyn VenueClient> = Arc::new(BinanceFutures::new(&config, http.clone()));
    let dex: Arc<dyn VenueClient> = match Hyperliquid::connect(&config, http.clone()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("[MAIN] DEX adapter init failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Startup reconciliation: decide the initial state or refuse ──
    let initial = match reconcile(cex.as_ref(), dex.as_ref()).await {
        Ok(initial) => initial,
        Err(e) => {
            eprintln!("[MAIN] {}", e);
            std::process::exit(1);
        }
    };

    let board = Arc::new(PriceBoard::new(
        FeeSchedule {
            cex_maker: config.cex_maker_fee,
            cex_taker: config.cex_taker_fee,
            dex_maker: config.dex_maker_fee,
            dex_taker: config.dex_taker_fee,
        },
        config.max_delay_ms(),
        config.min_spread_threshold,
    ));

    let mut machine = StrategyStateMachine::new(
        &config,
        Arc::clone(&board),
        Arc::clone(&cex),
        Arc::clone(&dex),
    );
    machine.restore(initial.state, initial.position);
    eprintln!(
        "[MAIN] Starting in {:?} with position {}",
        initial.state, initial.position
    );

    // ── Producers: market feeds, user streams, timeout ticker ──
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(4096);

    let md_handle = tokio::spawn(cex_depth_feed(
        config.cex_depth_stream_url(),
        Arc::clone(&board),
        feed_tx.clone(),
    ));
    let us_handle = tokio::spawn(cex_user_feed(
        config.clone(),
        http.clone(),
        feed_tx.clone(),
    ));
    let hl_handle = tokio::spawn(dex_feed(
        config.dex_ws_url.clone(),
        config.dex_symbol.clone(),
        config.dex_wallet.clone(),
        Arc::clone(&board),
        feed_tx.clone(),
    ));
    let tick_handle = tokio::spawn(tick_loop(feed_tx.clone()));

    // Engine's feed_rx closes once all producers stop.
    drop(feed_tx);

    tokio::select! {
        _ = run_engine(machine, Arc::clone(&board), feed_rx) => {
            eprintln!("[MAIN] Engine loop ended");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("[MAIN] Shutdown signal received");
        }
    }

    md_handle.abort();
    us_handle.abort();
    hl_handle.abort();
    tick_handle.abort();
    eprintln!("[MAIN] Stopped");
}
