use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::machine::{StrategyState, StrategyStateMachine};
use crate::market::board::PriceBoard;
use crate::types::FeedEvent;

const DIAG_INTERVAL_MS: i64 = 10_000;

/// Core engine event loop. Single task, exclusively owns the machine.
///
/// Every producer (CEX depth feed, both user streams, the 1 Hz ticker)
/// funnels into one channel, so signal checks, order events, and the
/// timeout sweep are serialized here. Signals are only evaluated on
/// CEX depth ticks; the DEX feed just keeps the board current.
pub async fn run_engine(
    mut machine: StrategyStateMachine,
    board: Arc<PriceBoard>,
    mut feed_rx: mpsc::Receiver<FeedEvent>,
) {
    let mut last_diag_ms: i64 = 0;

    while let Some(event) = feed_rx.recv().await {
        let now_ms = chrono::Utc::now().timestamp_millis();

        match event {
            FeedEvent::CexDepth => {
                match machine.state() {
                    StrategyState::OpenCondition => {
                        if board.open_signal_at(now_ms) {
                            let gate = Arc::clone(&board);
                            machine
                                .check_and_execute_open(move || gate.open_signal(), now_ms)
                                .await;
                        }
                    }
                    StrategyState::CloseCondition => {
                        if board.close_signal_at(now_ms) {
                            let gate = Arc::clone(&board);
                            machine
                                .check_and_execute_close(move || gate.close_signal(), now_ms)
                                .await;
                        }
                    }
                    _ => {}
                }

                if now_ms - last_diag_ms >= DIAG_INTERVAL_MS {
                    last_diag_ms = now_ms;
                    log_diagnostics(&board, &machine, now_ms);
                }
            }

            FeedEvent::OrderUpdate(update) => {
                machine
                    .on_order_update(update.venue, &update.order_id, update.event, now_ms)
                    .await;
            }

            FeedEvent::Tick => {
                machine.on_tick(now_ms).await;
            }
        }
    }

    eprintln!("[ENGINE] Feed channel closed, engine loop exiting");
}

fn log_diagnostics(board: &PriceBoard, machine: &StrategyStateMachine, now_ms: i64) {
    let (net_open, net_close) = board.get_spread_with_fees_at(now_ms);
    let fmt = |v: Option<rust_decimal::Decimal>| match v {
        Some(d) => d.round_dp(4).to_string(),
        None => "-".to_string(),
    };
    eprintln!(
        "[DIAG] state={:?} pos={} net_open={} net_close={} active={:?} chase={}",
        machine.state(),
        machine.current_position(),
        fmt(net_open),
        fmt(net_close),
        machine.active_order_id(),
        machine.chase_retry_count(),
    );
}
