use tokio::sync::mpsc;

use crate::types::FeedEvent;

/// 1 Hz driver for the machine's timeout sweep. Pure producer; exits
/// when the engine loop drops its receiver.
pub async fn tick_loop(feed_tx: mpsc::Sender<FeedEvent>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        interval.tick().await;
        if feed_tx.send(FeedEvent::Tick).await.is_err() {
            break;
        }
    }
}
