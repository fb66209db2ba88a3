use futures_util::StreamExt;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::Config;
use crate::engine::events::normalize_cex_status;
use crate::math::rounding::decimal_field;
use crate::types::{FeedEvent, OrderUpdate, Venue};

/// The venue invalidates listen keys after 60 minutes idle; ping at
/// half that.
const KEEPALIVE_SECS: u64 = 30 * 60;

/// CEX user-data stream: acquires a listen key, connects the dedicated
/// WS, keeps the key alive, and forwards terminal order events. A fresh
/// key is acquired on every reconnect, which also covers expiry.
pub async fn cex_user_feed(
    config: Config,
    http: reqwest::Client,
    feed_tx: mpsc::Sender<FeedEvent>,
) {
    let mut backoff_ms: u64 = 1000;

    loop {
        let listen_key = match acquire_listen_key(&config, &http).await {
            Ok(key) => {
                backoff_ms = 1000;
                key
            }
            Err(e) => {
                eprintln!("[CEX-US] listenKey failed: {}, retrying in {}ms", e, backoff_ms);
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let url = config.cex_user_stream_url(&listen_key);
        eprintln!("[CEX-US] Connecting user stream");
        let ws = match connect_async(&url).await {
            Ok((ws, _)) => {
                eprintln!("[CEX-US] Connected");
                ws
            }
            Err(e) => {
                eprintln!("[CEX-US] Connect failed: {}, retrying in {}ms", e, backoff_ms);
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut _write, mut read) = ws.split();
        let mut keepalive =
            tokio::time::interval(tokio::time::Duration::from_secs(KEEPALIVE_SECS));
        keepalive.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            eprintln!("[CEX-US] WS error: {}, reconnecting", e);
                            break;
                        }
                        None => {
                            eprintln!("[CEX-US] Stream ended, reconnecting");
                            break;
                        }
                    };
                    if let Message::Text(text) = msg {
                        if let Some(update) = parse_order_update(&text) {
                            if feed_tx.send(FeedEvent::OrderUpdate(update)).await.is_err() {
                                eprintln!("[CEX-US] Channel closed, exiting");
                                return;
                            }
                        }
                    }
                }
                _ = keepalive.tick() => {
                    let url = format!("{}/fapi/v1/listenKey", config.cex_api_url);
                    if let Err(e) = http
                        .put(&url)
                        .header("X-MBX-APIKEY", &config.cex_api_key)
                        .send()
                        .await
                    {
                        eprintln!("[CEX-US] Keepalive failed: {}", e);
                    }
                }
            }
        }

        eprintln!("[CEX-US] Disconnected, reconnecting in {}ms", backoff_ms);
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

async fn acquire_listen_key(
    config: &Config,
    http: &reqwest::Client,
) -> Result<String, String> {
    let url = format!("{}/fapi/v1/listenKey", config.cex_api_url);
    let resp = http
        .post(&url)
        .header("X-MBX-APIKEY", &config.cex_api_key)
        .send()
        .await
        .map_err(|e| e.to_string())?;
    let body: serde_json::Value = resp.json().await.map_err(|e| e.to_string())?;
    body.get("listenKey")
        .and_then(|k| k.as_str())
        .map(|k| k.to_string())
        .ok_or_else(|| format!("no listenKey in {}", body))
}

/// Fold an ORDER_TRADE_UPDATE frame into a normalized event. Non-order
/// frames and progress statuses return None.
fn parse_order_update(text: &str) -> Option<OrderUpdate> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;
    if v.get("e").and_then(|e| e.as_str()) != Some("ORDER_TRADE_UPDATE") {
        return None;
    }
    let order = v.get("o")?;
    let order_id = match order.get("i") {
        Some(id) if id.is_i64() || id.is_u64() => id.to_string(),
        Some(id) => id.as_str()?.to_string(),
        None => return None,
    };
    let status = order.get("X").and_then(|s| s.as_str())?;
    let cum = order
        .get("z")
        .and_then(decimal_field)
        .unwrap_or(Decimal::ZERO);

    let event = normalize_cex_status(status, cum)?;
    Some(OrderUpdate {
        venue: Venue::Cex,
        order_id,
        event,
    })
}
