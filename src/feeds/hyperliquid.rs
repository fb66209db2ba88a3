use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::engine::events::normalize_dex_status;
use crate::market::board::PriceBoard;
use crate::math::rounding::decimal_field;
use crate::types::{FeedEvent, L2Book, Level, OrderUpdate, Venue};

/// DEX unified feed: one socket carries both the l2Book channel and the
/// wallet's orderUpdates. Book updates only refresh the board; the DEX
/// side never triggers signal evaluation, so a tick from either venue
/// is not double-counted.
pub async fn dex_feed(
    ws_url: String,
    coin: String,
    wallet: String,
    board: Arc<PriceBoard>,
    feed_tx: mpsc::Sender<FeedEvent>,
) {
    let mut backoff_ms: u64 = 1000;

    loop {
        eprintln!("[HL-WS] Connecting to {}", ws_url);
        let ws = match connect_async(&ws_url).await {
            Ok((ws, _)) => {
                eprintln!("[HL-WS] Connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                eprintln!("[HL-WS] Connect failed: {}, retrying in {}ms", e, backoff_ms);
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut write, mut read) = ws.split();

        let book_sub = serde_json::json!({
            "method": "subscribe",
            "subscription": {"type": "l2Book", "coin": coin}
        });
        let orders_sub = serde_json::json!({
            "method": "subscribe",
            "subscription": {"type": "orderUpdates", "user": wallet}
        });
        let mut subscribed = true;
        for sub in [&book_sub, &orders_sub] {
            if let Err(e) = write.send(Message::Text(sub.to_string())).await {
                eprintln!("[HL-WS] Subscribe failed: {}, reconnecting", e);
                subscribed = false;
                break;
            }
        }
        if !subscribed {
            continue;
        }
        eprintln!("[HL-WS] Subscribed to l2Book {} + orderUpdates", coin);

        // The venue drops connections idle for 60s; ping well inside that.
        let mut ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(45));
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            eprintln!("[HL-WS] WS error: {}, reconnecting", e);
                            break;
                        }
                        None => {
                            eprintln!("[HL-WS] Stream ended, reconnecting");
                            break;
                        }
                    };

                    if let Message::Text(text) = msg {
                        let Ok(v) = serde_json::from_str::<serde_json::Value>(&text) else {
                            continue;
                        };
                        match v.get("channel").and_then(|c| c.as_str()) {
                            Some("l2Book") => {
                                if let Some(book) = parse_l2book(&v) {
                                    if let Some((bid, ask)) = book.top() {
                                        board.update(Venue::Dex, bid, ask);
                                    }
                                }
                            }
                            Some("orderUpdates") => {
                                for update in parse_order_updates(&v) {
                                    if feed_tx.send(FeedEvent::OrderUpdate(update)).await.is_err() {
                                        eprintln!("[HL-WS] Channel closed, exiting");
                                        return;
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    let ping = serde_json::json!({"method": "ping"});
                    let _ = write.send(Message::Text(ping.to_string())).await;
                }
            }
        }

        eprintln!("[HL-WS] Disconnected, reconnecting in {}ms", backoff_ms);
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

/// Parse an l2Book frame: `data.levels = [bids, asks]`, each level
/// `{px, sz, n}`.
fn parse_l2book(v: &serde_json::Value) -> Option<L2Book> {
    let data = v.get("data")?;
    let levels = data.get("levels")?.as_array()?;

    let parse_side = |side: Option<&serde_json::Value>| -> Vec<Level> {
        side.and_then(|s| s.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        Some(Level {
                            price: decimal_field(entry.get("px")?)?,
                            size: decimal_field(entry.get("sz")?)?,
                            orders: entry
                                .get("n")
                                .and_then(|n| n.as_u64())
                                .unwrap_or(1) as u32,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let bids = parse_side(levels.first());
    let asks = parse_side(levels.get(1));
    if bids.is_empty() && asks.is_empty() {
        return None;
    }

    Some(L2Book {
        venue: Venue::Dex,
        bids,
        asks,
        event_time_ms: data
            .get("time")
            .and_then(|t| t.as_i64())
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    })
}

/// Fold an orderUpdates frame into normalized events. Update items
/// carry `{oid, status, cumSz, sz}`, with oid sometimes nested under
/// `order`; both spellings are accepted.
fn parse_order_updates(v: &serde_json::Value) -> Vec<OrderUpdate> {
    let Some(items) = v.get("data").and_then(|d| d.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let oid = item
                .get("oid")
                .or_else(|| item.pointer("/order/oid"))
                .filter(|o| o.is_u64() || o.is_i64())?
                .to_string();
            let status = item.get("status").and_then(|s| s.as_str())?;
            let cum = item
                .get("cumSz")
                .or_else(|| item.pointer("/order/cumSz"))
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);
            let sz = item
                .get("sz")
                .or_else(|| item.pointer("/order/sz"))
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);

            let event = normalize_dex_status(status, cum, sz)?;
            Some(OrderUpdate {
                venue: Venue::Dex,
                order_id: oid,
                event,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderEvent;
    use rust_decimal_macros::dec;

    /// Scenario: a normal l2Book frame with both sides populated.
    /// Expected: top() yields {px} of the first bid and ask levels and
    /// the orders count comes from n.
    #[test]
    fn test_parse_l2book_frame() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"channel":"l2Book","data":{"coin":"BTC","time":1700000000500,
                "levels":[
                    [{"px":"60100.0","sz":"0.5","n":3},{"px":"60099.0","sz":"1.1","n":2}],
                    [{"px":"60101.0","sz":"0.7","n":4}]
                ]}}"#,
        )
        .unwrap();
        let book = parse_l2book(&v).unwrap();
        assert_eq!(book.event_time_ms, 1700000000500);
        assert_eq!(book.bids[0].orders, 3);
        assert_eq!(book.top(), Some((dec!(60100.0), dec!(60101.0))));
    }

    /// Scenario: an l2Book frame where the ask side is missing.
    /// Expected: parsed but top() is None, so the board is untouched.
    #[test]
    fn test_parse_l2book_one_sided() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"channel":"l2Book","data":{"coin":"BTC",
                "levels":[[{"px":"60100.0","sz":"0.5","n":1}],[]]}}"#,
        )
        .unwrap();
        let book = parse_l2book(&v).unwrap();
        assert_eq!(book.top(), None);
    }

    /// Scenario: orderUpdates with a complete fill (cumSz == sz), a
    /// resting "open" report, and a zero-fill cancel.
    /// Expected: AllFilled and AllCanceled events; the open report is
    /// swallowed.
    #[test]
    fn test_parse_order_updates_mixed() {
        let v: serde_json::Value = serde_json::from_str(
            r#"{"channel":"orderUpdates","data":[
                {"oid":77738308,"status":"filled","cumSz":"0.001","sz":"0.001"},
                {"oid":77738309,"status":"open","cumSz":"0","sz":"0.002"},
                {"oid":77738310,"status":"canceled","cumSz":"0","sz":"0.003"}
            ]}"#,
        )
        .unwrap();
        let updates = parse_order_updates(&v);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].order_id, "77738308");
        assert_eq!(updates[0].event, OrderEvent::AllFilled(dec!(0.001)));
        assert_eq!(updates[1].order_id, "77738310");
        assert_eq!(updates[1].event, OrderEvent::AllCanceled);
    }

    /// Scenario: a partial fill reported as "filled" with cumSz < sz,
    /// and the oid nested under order.
    /// Expected: the progress report is swallowed; a later canceled
    /// report with the partial cum surfaces as PartialFilledCanceled.
    #[test]
    fn test_parse_order_updates_partial_progress_then_cancel() {
        let progress: serde_json::Value = serde_json::from_str(
            r#"{"channel":"orderUpdates","data":[
                {"order":{"oid":77738311,"cumSz":"0.0004","sz":"0.001"},"status":"filled"}
            ]}"#,
        )
        .unwrap();
        assert!(parse_order_updates(&progress).is_empty());

        let canceled: serde_json::Value = serde_json::from_str(
            r#"{"channel":"orderUpdates","data":[
                {"order":{"oid":77738311,"cumSz":"0.0004","sz":"0.001"},"status":"canceled"}
            ]}"#,
        )
        .unwrap();
        let updates = parse_order_updates(&canceled);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].order_id, "77738311");
        assert_eq!(
            updates[0].event,
            OrderEvent::PartialFilledCanceled(dec!(0.0004))
        );
    }

    /// Scenario: frames from other channels (pong, subscription ack).
    /// Expected: no events.
    #[test]
    fn test_parse_order_updates_foreign_frames() {
        let v: serde_json::Value =
            serde_json::from_str(r#"{"channel":"pong"}"#).unwrap();
        assert!(parse_order_updates(&v).is_empty());
    }
}
