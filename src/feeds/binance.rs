use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::market::board::PriceBoard;
use crate::math::rounding::decimal_field;
use crate::types::{FeedEvent, L2Book, Level, Venue};

/// CEX market-data feed: top-20 partial depth at 100ms. Writes the
/// board and emits a CexDepth event per accepted tick; the CEX tick
/// is the authoritative price and carries the decision role.
pub async fn cex_depth_feed(
    ws_url: String,
    board: Arc<PriceBoard>,
    feed_tx: mpsc::Sender<FeedEvent>,
) {
    let mut backoff_ms: u64 = 1000;

    loop {
        eprintln!("[CEX-MD] Connecting to {}", ws_url);
        let ws = match connect_async(&ws_url).await {
            Ok((ws, _)) => {
                eprintln!("[CEX-MD] Connected");
                backoff_ms = 1000;
                ws
            }
            Err(e) => {
                eprintln!("[CEX-MD] Connect failed: {}, retrying in {}ms", e, backoff_ms);
                tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(10_000);
                continue;
            }
        };

        let (mut _write, mut read) = ws.split();

        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("[CEX-MD] WS error: {}, reconnecting", e);
                    break;
                }
            };

            if let Message::Text(text) = msg {
                let Some(book) = parse_depth(&text) else {
                    continue;
                };
                // Crossed or one-sided books are dropped here.
                let Some((bid, ask)) = book.top() else {
                    continue;
                };
                board.update(Venue::Cex, bid, ask);
                if feed_tx.send(FeedEvent::CexDepth).await.is_err() {
                    eprintln!("[CEX-MD] Channel closed, exiting");
                    return;
                }
            }
        }

        eprintln!("[CEX-MD] Disconnected, reconnecting in {}ms", backoff_ms);
        tokio::time::sleep(tokio::time::Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(10_000);
    }
}

/// Parse a partial-depth payload into an L2Book. Futures streams use
/// short keys (`b`/`a`, event time `E`); spot-style payloads spell out
/// `bids`/`asks`. Levels arrive as `[price, qty]` string pairs.
fn parse_depth(text: &str) -> Option<L2Book> {
    let v: serde_json::Value = serde_json::from_str(text).ok()?;

    let parse_side = |value: &serde_json::Value| -> Vec<Level> {
        value
            .as_array()
            .map(|levels| {
                levels
                    .iter()
                    .filter_map(|level| {
                        let pair = level.as_array()?;
                        Some(Level {
                            price: decimal_field(pair.first()?)?,
                            size: decimal_field(pair.get(1)?)?,
                            orders: 1,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let bids = parse_side(v.get("b").or_else(|| v.get("bids"))?);
    let asks = parse_side(v.get("a").or_else(|| v.get("asks"))?);
    if bids.is_empty() && asks.is_empty() {
        return None;
    }

    let event_time_ms = v
        .get("E")
        .or_else(|| v.get("T"))
        .and_then(|t| t.as_i64())
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

    Some(L2Book {
        venue: Venue::Cex,
        bids,
        asks,
        event_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Scenario: a futures partial-depth frame with short keys and
    /// string-pair levels.
    /// Expected: top() yields the first bid/ask and the event time is
    /// taken from E.
    #[test]
    fn test_parse_futures_depth_frame() {
        let text = r#"{"e":"depthUpdate","E":1700000000123,"s":"BTCUSDT",
            "b":[["59999.90","1.250"],["59999.50","0.400"]],
            "a":[["60000.10","0.800"],["60000.60","2.000"]]}"#;
        let book = parse_depth(text).unwrap();
        assert_eq!(book.event_time_ms, 1700000000123);
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.top(), Some((dec!(59999.90), dec!(60000.10))));
    }

    /// Scenario: a spot-style snapshot spelling out bids/asks.
    /// Expected: parsed through the same path.
    #[test]
    fn test_parse_spot_style_depth_frame() {
        let text = r#"{"lastUpdateId":160,
            "bids":[["59999.00","0.1"]],"asks":[["60001.00","0.2"]]}"#;
        let book = parse_depth(text).unwrap();
        assert_eq!(book.top(), Some((dec!(59999.00), dec!(60001.00))));
    }

    /// Scenario: a crossed frame (bid >= ask), which venues emit during
    /// auction transitions.
    /// Expected: parsed, but top() refuses it so no board write happens.
    #[test]
    fn test_crossed_book_dropped() {
        let text = r#"{"E":1,"b":[["60001.00","1"]],"a":[["60000.00","1"]]}"#;
        let book = parse_depth(text).unwrap();
        assert_eq!(book.top(), None);
    }

    /// Scenario: a one-sided frame with no asks.
    /// Expected: top() is None.
    #[test]
    fn test_one_sided_book_dropped() {
        let text = r#"{"E":1,"b":[["60000.00","1"]],"a":[]}"#;
        let book = parse_depth(text).unwrap();
        assert_eq!(book.top(), None);
    }

    /// Scenario: an unrelated frame (subscription ack).
    /// Expected: parse_depth returns None.
    #[test]
    fn test_non_depth_frame_ignored() {
        assert!(parse_depth(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_depth("not json").is_none());
    }
}
