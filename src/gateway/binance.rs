use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sha2::Sha256;

use crate::config::Config;
use crate::gateway::client::{VenueClient, VenueError};
use crate::math::rounding::decimal_field;
use crate::types::{Balance, Position, Side};

const RECV_WINDOW_MS: u32 = 5000;

/// Binance USDT-M futures adapter. Signed REST against `/fapi`; the
/// caller gets venue order ids back as strings.
pub struct BinanceFutures {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    secret: String,
    symbol: String,
}

impl BinanceFutures {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            api_url: config.cex_api_url.clone(),
            api_key: config.cex_api_key.clone(),
            secret: config.cex_secret.clone(),
            symbol: config.cex_symbol.clone(),
        }
    }

    /// HMAC-SHA256 of the query string, hex-encoded.
    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_query(&self, params: &str) -> String {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("recvWindow={}&timestamp={}", RECV_WINDOW_MS, timestamp)
        } else {
            format!("{}&recvWindow={}&timestamp={}", params, RECV_WINDOW_MS, timestamp)
        };
        let signature = self.sign(&query);
        format!("{}&signature={}", query, signature)
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &str,
    ) -> Result<serde_json::Value, VenueError> {
        let url = format!("{}{}?{}", self.api_url, path, self.signed_query(params));
        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let body: serde_json::Value = resp.json().await?;
        if let Some(code) = body.get("code").and_then(|c| c.as_i64()) {
            if code != 0 && code != 200 {
                let msg = body
                    .get("msg")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error");
                return Err(VenueError::Api(format!("code {}: {}", code, msg)));
            }
        }
        Ok(body)
    }
}

/// Reduce a Binance order response to its order id. Absence of a
/// parseable `orderId` is a placement failure.
pub fn extract_order_id(resp: &serde_json::Value) -> Result<String, VenueError> {
    match resp.get("orderId") {
        Some(id) if id.is_i64() || id.is_u64() => Ok(id.to_string()),
        Some(id) if id.is_string() => Ok(id.as_str().unwrap_or_default().to_string()),
        _ => Err(VenueError::Parse(format!("no orderId in {}", resp))),
    }
}

#[async_trait]
impl VenueClient for BinanceFutures {
    async fn place_order(
        &self,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<String, VenueError> {
        let params = match price {
            Some(px) => format!(
                "symbol={}&side={}&type=LIMIT&timeInForce=GTC&quantity={}&price={}",
                self.symbol, side, quantity, px
            ),
            None => format!(
                "symbol={}&side={}&type=MARKET&quantity={}",
                self.symbol, side, quantity
            ),
        };
        let resp = self
            .send(reqwest::Method::POST, "/fapi/v1/order", &params)
            .await?;
        extract_order_id(&resp)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let params = format!("symbol={}&orderId={}", self.symbol, order_id);
        self.send(reqwest::Method::DELETE, "/fapi/v1/order", &params)
            .await?;
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, VenueError> {
        let resp = self.send(reqwest::Method::GET, "/fapi/v2/balance", "").await?;
        let rows = resp
            .as_array()
            .ok_or_else(|| VenueError::Parse(format!("balance not an array: {}", resp)))?;
        for row in rows {
            if row.get("asset").and_then(|a| a.as_str()) == Some("USDT") {
                let total = row
                    .get("balance")
                    .and_then(decimal_field)
                    .unwrap_or(Decimal::ZERO);
                let available = row
                    .get("availableBalance")
                    .and_then(decimal_field)
                    .unwrap_or(Decimal::ZERO);
                return Ok(Balance {
                    total,
                    available,
                    locked: (total - available).max(Decimal::ZERO),
                });
            }
        }
        Ok(Balance {
            total: Decimal::ZERO,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        })
    }

    async fn position(&self) -> Result<Option<Position>, VenueError> {
        let params = format!("symbol={}", self.symbol);
        let resp = self
            .send(reqwest::Method::GET, "/fapi/v2/positionRisk", &params)
            .await?;
        let rows = resp
            .as_array()
            .ok_or_else(|| VenueError::Parse(format!("positionRisk not an array: {}", resp)))?;
        for row in rows {
            let size = row
                .get("positionAmt")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);
            if size.abs() > dec!(0.00000001) {
                let entry_price = row
                    .get("entryPrice")
                    .and_then(decimal_field)
                    .unwrap_or(Decimal::ZERO);
                return Ok(Some(Position { size, entry_price }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario: a successful futures order response carrying a numeric
    /// orderId.
    /// Expected: the id comes back as its decimal string form.
    #[test]
    fn test_extract_order_id_numeric() {
        let resp = serde_json::json!({"orderId": 283194023, "status": "NEW"});
        assert_eq!(extract_order_id(&resp).unwrap(), "283194023");
    }

    /// Scenario: an order response where orderId is already a string.
    /// Expected: passed through unchanged.
    #[test]
    fn test_extract_order_id_string() {
        let resp = serde_json::json!({"orderId": "283194023"});
        assert_eq!(extract_order_id(&resp).unwrap(), "283194023");
    }

    /// Scenario: an API error body ({"code": -2019, "msg": ...}) with no
    /// orderId.
    /// Expected: extraction fails with a Parse error.
    #[test]
    fn test_extract_order_id_missing() {
        let resp = serde_json::json!({"code": -2019, "msg": "Margin is insufficient."});
        assert!(matches!(
            extract_order_id(&resp),
            Err(VenueError::Parse(_))
        ));
    }
}
