use alloy::primitives::{keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, SolStruct};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::gateway::client::{VenueClient, VenueError};
use crate::math::rounding::{decimal_field, round_half_up};
use crate::types::{Balance, Position, Side};

/// Slippage cap applied when a market order is emulated as an
/// aggressive IOC limit (the venue convention).
const MARKET_SLIPPAGE: Decimal = dec!(0.02);

sol! {
    /// The venue's EIP-712 "phantom agent": the msgpack action hash is
    /// wrapped in this struct and signed with the operator's wallet key.
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

/// Hyperliquid perps adapter. Signed-action REST against `/exchange`,
/// account reads against `/info`. Asset index and size decimals are
/// resolved once from the venue meta at connect time.
pub struct Hyperliquid {
    http: reqwest::Client,
    api_url: String,
    wallet: String,
    signer: PrivateKeySigner,
    coin: String,
    asset: u32,
    px_decimals: u32,
    is_mainnet: bool,
}

impl Hyperliquid {
    /// Build the adapter and resolve the coin's asset index from
    /// `POST /info {type: "meta"}`.
    pub async fn connect(config: &Config, http: reqwest::Client) -> Result<Self, VenueError> {
        let signer: PrivateKeySigner = config
            .dex_wallet_key
            .parse()
            .map_err(|e| VenueError::Signing(format!("bad wallet key: {}", e)))?;

        let mut client = Self {
            http,
            api_url: config.dex_api_url.clone(),
            wallet: config.dex_wallet.clone(),
            signer,
            coin: config.dex_symbol.clone(),
            asset: 0,
            px_decimals: config.dex_price_precision,
            is_mainnet: !config.dex_api_url.contains("testnet"),
        };

        let meta = client.info(serde_json::json!({"type": "meta"})).await?;
        let universe = meta
            .get("universe")
            .and_then(|u| u.as_array())
            .ok_or_else(|| VenueError::Parse("meta has no universe".into()))?;
        let asset = universe
            .iter()
            .position(|entry| {
                entry.get("name").and_then(|n| n.as_str()) == Some(client.coin.as_str())
            })
            .ok_or_else(|| VenueError::Parse(format!("{} not in universe", client.coin)))?;
        client.asset = asset as u32;
        eprintln!("[HL] Meta resolved: {} -> asset {}", client.coin, client.asset);
        Ok(client)
    }

    async fn info(&self, body: serde_json::Value) -> Result<serde_json::Value, VenueError> {
        let resp = self
            .http
            .post(format!("{}/info", self.api_url))
            .json(&body)
            .send()
            .await?;
        Ok(resp.json().await?)
    }

    /// Hash the msgpack-encoded action with nonce and vault flag, wrap
    /// in the phantom agent, and sign under the exchange's EIP-712
    /// domain (chain id 1337, zero verifying contract).
    fn sign_action(
        &self,
        action: &serde_json::Value,
        nonce: u64,
    ) -> Result<serde_json::Value, VenueError> {
        let mut data = rmp_serde::to_vec_named(action)
            .map_err(|e| VenueError::Signing(format!("action encode: {}", e)))?;
        data.extend_from_slice(&nonce.to_be_bytes());
        data.push(0); // no vault address

        let agent = Agent {
            source: if self.is_mainnet { "a" } else { "b" }.to_string(),
            connectionId: keccak256(&data),
        };
        let domain = eip712_domain! {
            name: "Exchange",
            version: "1",
            chain_id: 1337,
            verifying_contract: Address::ZERO,
        };
        let sig = self
            .signer
            .sign_hash_sync(&agent.eip712_signing_hash(&domain))
            .map_err(|e| VenueError::Signing(e.to_string()))?;

        Ok(serde_json::json!({
            "r": format!("0x{}", hex::encode(sig.r().to_be_bytes::<32>())),
            "s": format!("0x{}", hex::encode(sig.s().to_be_bytes::<32>())),
            "v": if sig.v() { 28 } else { 27 },
        }))
    }

    async fn exchange(&self, action: serde_json::Value) -> Result<serde_json::Value, VenueError> {
        let nonce = chrono::Utc::now().timestamp_millis() as u64;
        let signature = self.sign_action(&action, nonce)?;
        let body = serde_json::json!({
            "action": action,
            "nonce": nonce,
            "signature": signature,
            "vaultAddress": null,
        });
        let resp = self
            .http
            .post(format!("{}/exchange", self.api_url))
            .json(&body)
            .send()
            .await?;
        Ok(resp.json().await?)
    }

    /// Mid price for the bound coin, for slippage-capped market orders.
    async fn mid_price(&self) -> Result<Decimal, VenueError> {
        let mids = self.info(serde_json::json!({"type": "allMids"})).await?;
        mids.get(self.coin.as_str())
            .and_then(decimal_field)
            .ok_or_else(|| VenueError::Parse(format!("no mid for {}", self.coin)))
    }
}

/// Aggressive limit price standing in for a market order: 2% through
/// the mid in the taking direction, rounded to the venue price grid.
pub fn slippage_px(mid: Decimal, side: Side, px_decimals: u32) -> Decimal {
    let adjusted = match side {
        Side::Buy => mid * (Decimal::ONE + MARKET_SLIPPAGE),
        Side::Sell => mid * (Decimal::ONE - MARKET_SLIPPAGE),
    };
    round_half_up(adjusted, px_decimals)
}

/// Reduce an exchange response to the new order's oid. The venue nests
/// it under response.data.statuses[0] as either `resting` (maker) or
/// `filled` (crossed on arrival); a `statuses[0].error` is a logical
/// rejection even under `status: "ok"`.
pub fn extract_order_id(resp: &serde_json::Value) -> Result<String, VenueError> {
    if resp.get("status").and_then(|s| s.as_str()) != Some("ok") {
        return Err(VenueError::Api(format!("status not ok: {}", resp)));
    }
    let status = resp
        .pointer("/response/data/statuses/0")
        .ok_or_else(|| VenueError::Parse(format!("no statuses in {}", resp)))?;
    if let Some(err) = status.get("error").and_then(|e| e.as_str()) {
        return Err(VenueError::Api(err.to_string()));
    }
    for key in ["resting", "filled"] {
        if let Some(oid) = status.pointer(&format!("/{}/oid", key)) {
            if oid.is_u64() || oid.is_i64() {
                return Ok(oid.to_string());
            }
        }
    }
    Err(VenueError::Parse(format!("no oid in {}", status)))
}

#[async_trait]
impl VenueClient for Hyperliquid {
    async fn place_order(
        &self,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<String, VenueError> {
        let (px, tif) = match price {
            Some(px) => (px, "Gtc"),
            None => (slippage_px(self.mid_price().await?, side, self.px_decimals), "Ioc"),
        };
        let action = serde_json::json!({
            "type": "order",
            "orders": [{
                "a": self.asset,
                "b": side == Side::Buy,
                "p": px.normalize().to_string(),
                "s": quantity.normalize().to_string(),
                "r": false,
                "t": {"limit": {"tif": tif}},
            }],
            "grouping": "na",
        });
        let resp = self.exchange(action).await?;
        extract_order_id(&resp)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError> {
        let oid: u64 = order_id
            .parse()
            .map_err(|_| VenueError::Parse(format!("non-numeric oid {}", order_id)))?;
        let action = serde_json::json!({
            "type": "cancel",
            "cancels": [{"a": self.asset, "o": oid}],
        });
        let resp = self.exchange(action).await?;
        if resp.get("status").and_then(|s| s.as_str()) != Some("ok") {
            return Err(VenueError::Api(format!("cancel failed: {}", resp)));
        }
        if let Some(err) = resp
            .pointer("/response/data/statuses/0/error")
            .and_then(|e| e.as_str())
        {
            return Err(VenueError::Api(err.to_string()));
        }
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, VenueError> {
        let state = self
            .info(serde_json::json!({"type": "clearinghouseState", "user": self.wallet}))
            .await?;
        let summary = state
            .get("marginSummary")
            .ok_or_else(|| VenueError::Parse("no marginSummary".into()))?;
        let available = summary
            .get("availableMargin")
            .and_then(decimal_field)
            .unwrap_or(Decimal::ZERO);
        let locked = summary
            .get("totalMarginUsed")
            .and_then(decimal_field)
            .unwrap_or(Decimal::ZERO);
        let total = summary
            .get("accountValue")
            .and_then(decimal_field)
            .unwrap_or(Decimal::ZERO);
        Ok(Balance {
            total,
            available,
            locked,
        })
    }

    async fn position(&self) -> Result<Option<Position>, VenueError> {
        let state = self
            .info(serde_json::json!({"type": "clearinghouseState", "user": self.wallet}))
            .await?;
        let positions = state
            .get("assetPositions")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();
        for entry in &positions {
            let pos = match entry.get("position") {
                Some(p) => p,
                None => continue,
            };
            if pos.get("coin").and_then(|c| c.as_str()) != Some(self.coin.as_str()) {
                continue;
            }
            let size = pos
                .get("szi")
                .and_then(decimal_field)
                .unwrap_or(Decimal::ZERO);
            if size.abs() > dec!(0.00000001) {
                let entry_price = pos
                    .get("entryPx")
                    .and_then(decimal_field)
                    .unwrap_or(Decimal::ZERO);
                return Ok(Some(Position { size, entry_price }));
            }
        }
        Ok(None)
    }
}
