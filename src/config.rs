use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Configuration loaded from environment variables (`.env` via dotenvy
/// in main). Every knob has a coded default so a testnet dry run needs
/// only the credential variables.
#[derive(Clone)]
pub struct Config {
    // CEX (Binance USDT-M futures) endpoints & auth
    pub cex_ws_url: String,
    pub cex_api_url: String,
    pub cex_api_key: String,
    pub cex_secret: String,

    // DEX (Hyperliquid) endpoints & signer
    pub dex_ws_url: String,
    pub dex_api_url: String,
    pub dex_wallet: String,
    pub dex_wallet_key: String,

    // Instruments
    pub cex_symbol: String,
    pub dex_symbol: String,

    // Fee schedule (decimal fractions, e.g. 0.0004 = 4 bps)
    pub cex_maker_fee: Decimal,
    pub cex_taker_fee: Decimal,
    pub dex_maker_fee: Decimal,
    pub dex_taker_fee: Decimal,

    // Strategy
    pub min_spread_threshold: Decimal,
    pub base_quantity: Decimal,
    pub order_timeout_sec: i64,
    pub max_chase_retries: u32,

    // Venue precision (decimal places for price / quantity)
    pub cex_price_precision: u32,
    pub cex_qty_precision: u32,
    pub dex_price_precision: u32,
    pub dex_qty_precision: u32,

    // Price board freshness bound
    pub max_delay_sec: i64,
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            cex_ws_url: env_str("CEX_WS_URL", "wss://fstream.binance.com"),
            cex_api_url: env_str("CEX_API_URL", "https://fapi.binance.com"),
            cex_api_key: env_str("CEX_API_KEY", ""),
            cex_secret: env_str("CEX_SECRET", ""),
            dex_ws_url: env_str("DEX_WS_URL", "wss://api.hyperliquid.xyz/ws"),
            dex_api_url: env_str("DEX_API_URL", "https://api.hyperliquid.xyz"),
            dex_wallet: env_str("DEX_WALLET", ""),
            dex_wallet_key: env_str("DEX_WALLET_KEY", ""),
            cex_symbol: env_str("CEX_SYMBOL", "BTCUSDT").to_uppercase(),
            dex_symbol: env_str("DEX_SYMBOL", "BTC").to_uppercase(),
            cex_maker_fee: env_decimal("CEX_MAKER_FEE", dec!(0.0002)),
            cex_taker_fee: env_decimal("CEX_TAKER_FEE", dec!(0.0004)),
            dex_maker_fee: env_decimal("DEX_MAKER_FEE", dec!(0.0002)),
            dex_taker_fee: env_decimal("DEX_TAKER_FEE", dec!(0.0004)),
            min_spread_threshold: env_decimal("MIN_SPREAD_THRESHOLD", Decimal::ZERO),
            base_quantity: env_decimal("BASE_QUANTITY", dec!(0.001)),
            order_timeout_sec: env_parse("ORDER_TIMEOUT_SEC", 5),
            max_chase_retries: env_parse("MAX_CHASE_RETRIES", 3),
            cex_price_precision: env_parse("CEX_PRICE_PRECISION", 2),
            cex_qty_precision: env_parse("CEX_QTY_PRECISION", 3),
            dex_price_precision: env_parse("DEX_PRICE_PRECISION", 2),
            dex_qty_precision: env_parse("DEX_QTY_PRECISION", 3),
            max_delay_sec: env_parse("MAX_DELAY_SEC", 1),
        }
    }

    pub fn order_timeout_ms(&self) -> i64 {
        self.order_timeout_sec * 1000
    }

    pub fn max_delay_ms(&self) -> i64 {
        self.max_delay_sec * 1000
    }

    /// CEX market-data stream URL: top-20 partial depth at 100ms cadence.
    pub fn cex_depth_stream_url(&self) -> String {
        format!(
            "{}/ws/{}@depth20@100ms",
            self.cex_ws_url,
            self.cex_symbol.to_lowercase()
        )
    }

    /// CEX user-data stream URL for an acquired listen key.
    pub fn cex_user_stream_url(&self, listen_key: &str) -> String {
        format!("{}/ws/{}", self.cex_ws_url, listen_key)
    }
}
