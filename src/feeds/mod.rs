pub mod binance;
pub mod binance_user;
pub mod hyperliquid;
