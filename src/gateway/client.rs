use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Balance, Position, Side};

/// Everything a venue call can fail with. Transport and parse errors
/// are captured here; nothing from an adapter escapes as a panic.
#[derive(Debug, Error)]
pub enum VenueError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("venue rejected request: {0}")]
    Api(String),
    #[error("unparseable response: {0}")]
    Parse(String),
    #[error("signing: {0}")]
    Signing(String),
}

/// Capability set the engine needs from a venue. The symbol is bound at
/// adapter construction; callers pass already-rounded prices and
/// quantities.
#[async_trait]
pub trait VenueClient: Send + Sync {
    /// Place an order and return the venue's order id. `price: None`
    /// means market. Blocks for the REST round-trip; a response without
    /// a parseable order id is a placement failure.
    async fn place_order(
        &self,
        side: Side,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Result<String, VenueError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), VenueError>;

    /// Settlement-asset balance (informational; logged at startup).
    async fn balance(&self) -> Result<Balance, VenueError>;

    /// Open position for the bound symbol; None when flat.
    async fn position(&self) -> Result<Option<Position>, VenueError>;
}
