use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::engine::machine::StrategyState;
use crate::gateway::client::{VenueClient, VenueError};

/// Hedge legs must agree in magnitude within this bound.
const SIZE_MATCH_EPS: Decimal = dec!(0.000001);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("venue query failed: {0}")]
    Venue(#[from] VenueError),
    #[error("refusing to start: {0}")]
    Unhedged(String),
}

/// Where the machine should begin.
pub struct InitialState {
    pub state: StrategyState,
    pub position: Decimal,
}

/// Decide the machine's starting state from observed venue state.
///
/// Flat on both venues starts the entry scan; a matched hedge (CEX
/// short against DEX long of equal size) starts the exit scan. Any
/// other combination is refused. Single-sided residue is never
/// assumed safe to hedge automatically.
pub async fn reconcile(
    cex: &dyn VenueClient,
    dex: &dyn VenueClient,
) -> Result<InitialState, ReconcileError> {
    match cex.balance().await {
        Ok(b) => eprintln!(
            "[RECON] CEX balance: total={} available={} locked={}",
            b.total, b.available, b.locked
        ),
        Err(e) => eprintln!("[RECON] CEX balance query failed: {}", e),
    }
    match dex.balance().await {
        Ok(b) => eprintln!(
            "[RECON] DEX balance: total={} available={} locked={}",
            b.total, b.available, b.locked
        ),
        Err(e) => eprintln!("[RECON] DEX balance query failed: {}", e),
    }

    let cex_pos = cex.position().await?;
    let dex_pos = dex.position().await?;

    match (cex_pos, dex_pos) {
        (None, None) => {
            eprintln!("[RECON] Both venues flat, starting in OpenCondition");
            Ok(InitialState {
                state: StrategyState::OpenCondition,
                position: Decimal::ZERO,
            })
        }
        (Some(c), Some(d)) if c.is_short() && d.is_long() => {
            if (c.size.abs() - d.size.abs()).abs() > SIZE_MATCH_EPS {
                return Err(ReconcileError::Unhedged(format!(
                    "hedge sizes disagree: CEX {} vs DEX {}",
                    c.size, d.size
                )));
            }
            eprintln!(
                "[RECON] Matched hedge found (CEX short {} / DEX long {}), starting in CloseCondition",
                c.size, d.size
            );
            Ok(InitialState {
                state: StrategyState::CloseCondition,
                position: d.size,
            })
        }
        (c, d) => {
            let describe = |p: &Option<crate::types::Position>| match p {
                Some(p) if p.is_long() => format!("LONG {}", p.size),
                Some(p) => format!("SHORT {}", p.size),
                None => "flat".to_string(),
            };
            Err(ReconcileError::Unhedged(format!(
                "CEX {} / DEX {}, flatten or rebalance manually",
                describe(&c),
                describe(&d)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balance, Position, Side};
    use async_trait::async_trait;

    /// Stub venue returning a fixed position.
    struct StubVenue {
        position: Option<Position>,
    }

    impl StubVenue {
        fn new(size: Option<Decimal>) -> Self {
            Self {
                position: size.map(|s| Position {
                    size: s,
                    entry_price: dec!(60000),
                }),
            }
        }
    }

    #[async_trait]
    impl VenueClient for StubVenue {
        async fn place_order(
            &self,
            _side: Side,
            _quantity: Decimal,
            _price: Option<Decimal>,
        ) -> Result<String, VenueError> {
            unreachable!("reconciler never places orders")
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<(), VenueError> {
            unreachable!("reconciler never cancels orders")
        }

        async fn balance(&self) -> Result<Balance, VenueError> {
            Ok(Balance {
                total: dec!(1000),
                available: dec!(900),
                locked: dec!(100),
            })
        }

        async fn position(&self) -> Result<Option<Position>, VenueError> {
            Ok(self.position)
        }
    }

    /// Scenario: no position on either venue.
    /// Expected: start in OpenCondition with zero position.
    #[tokio::test]
    async fn test_flat_starts_open_condition() {
        let cex = StubVenue::new(None);
        let dex = StubVenue::new(None);
        let initial = reconcile(&cex, &dex).await.unwrap();
        assert_eq!(initial.state, StrategyState::OpenCondition);
        assert_eq!(initial.position, Decimal::ZERO);
    }

    /// Scenario: the expected hedge, CEX short 0.001 against DEX long
    /// 0.001.
    /// Expected: start in CloseCondition carrying the DEX size.
    #[tokio::test]
    async fn test_matched_hedge_starts_close_condition() {
        let cex = StubVenue::new(Some(dec!(-0.001)));
        let dex = StubVenue::new(Some(dec!(0.001)));
        let initial = reconcile(&cex, &dex).await.unwrap();
        assert_eq!(initial.state, StrategyState::CloseCondition);
        assert_eq!(initial.position, dec!(0.001));
    }

    /// Scenario: a single-sided CEX short with nothing on the DEX.
    /// Expected: refusal; the supervisor maps this to a non-zero exit.
    #[tokio::test]
    async fn test_single_sided_position_refused() {
        let cex = StubVenue::new(Some(dec!(-0.001)));
        let dex = StubVenue::new(None);
        assert!(matches!(
            reconcile(&cex, &dex).await,
            Err(ReconcileError::Unhedged(_))
        ));
    }

    /// Scenario: both venues long, not a hedge.
    /// Expected: refusal.
    #[tokio::test]
    async fn test_same_direction_refused() {
        let cex = StubVenue::new(Some(dec!(0.001)));
        let dex = StubVenue::new(Some(dec!(0.001)));
        assert!(matches!(
            reconcile(&cex, &dex).await,
            Err(ReconcileError::Unhedged(_))
        ));
    }

    /// Scenario: correctly-signed hedge but mismatched magnitudes
    /// (CEX short 0.002 vs DEX long 0.001).
    /// Expected: refusal.
    #[tokio::test]
    async fn test_mismatched_sizes_refused() {
        let cex = StubVenue::new(Some(dec!(-0.002)));
        let dex = StubVenue::new(Some(dec!(0.001)));
        assert!(matches!(
            reconcile(&cex, &dex).await,
            Err(ReconcileError::Unhedged(_))
        ));
    }
}
