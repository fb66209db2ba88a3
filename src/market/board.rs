use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::types::Venue;

/// Which side of the book a price read refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

/// Per-venue maker/taker fees as decimal fractions.
#[derive(Clone, Copy, Debug)]
pub struct FeeSchedule {
    pub cex_maker: Decimal,
    pub cex_taker: Decimal,
    pub dex_maker: Decimal,
    pub dex_taker: Decimal,
}

/// Latest top-of-book for one venue. Zero-initialized; `bid == 0`
/// means "never received".
#[derive(Clone, Copy, Default)]
struct Ticker {
    bid: Decimal,
    ask: Decimal,
    local_recv_ms: i64,
}

impl Ticker {
    fn fresh(&self, now_ms: i64, max_delay_ms: i64) -> bool {
        self.bid > Decimal::ZERO && now_ms - self.local_recv_ms <= max_delay_ms
    }
}

#[derive(Default)]
struct Tickers {
    cex: Ticker,
    dex: Ticker,
}

/// Shared price board: one ticker per venue behind a single lock.
/// Feeds write, the engine loop reads. A ticker older than
/// `max_delay_ms` is treated as missing, so every read below degrades
/// to None on stale data rather than trading on it.
///
/// Time-dependent reads take `now_ms` via the `*_at` variants; the
/// plain methods stamp wall-clock millis.
pub struct PriceBoard {
    tickers: RwLock<Tickers>,
    fees: FeeSchedule,
    max_delay_ms: i64,
    min_spread_threshold: Decimal,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl PriceBoard {
    pub fn new(fees: FeeSchedule, max_delay_ms: i64, min_spread_threshold: Decimal) -> Self {
        Self {
            tickers: RwLock::new(Tickers::default()),
            fees,
            max_delay_ms,
            min_spread_threshold,
        }
    }

    pub fn update(&self, venue: Venue, bid: Decimal, ask: Decimal) {
        self.update_at(venue, bid, ask, now_ms());
    }

    pub fn update_at(&self, venue: Venue, bid: Decimal, ask: Decimal, now_ms: i64) {
        let mut tickers = self.tickers.write();
        let ticker = match venue {
            Venue::Cex => &mut tickers.cex,
            Venue::Dex => &mut tickers.dex,
        };
        ticker.bid = bid;
        ticker.ask = ask;
        ticker.local_recv_ms = now_ms;
    }

    pub fn get_price(&self, venue: Venue, side: BookSide) -> Option<Decimal> {
        self.get_price_at(venue, side, now_ms())
    }

    pub fn get_price_at(&self, venue: Venue, side: BookSide, now_ms: i64) -> Option<Decimal> {
        let tickers = self.tickers.read();
        let ticker = match venue {
            Venue::Cex => &tickers.cex,
            Venue::Dex => &tickers.dex,
        };
        if !ticker.fresh(now_ms, self.max_delay_ms) {
            return None;
        }
        Some(match side {
            BookSide::Bid => ticker.bid,
            BookSide::Ask => ticker.ask,
        })
    }

    /// Raw crossbook spreads `(dex_bid - cex_ask, cex_bid - dex_ask)`.
    /// `(None, None)` when either ticker is uninitialized or stale.
    pub fn get_spread(&self) -> (Option<Decimal>, Option<Decimal>) {
        self.get_spread_at(now_ms())
    }

    pub fn get_spread_at(&self, now_ms: i64) -> (Option<Decimal>, Option<Decimal>) {
        let (cex, dex) = {
            let tickers = self.tickers.read();
            (tickers.cex, tickers.dex)
        };
        if !cex.fresh(now_ms, self.max_delay_ms) || !dex.fresh(now_ms, self.max_delay_ms) {
            return (None, None);
        }
        (Some(dex.bid - cex.ask), Some(cex.bid - dex.ask))
    }

    /// Fee-adjusted net spreads `(net_a, net_b)`:
    ///   net_a = dex_bid*(1 - dex_maker) - cex_ask*(1 + cex_taker)
    ///           (maker fee on the DEX side, taker on the CEX side;
    ///            gates the open)
    ///   net_b = cex_bid*(1 - cex_maker) - dex_ask*(1 + dex_taker)
    ///           (roles swapped; gates the close)
    /// `(None, None)` when either ticker is uninitialized or stale.
    pub fn get_spread_with_fees(&self) -> (Option<Decimal>, Option<Decimal>) {
        self.get_spread_with_fees_at(now_ms())
    }

    pub fn get_spread_with_fees_at(&self, now_ms: i64) -> (Option<Decimal>, Option<Decimal>) {
        let (cex, dex) = {
            let tickers = self.tickers.read();
            (tickers.cex, tickers.dex)
        };
        if !cex.fresh(now_ms, self.max_delay_ms) || !dex.fresh(now_ms, self.max_delay_ms) {
            return (None, None);
        }
        let one = Decimal::ONE;
        let net_a = dex.bid * (one - self.fees.dex_maker) - cex.ask * (one + self.fees.cex_taker);
        let net_b = cex.bid * (one - self.fees.cex_maker) - dex.ask * (one + self.fees.dex_taker);
        (Some(net_a), Some(net_b))
    }

    /// Entry gate: the open-direction net spread clears the configured
    /// threshold. False on missing data.
    pub fn open_signal(&self) -> bool {
        self.open_signal_at(now_ms())
    }

    pub fn open_signal_at(&self, now_ms: i64) -> bool {
        match self.get_spread_with_fees_at(now_ms) {
            (Some(net_a), _) => net_a > self.min_spread_threshold,
            _ => false,
        }
    }

    /// Exit gate: the close-direction net spread clears the threshold.
    /// False on missing data.
    pub fn close_signal(&self) -> bool {
        self.close_signal_at(now_ms())
    }

    pub fn close_signal_at(&self, now_ms: i64) -> bool {
        match self.get_spread_with_fees_at(now_ms) {
            (_, Some(net_b)) => net_b > self.min_spread_threshold,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn board() -> PriceBoard {
        PriceBoard::new(
            FeeSchedule {
                cex_maker: dec!(0.0002),
                cex_taker: dec!(0.0004),
                dex_maker: dec!(0.0002),
                dex_taker: dec!(0.0004),
            },
            1000,
            Decimal::ZERO,
        )
    }

    /// Scenario: a board that has never received a tick for either venue.
    /// Expected: every getter returns None and both signals are false.
    #[test]
    fn test_uninitialized_board() {
        let b = board();
        assert_eq!(b.get_price_at(Venue::Cex, BookSide::Bid, 0), None);
        assert_eq!(b.get_price_at(Venue::Dex, BookSide::Ask, 0), None);
        assert_eq!(b.get_spread_at(0), (None, None));
        assert_eq!(b.get_spread_with_fees_at(0), (None, None));
        assert!(!b.open_signal_at(0));
        assert!(!b.close_signal_at(0));
    }

    /// Scenario: both venues updated at t=0, read at t=500ms (inside the
    /// 1s freshness bound).
    /// Expected: prices readable, raw spreads are (dex_bid - cex_ask,
    /// cex_bid - dex_ask).
    #[test]
    fn test_fresh_prices_and_raw_spread() {
        let b = board();
        b.update_at(Venue::Cex, dec!(59999), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 0);

        assert_eq!(b.get_price_at(Venue::Cex, BookSide::Ask, 500), Some(dec!(60000)));
        assert_eq!(b.get_price_at(Venue::Dex, BookSide::Bid, 500), Some(dec!(60100)));

        let (a, bspread) = b.get_spread_at(500);
        assert_eq!(a, Some(dec!(100)));   // 60100 - 60000
        assert_eq!(bspread, Some(dec!(-102))); // 59999 - 60101
    }

    /// Scenario: CEX updated at t=0, DEX at t=800ms, read at t=1200ms.
    /// The CEX ticker is 1200ms old, past max_delay=1000ms.
    /// Expected: spread getters return (None, None) and the stale venue's
    /// prices read as None while the fresh venue still reads.
    #[test]
    fn test_staleness_guard() {
        let b = board();
        b.update_at(Venue::Cex, dec!(59999), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 800);

        assert_eq!(b.get_price_at(Venue::Cex, BookSide::Bid, 1200), None);
        assert_eq!(b.get_price_at(Venue::Dex, BookSide::Bid, 1200), Some(dec!(60100)));
        assert_eq!(b.get_spread_at(1200), (None, None));
        assert_eq!(b.get_spread_with_fees_at(1200), (None, None));
        assert!(!b.open_signal_at(1200));
    }

    /// Scenario: a ticker exactly max_delay old.
    /// Expected: still fresh; the guard is strict-greater-than.
    #[test]
    fn test_staleness_boundary_inclusive() {
        let b = board();
        b.update_at(Venue::Cex, dec!(59999), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 0);
        assert!(b.get_spread_at(1000).0.is_some());
        assert!(b.get_spread_at(1001).0.is_none());
    }

    /// Scenario: the worked example from the fee formula: DEX bid 60100,
    /// CEX ask 60000, 2bps maker / 4bps taker on both venues.
    /// Expected: net_a = 60100*0.9998 - 60000*1.0004 = 63.98, and net_a
    /// is strictly below the raw spread of 100.
    #[test]
    fn test_fee_adjusted_spread_values() {
        let b = board();
        b.update_at(Venue::Cex, dec!(59999), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 0);

        let (net_a, net_b) = b.get_spread_with_fees_at(0);
        assert_eq!(net_a, Some(dec!(63.98)));
        // net_b = 59999*0.9998 - 60101*1.0004 = -138.0402
        assert_eq!(net_b, Some(dec!(-138.0402)));

        let (raw_a, raw_b) = b.get_spread_at(0);
        assert!(net_a.unwrap() < raw_a.unwrap());
        assert!(net_b.unwrap() < raw_b.unwrap());
    }

    /// Scenario: the open direction is profitable, DEX bid 60100 against
    /// CEX ask 60000, clearing combined fees.
    /// Expected: open_signal fires, close_signal does not.
    #[test]
    fn test_open_signal_fires_on_positive_net() {
        let b = board();
        b.update_at(Venue::Cex, dec!(59999), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 0);

        assert!(b.open_signal_at(0));
        assert!(!b.close_signal_at(0));
    }

    /// Scenario: the mirrored book, CEX bid 60100 against DEX ask 60000.
    /// Expected: close_signal fires, open_signal does not.
    #[test]
    fn test_close_signal_fires_on_positive_net() {
        let b = board();
        b.update_at(Venue::Cex, dec!(60100), dec!(60101), 0);
        b.update_at(Venue::Dex, dec!(59999), dec!(60000), 0);

        assert!(b.close_signal_at(0));
        assert!(!b.open_signal_at(0));
    }

    /// Scenario: a raw spread of zero with positive fees.
    /// Expected: both nets are negative (fees always cost), so neither
    /// signal fires at threshold 0.
    #[test]
    fn test_zero_raw_spread_never_signals() {
        let b = board();
        b.update_at(Venue::Cex, dec!(60000), dec!(60000), 0);
        b.update_at(Venue::Dex, dec!(60000), dec!(60000), 0);

        let (net_a, net_b) = b.get_spread_with_fees_at(0);
        assert!(net_a.unwrap() < Decimal::ZERO);
        assert!(net_b.unwrap() < Decimal::ZERO);
        assert!(!b.open_signal_at(0));
        assert!(!b.close_signal_at(0));
    }

    /// Scenario: an update overwrites a previous ticker in place.
    /// Expected: reads reflect the latest write and the new timestamp.
    #[test]
    fn test_update_overwrites() {
        let b = board();
        b.update_at(Venue::Dex, dec!(60100), dec!(60101), 0);
        b.update_at(Venue::Dex, dec!(60200), dec!(60201), 5000);
        assert_eq!(b.get_price_at(Venue::Dex, BookSide::Bid, 5100), Some(dec!(60200)));
    }
}
