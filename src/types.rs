use rust_decimal::Decimal;

// ─── Venues & Sides ───

/// The two legs of the pincer. Cex is the liquid hedge venue (Binance
/// USDT-M futures), Dex the thin maker venue (Hyperliquid perps).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Venue {
    Cex,
    Dex,
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::Cex => write!(f, "CEX"),
            Venue::Dex => write!(f, "DEX"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

// ─── Order Book ───

/// One price level. `orders` is advisory; venues that omit it report 1.
#[derive(Clone, Copy, Debug)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
    pub orders: u32,
}

/// Top-of-book snapshot as parsed off a venue's depth stream.
/// Bids sorted price-descending, asks ascending. Crossed books
/// (bids[0] >= asks[0]) are dropped at the parse boundary.
pub struct L2Book {
    pub venue: Venue,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub event_time_ms: i64,
}

impl L2Book {
    /// Best bid/ask pair, or None when either side is empty or the
    /// book is crossed.
    pub fn top(&self) -> Option<(Decimal, Decimal)> {
        let bid = self.bids.first()?.price;
        let ask = self.asks.first()?.price;
        if bid >= ask {
            return None;
        }
        Some((bid, ask))
    }
}

// ─── Normalized Order Events ───

/// Terminal order-lifecycle events. Partial-fill progress reports are
/// never surfaced; the machine reads cumulative quantity at terminal
/// events only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OrderEvent {
    /// Order completely filled; carries cumulative filled quantity.
    AllFilled(Decimal),
    /// Canceled/expired/rejected with a nonzero cumulative fill.
    PartialFilledCanceled(Decimal),
    /// Canceled/expired/rejected with zero fills.
    AllCanceled,
}

impl OrderEvent {
    pub fn cum_qty(&self) -> Decimal {
        match self {
            OrderEvent::AllFilled(q) | OrderEvent::PartialFilledCanceled(q) => *q,
            OrderEvent::AllCanceled => Decimal::ZERO,
        }
    }
}

/// A normalized user-stream event addressed to the machine.
pub struct OrderUpdate {
    pub venue: Venue,
    pub order_id: String,
    pub event: OrderEvent,
}

// ─── Feed Events (produced by WS/timer tasks, consumed by the engine loop) ───

pub enum FeedEvent {
    /// CEX top-of-book refreshed; the engine loop evaluates signals.
    CexDepth,
    /// Terminal order event from either venue's user stream.
    OrderUpdate(OrderUpdate),
    /// 1 Hz timer; drives the machine's timeout sweep.
    Tick,
}

// ─── Account State ───

/// Settlement-asset balance on one venue.
#[derive(Clone, Copy, Debug)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
    pub locked: Decimal,
}

/// Open position on one venue. `size` is signed: positive long,
/// negative short.
#[derive(Clone, Copy, Debug)]
pub struct Position {
    pub size: Decimal,
    pub entry_price: Decimal,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.size < Decimal::ZERO
    }
}
