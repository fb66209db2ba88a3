use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::gateway::client::VenueClient;
use crate::market::board::{BookSide, PriceBoard};
use crate::math::rounding::round_half_up;
use crate::types::{OrderEvent, Side, Venue};

/// Position below this is considered flat.
pub const POS_EPS: Decimal = dec!(0.00001);
/// Quantity comparisons tighter than venue step sizes.
pub const QTY_EPS: Decimal = dec!(0.000001);

/// The ten execution states. Leg 1 is always the maker order on the
/// DEX; Leg 2 the taker-chase hedge on the CEX.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyState {
    /// Flat, scanning for an entry spread.
    OpenCondition,
    /// Hedged, scanning for an exit spread.
    CloseCondition,
    OpenLeg1Waiting,
    OpenLeg1Canceling,
    OpenLeg2Waiting,
    OpenLeg2Chasing,
    CloseLeg1Waiting,
    CloseLeg1Canceling,
    CloseLeg2Waiting,
    CloseLeg2Chasing,
}

impl StrategyState {
    /// States that carry an in-flight venue order.
    pub fn has_active_order(&self) -> bool {
        !matches!(self, StrategyState::OpenCondition | StrategyState::CloseCondition)
    }

    fn is_leg2(&self) -> bool {
        matches!(
            self,
            StrategyState::OpenLeg2Waiting
                | StrategyState::OpenLeg2Chasing
                | StrategyState::CloseLeg2Waiting
                | StrategyState::CloseLeg2Chasing
        )
    }
}

/// The execution state machine. Exclusively owned by the engine loop
/// task, which serializes signal checks, order events, and the timeout
/// sweep; placements are awaited inline so a second signal can never
/// race a pending one. Cancels run on detached tasks.
pub struct StrategyStateMachine {
    state: StrategyState,
    board: Arc<PriceBoard>,
    cex: Arc<dyn VenueClient>,
    dex: Arc<dyn VenueClient>,

    base_quantity: Decimal,
    order_timeout_ms: i64,
    max_chase_retries: u32,
    cex_price_precision: u32,
    cex_qty_precision: u32,
    dex_price_precision: u32,
    dex_qty_precision: u32,

    /// Cumulative fills for the current two-leg episode. Leg 1 doubles
    /// as the Leg 2 target.
    leg1_filled_qty: Decimal,
    leg2_filled_qty: Decimal,
    /// Net size on the DEX leg (positive = long). Updated from Leg-1
    /// order events only; Leg-2 fills never touch it.
    current_position: Decimal,

    /// At most one active order at any instant across both venues.
    active_order_id: Option<String>,
    active_order_time_ms: i64,
    chase_retry_count: u32,
    /// order-id -> last-seen cumulative fill, so delta = new - last.
    last_cum_filled: HashMap<String, Decimal>,
}

impl StrategyStateMachine {
    pub fn new(
        config: &Config,
        board: Arc<PriceBoard>,
        cex: Arc<dyn VenueClient>,
        dex: Arc<dyn VenueClient>,
    ) -> Self {
        Self {
            state: StrategyState::OpenCondition,
            board,
            cex,
            dex,
            base_quantity: config.base_quantity,
            order_timeout_ms: config.order_timeout_ms(),
            max_chase_retries: config.max_chase_retries,
            cex_price_precision: config.cex_price_precision,
            cex_qty_precision: config.cex_qty_precision,
            dex_price_precision: config.dex_price_precision,
            dex_qty_precision: config.dex_qty_precision,
            leg1_filled_qty: Decimal::ZERO,
            leg2_filled_qty: Decimal::ZERO,
            current_position: Decimal::ZERO,
            active_order_id: None,
            active_order_time_ms: 0,
            chase_retry_count: 0,
            last_cum_filled: HashMap::new(),
        }
    }

    /// Seed state and position from the startup reconciler.
    pub fn restore(&mut self, state: StrategyState, position: Decimal) {
        self.state = state;
        self.current_position = position;
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn current_position(&self) -> Decimal {
        self.current_position
    }

    pub fn active_order_id(&self) -> Option<&str> {
        self.active_order_id.as_deref()
    }

    pub fn leg1_filled_qty(&self) -> Decimal {
        self.leg1_filled_qty
    }

    pub fn leg2_filled_qty(&self) -> Decimal {
        self.leg2_filled_qty
    }

    pub fn chase_retry_count(&self) -> u32 {
        self.chase_retry_count
    }

    fn update_state(&mut self, new_state: StrategyState) {
        self.state = new_state;
        eprintln!("[MACHINE] >>> {:?}", new_state);
    }

    /// Drop the active-order slot and prune its cumulative-fill entry.
    fn clear_active(&mut self) {
        if let Some(id) = self.active_order_id.take() {
            self.last_cum_filled.remove(&id);
        }
    }

    fn spawn_cancel(&self, venue: Venue, order_id: String) {
        let client = match venue {
            Venue::Cex => Arc::clone(&self.cex),
            Venue::Dex => Arc::clone(&self.dex),
        };
        tokio::spawn(async move {
            if let Err(e) = client.cancel_order(&order_id).await {
                eprintln!("[MACHINE] Cancel {} on {} failed: {}", order_id, venue, e);
            }
        });
    }

    // ─── Signal entrypoints (invoked by the engine loop on CEX ticks) ───

    /// Entry: place the Leg-1 maker BUY on the DEX at its bid. The
    /// signal is re-evaluated here, at the point of commitment.
    pub async fn check_and_execute_open<F: Fn() -> bool>(&mut self, signal: F, now_ms: i64) {
        if self.state != StrategyState::OpenCondition {
            return;
        }
        if !signal() {
            return;
        }
        let Some(price_raw) = self.board.get_price_at(Venue::Dex, BookSide::Bid, now_ms) else {
            eprintln!("[MACHINE] Open signal but no fresh DEX bid, skipping");
            return;
        };
        let price = round_half_up(price_raw, self.dex_price_precision);
        let qty = round_half_up(self.base_quantity, self.dex_qty_precision);
        if qty <= Decimal::ZERO {
            eprintln!("[MACHINE] Open qty {} rounds to zero, skipping", self.base_quantity);
            return;
        }

        eprintln!("[MACHINE] >>> Open signal: DEX BUY {} @ {} <<<", qty, price);
        match self.dex.place_order(Side::Buy, qty, Some(price)).await {
            Ok(order_id) => {
                self.leg1_filled_qty = Decimal::ZERO;
                self.last_cum_filled.insert(order_id.clone(), Decimal::ZERO);
                self.active_order_id = Some(order_id.clone());
                self.active_order_time_ms = now_ms;
                self.update_state(StrategyState::OpenLeg1Waiting);
                eprintln!("[MACHINE] Leg1 open placed, id {}", order_id);
            }
            Err(e) => eprintln!("[MACHINE] Leg1 open placement failed: {}", e),
        }
    }

    /// Exit: place the Leg-1 maker SELL on the DEX at its ask for the
    /// whole current position.
    pub async fn check_and_execute_close<F: Fn() -> bool>(&mut self, signal: F, now_ms: i64) {
        if self.state != StrategyState::CloseCondition {
            return;
        }
        if !signal() {
            return;
        }
        if self.current_position <= POS_EPS {
            return;
        }
        let Some(price_raw) = self.board.get_price_at(Venue::Dex, BookSide::Ask, now_ms) else {
            eprintln!("[MACHINE] Close signal but no fresh DEX ask, skipping");
            return;
        };
        let price = round_half_up(price_raw, self.dex_price_precision);
        let qty = round_half_up(self.current_position, self.dex_qty_precision);
        if qty <= Decimal::ZERO {
            eprintln!("[MACHINE] Close qty {} rounds to zero, skipping", self.current_position);
            return;
        }

        eprintln!("[MACHINE] >>> Close signal: DEX SELL {} @ {} <<<", qty, price);
        match self.dex.place_order(Side::Sell, qty, Some(price)).await {
            Ok(order_id) => {
                self.leg1_filled_qty = Decimal::ZERO;
                self.last_cum_filled.insert(order_id.clone(), Decimal::ZERO);
                self.active_order_id = Some(order_id.clone());
                self.active_order_time_ms = now_ms;
                self.update_state(StrategyState::CloseLeg1Waiting);
                eprintln!("[MACHINE] Leg1 close placed, id {}", order_id);
            }
            Err(e) => eprintln!("[MACHINE] Leg1 close placement failed: {}", e),
        }
    }

    // ─── Order-event handling ───

    /// Terminal-event handler. Events for anything but the active order
    /// are stale or foreign and dropped.
    pub async fn on_order_update(
        &mut self,
        venue: Venue,
        order_id: &str,
        event: OrderEvent,
        now_ms: i64,
    ) {
        let Some(active) = self.active_order_id.clone() else {
            return;
        };
        if order_id != active {
            return;
        }

        let cum = event.cum_qty();
        let last = self
            .last_cum_filled
            .get(order_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let inc = (cum - last).max(Decimal::ZERO);
        self.last_cum_filled.insert(order_id.to_string(), cum);

        eprintln!(
            "[MACHINE] {} order {} {:?} in {:?} cum={} inc={}",
            venue, order_id, event, self.state, cum, inc
        );

        match self.state {
            // ── Open: Leg 1 (DEX BUY) ──
            StrategyState::OpenLeg1Waiting => match event {
                OrderEvent::AllFilled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position += inc;
                    self.clear_active();
                    self.start_leg2_open(true, cum, now_ms).await;
                }
                OrderEvent::PartialFilledCanceled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position += inc;
                    self.update_state(StrategyState::OpenLeg1Canceling);
                    // Already terminal on the venue; the cancel is a no-op there.
                    self.spawn_cancel(Venue::Dex, active);
                    self.clear_active();
                    self.start_leg2_open(true, cum, now_ms).await;
                }
                OrderEvent::AllCanceled => {
                    self.clear_active();
                    self.update_state(StrategyState::OpenCondition);
                }
            },
            StrategyState::OpenLeg1Canceling => match event {
                OrderEvent::AllCanceled => {
                    self.clear_active();
                    if self.leg1_filled_qty == Decimal::ZERO {
                        self.update_state(StrategyState::OpenCondition);
                    }
                }
                OrderEvent::PartialFilledCanceled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position += inc;
                    self.clear_active();
                    self.start_leg2_open(true, cum, now_ms).await;
                }
                OrderEvent::AllFilled(_) => {
                    // Cancel raced the fill and lost.
                    self.leg1_filled_qty = cum;
                    self.current_position += inc;
                    self.clear_active();
                    self.start_leg2_open(false, cum, now_ms).await;
                }
            },

            // ── Open: Leg 2 (CEX SELL hedge) ──
            // A chase can span several orders, so the episode total
            // accumulates per-order deltas rather than taking any single
            // order's cumulative quantity.
            StrategyState::OpenLeg2Waiting | StrategyState::OpenLeg2Chasing => {
                let target = self.leg1_filled_qty;
                self.leg2_filled_qty += inc;
                match event {
                    OrderEvent::AllFilled(_) => {
                        if (target - self.leg2_filled_qty).abs() <= QTY_EPS {
                            self.complete_open_episode();
                        }
                    }
                    OrderEvent::PartialFilledCanceled(_) | OrderEvent::AllCanceled => {
                        self.clear_active();
                        self.update_state(StrategyState::OpenLeg2Chasing);
                        let remaining = target - self.leg2_filled_qty;
                        if remaining > QTY_EPS {
                            self.chase_step(Side::Sell, remaining, now_ms).await;
                        } else {
                            self.complete_open_episode();
                        }
                    }
                }
            }

            // ── Close: Leg 1 (DEX SELL) ──
            StrategyState::CloseLeg1Waiting => match event {
                OrderEvent::AllFilled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position -= inc;
                    self.clear_active();
                    self.start_leg2_close(true, cum, now_ms).await;
                }
                OrderEvent::PartialFilledCanceled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position -= inc;
                    self.update_state(StrategyState::CloseLeg1Canceling);
                    self.spawn_cancel(Venue::Dex, active);
                    self.clear_active();
                    self.start_leg2_close(true, cum, now_ms).await;
                }
                OrderEvent::AllCanceled => {
                    self.clear_active();
                    self.update_state(StrategyState::CloseCondition);
                }
            },
            StrategyState::CloseLeg1Canceling => match event {
                OrderEvent::AllCanceled => {
                    self.clear_active();
                    if self.current_position <= POS_EPS {
                        self.update_state(StrategyState::OpenCondition);
                    } else {
                        self.update_state(StrategyState::CloseCondition);
                    }
                }
                OrderEvent::PartialFilledCanceled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position -= inc;
                    self.clear_active();
                    self.start_leg2_close(true, cum, now_ms).await;
                }
                OrderEvent::AllFilled(_) => {
                    self.leg1_filled_qty = cum;
                    self.current_position -= inc;
                    self.clear_active();
                    self.start_leg2_close(false, cum, now_ms).await;
                }
            },

            // ── Close: Leg 2 (CEX BUY hedge) ──
            StrategyState::CloseLeg2Waiting | StrategyState::CloseLeg2Chasing => {
                let target = self.leg1_filled_qty;
                self.leg2_filled_qty += inc;
                match event {
                    OrderEvent::AllFilled(_) => {
                        if (target - self.leg2_filled_qty).abs() <= QTY_EPS {
                            self.complete_close_episode();
                        }
                    }
                    OrderEvent::PartialFilledCanceled(_) | OrderEvent::AllCanceled => {
                        self.clear_active();
                        self.update_state(StrategyState::CloseLeg2Chasing);
                        let remaining = target - self.leg2_filled_qty;
                        if remaining > QTY_EPS {
                            self.chase_step(Side::Buy, remaining, now_ms).await;
                        } else {
                            self.complete_close_episode();
                        }
                    }
                }
            }

            StrategyState::OpenCondition | StrategyState::CloseCondition => {}
        }
    }

    fn complete_open_episode(&mut self) {
        eprintln!("[MACHINE] Open hedge complete, position {}", self.current_position);
        self.clear_active();
        self.leg1_filled_qty = Decimal::ZERO;
        self.leg2_filled_qty = Decimal::ZERO;
        self.chase_retry_count = 0;
        self.update_state(StrategyState::CloseCondition);
    }

    fn complete_close_episode(&mut self) {
        eprintln!("[MACHINE] Close hedge complete, position {}", self.current_position);
        self.clear_active();
        self.leg1_filled_qty = Decimal::ZERO;
        self.leg2_filled_qty = Decimal::ZERO;
        self.chase_retry_count = 0;
        if self.current_position <= POS_EPS {
            self.update_state(StrategyState::OpenCondition);
        } else {
            // Residual DEX exposure; keep scanning for another exit.
            self.update_state(StrategyState::CloseCondition);
        }
    }

    // ─── Leg 2 launch & chase ladder ───

    async fn start_leg2_open(&mut self, initial: bool, qty: Decimal, now_ms: i64) {
        if initial {
            self.chase_retry_count = 0;
            self.leg2_filled_qty = Decimal::ZERO;
            self.update_state(StrategyState::OpenLeg2Waiting);
        } else {
            self.update_state(StrategyState::OpenLeg2Chasing);
        }
        self.chase_step(Side::Sell, qty, now_ms).await;
    }

    async fn start_leg2_close(&mut self, initial: bool, qty: Decimal, now_ms: i64) {
        if initial {
            self.chase_retry_count = 0;
            self.leg2_filled_qty = Decimal::ZERO;
            self.update_state(StrategyState::CloseLeg2Waiting);
        } else {
            self.update_state(StrategyState::CloseLeg2Chasing);
        }
        self.chase_step(Side::Buy, qty, now_ms).await;
    }

    /// One rung of the chase ladder: the first `max_chase_retries`
    /// placements are limits walking 0.1% further through the book per
    /// attempt (SELL below the bid, BUY above the ask); after that, or
    /// whenever no fresh CEX price exists, a market order for the
    /// remainder.
    async fn chase_step(&mut self, side: Side, qty: Decimal, now_ms: i64) {
        let qty = round_half_up(qty, self.cex_qty_precision);
        if qty <= Decimal::ZERO {
            eprintln!("[MACHINE] Chase qty rounds to zero, skipping");
            return;
        }

        let book_side = match side {
            Side::Sell => BookSide::Bid,
            Side::Buy => BookSide::Ask,
        };
        let price = match self.board.get_price_at(Venue::Cex, book_side, now_ms) {
            None => {
                eprintln!("[MACHINE] No fresh CEX {:?}, chasing with market order", book_side);
                None
            }
            Some(market_price) if self.chase_retry_count < self.max_chase_retries => {
                let adj = Decimal::new((self.chase_retry_count + 1) as i64, 3);
                let raw = match side {
                    Side::Sell => market_price * (Decimal::ONE - adj),
                    Side::Buy => market_price * (Decimal::ONE + adj),
                };
                let px = round_half_up(raw, self.cex_price_precision);
                eprintln!(
                    "[MACHINE] Chase #{}: CEX {} limit {} @ {} (ref {})",
                    self.chase_retry_count + 1,
                    side,
                    qty,
                    px,
                    market_price
                );
                Some(px)
            }
            Some(_) => {
                eprintln!(
                    "[MACHINE] Chase #{}: CEX {} market {}",
                    self.chase_retry_count + 1,
                    side,
                    qty
                );
                None
            }
        };

        match self.cex.place_order(side, qty, price).await {
            Ok(order_id) => {
                self.last_cum_filled.insert(order_id.clone(), Decimal::ZERO);
                self.active_order_id = Some(order_id);
                self.active_order_time_ms = now_ms;
                self.chase_retry_count += 1;
            }
            Err(e) => {
                // No order id means no event will ever arrive; leave the
                // slot empty and let the tick sweep re-attempt after the
                // timeout.
                eprintln!("[MACHINE] Chase placement failed: {}", e);
                self.active_order_id = None;
                self.active_order_time_ms = now_ms;
            }
        }
    }

    // ─── Timeout sweep (1 Hz) ───

    pub async fn on_tick(&mut self, now_ms: i64) {
        let timed_out = now_ms - self.active_order_time_ms > self.order_timeout_ms;

        if let Some(active) = self.active_order_id.clone() {
            if !timed_out {
                return;
            }
            match self.state {
                StrategyState::OpenLeg1Waiting => {
                    eprintln!("[MACHINE] Leg1 order {} timed out, canceling", active);
                    self.update_state(StrategyState::OpenLeg1Canceling);
                    self.spawn_cancel(Venue::Dex, active);
                }
                StrategyState::CloseLeg1Waiting => {
                    eprintln!("[MACHINE] Leg1 order {} timed out, canceling", active);
                    self.update_state(StrategyState::CloseLeg1Canceling);
                    self.spawn_cancel(Venue::Dex, active);
                }
                s if s.is_leg2() => {
                    eprintln!("[MACHINE] Leg2 order {} timed out, canceling", active);
                    self.spawn_cancel(Venue::Cex, active);
                }
                _ => {}
            }
            return;
        }

        // No active order: recover a chase whose placement failed.
        if timed_out {
            let remaining = self.leg1_filled_qty - self.leg2_filled_qty;
            match self.state {
                StrategyState::OpenLeg2Chasing => {
                    if remaining > QTY_EPS {
                        eprintln!("[MACHINE] Re-attempting failed chase, remaining {}", remaining);
                        self.chase_step(Side::Sell, remaining, now_ms).await;
                    } else {
                        self.complete_open_episode();
                    }
                }
                StrategyState::CloseLeg2Chasing => {
                    if remaining > QTY_EPS {
                        eprintln!("[MACHINE] Re-attempting failed chase, remaining {}", remaining);
                        self.chase_step(Side::Buy, remaining, now_ms).await;
                    } else {
                        self.complete_close_episode();
                    }
                }
                _ => {}
            }
        }
    }
}
