use rust_decimal::Decimal;

use crate::types::OrderEvent;

/// Fold a CEX (Binance futures) ORDER_TRADE_UPDATE status into a
/// terminal event. `cum` is the report's cumulative filled quantity
/// (`o.z`). Progress statuses (NEW, PARTIALLY_FILLED still resting)
/// return None; the machine only acts on terminal states.
pub fn normalize_cex_status(status: &str, cum: Decimal) -> Option<OrderEvent> {
    match status {
        "FILLED" => Some(OrderEvent::AllFilled(cum)),
        "CANCELED" | "EXPIRED" | "REJECTED" => {
            if cum > Decimal::ZERO {
                Some(OrderEvent::PartialFilledCanceled(cum))
            } else {
                Some(OrderEvent::AllCanceled)
            }
        }
        _ => None,
    }
}

/// Fold a DEX (Hyperliquid) orderUpdates status into a terminal event.
/// A "filled" report is terminal only once `cum == sz` (the venue also
/// emits it for partial progress); cancel-family statuses are terminal
/// regardless.
pub fn normalize_dex_status(status: &str, cum: Decimal, sz: Decimal) -> Option<OrderEvent> {
    match status {
        "filled" => {
            if cum == sz {
                Some(OrderEvent::AllFilled(cum))
            } else {
                None
            }
        }
        "canceled" | "rejected" | "expired" | "marginCanceled" => {
            if cum > Decimal::ZERO {
                Some(OrderEvent::PartialFilledCanceled(cum))
            } else {
                Some(OrderEvent::AllCanceled)
            }
        }
        _ => None,
    }
}
