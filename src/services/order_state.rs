//! Order and item state machine, kitchen-display status and pricing.
//!
//! Everything here is pure; the services load rows, ask these functions
//! whether a change is legal and what the new pricing is, then persist the
//! result in one transaction.
//!
//! Item edges:
//! ```text
//! awaiting_payment ──► pending ──► preparing ──► ready ──► delivered
//!        │               │            │           │
//!        └───────────────┴────────────┴───────────┴──► cancelled (reason required)
//! ```
//!
//! Order edges:
//! ```text
//! open ──► awaiting_payment ──► paid
//!   │             │
//!   └─────────────┴──► cancelled (reason required)
//! ```

use crate::{
    error::{AppError, AppResult},
    models::{ItemStatus, KitchenStatus, OrderPricing, OrderStatus},
};

/// Checks an item edge. A cancellation must carry a non-blank reason.
pub fn validate_item_transition(
    from: ItemStatus,
    to: ItemStatus,
    deletion_reason: Option<&str>,
) -> AppResult<()> {
    let allowed = match (from, to) {
        (ItemStatus::AwaitingPayment, ItemStatus::Pending)
        | (ItemStatus::Pending, ItemStatus::Preparing)
        | (ItemStatus::Preparing, ItemStatus::Ready)
        | (ItemStatus::Ready, ItemStatus::Delivered) => true,
        (from, ItemStatus::Cancelled) => !from.is_terminal(),
        _ => false,
    };
    if !allowed {
        return Err(AppError::invalid_transition(from, to));
    }
    if to == ItemStatus::Cancelled && is_blank(deletion_reason) {
        return Err(AppError::CancellationReasonRequired);
    }
    Ok(())
}

/// Checks an explicit order edge (operator or gateway driven).
pub fn validate_order_transition(
    from: OrderStatus,
    to: OrderStatus,
    cancellation_reason: Option<&str>,
) -> AppResult<()> {
    let allowed = matches!(
        (from, to),
        (OrderStatus::Open, OrderStatus::AwaitingPayment)
            | (OrderStatus::AwaitingPayment, OrderStatus::Paid)
            | (OrderStatus::Open, OrderStatus::Cancelled)
            | (OrderStatus::AwaitingPayment, OrderStatus::Cancelled)
    );
    if !allowed {
        return Err(AppError::invalid_transition(from, to));
    }
    if to == OrderStatus::Cancelled && is_blank(cancellation_reason) {
        return Err(AppError::CancellationReasonRequired);
    }
    Ok(())
}

/// An open order moves to `awaiting_payment` once nothing is left for the
/// kitchen to do.
pub fn should_await_payment(order_status: OrderStatus, items: &[ItemStatus]) -> bool {
    order_status == OrderStatus::Open
        && !items.is_empty()
        && items.iter().all(|status| status.is_terminal())
}

/// Summary status for kitchen screens, computed from non-cancelled items.
///
/// Precedence: no live items, any preparing, all ready, all pending,
/// all delivered, then `pending` for every other mix.
pub fn kitchen_status(items: &[ItemStatus]) -> KitchenStatus {
    let live: Vec<ItemStatus> = items
        .iter()
        .copied()
        .filter(|status| *status != ItemStatus::Cancelled)
        .collect();

    if live.is_empty() {
        return KitchenStatus::Pending;
    }
    if live.contains(&ItemStatus::Preparing) {
        return KitchenStatus::Preparing;
    }
    let all = |wanted: ItemStatus| live.iter().all(|status| *status == wanted);
    if all(ItemStatus::Ready) {
        KitchenStatus::Ready
    } else if all(ItemStatus::Pending) {
        KitchenStatus::Pending
    } else if all(ItemStatus::Delivered) {
        KitchenStatus::Delivered
    } else {
        // TODO: mixed states (e.g. pending + delivered) fall back to pending until
        // kitchen UX confirms the intended precedence.
        KitchenStatus::Pending
    }
}

/// A priced line: unit price, quantity and status.
pub type PricedLine = (i64, i32, ItemStatus);

/// Recomputes pricing from the item lines, skipping cancelled ones.
/// Tax is `subtotal * tax_rate_bps / 10_000`, rounded half-up.
///
/// Amounts that do not fit in minor units fail with `BadRequest`.
pub fn compute_pricing(lines: &[PricedLine], tax_rate_bps: i64) -> AppResult<OrderPricing> {
    let overflow = || AppError::BadRequest("order total is out of range".into());
    let subtotal = lines
        .iter()
        .filter(|(_, _, status)| *status != ItemStatus::Cancelled)
        .try_fold(0i64, |sum, (price, quantity, _)| {
            price
                .checked_mul(i64::from(*quantity))
                .and_then(|line_total| sum.checked_add(line_total))
        })
        .ok_or_else(overflow)?;
    let tax = subtotal
        .checked_mul(tax_rate_bps)
        .and_then(|scaled| scaled.checked_add(5_000))
        .map(|scaled| scaled / 10_000)
        .ok_or_else(overflow)?;
    let total = subtotal.checked_add(tax).ok_or_else(overflow)?;
    Ok(OrderPricing {
        subtotal,
        tax,
        total,
    })
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(str::trim).is_none_or(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ItemStatus::*;

    #[test]
    fn forward_item_edges_are_allowed() {
        assert!(validate_item_transition(AwaitingPayment, Pending, None).is_ok());
        assert!(validate_item_transition(Pending, Preparing, None).is_ok());
        assert!(validate_item_transition(Preparing, Ready, None).is_ok());
        assert!(validate_item_transition(Ready, Delivered, None).is_ok());
    }

    #[test]
    fn skipping_or_reversing_is_rejected() {
        for (from, to) in [
            (Pending, Ready),
            (Pending, Delivered),
            (Ready, Preparing),
            (AwaitingPayment, Preparing),
            (Delivered, Pending),
            (Pending, AwaitingPayment),
        ] {
            assert!(
                matches!(
                    validate_item_transition(from, to, None),
                    Err(AppError::InvalidTransition { .. })
                ),
                "{from} -> {to} should be rejected"
            );
        }
    }

    #[test]
    fn cancellation_needs_reason_and_live_item() {
        assert!(matches!(
            validate_item_transition(Pending, Cancelled, None),
            Err(AppError::CancellationReasonRequired)
        ));
        assert!(matches!(
            validate_item_transition(Pending, Cancelled, Some("   ")),
            Err(AppError::CancellationReasonRequired)
        ));
        assert!(validate_item_transition(Ready, Cancelled, Some("dropped")).is_ok());
        assert!(validate_item_transition(AwaitingPayment, Cancelled, Some("changed mind")).is_ok());
        assert!(matches!(
            validate_item_transition(Delivered, Cancelled, Some("late")),
            Err(AppError::InvalidTransition { .. })
        ));
        assert!(matches!(
            validate_item_transition(Cancelled, Cancelled, Some("again")),
            Err(AppError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn order_edges() {
        use OrderStatus as S;
        assert!(validate_order_transition(S::AwaitingPayment, S::Paid, None).is_ok());
        assert!(validate_order_transition(S::Open, S::Cancelled, Some("walked out")).is_ok());
        assert!(matches!(
            validate_order_transition(S::Open, S::Cancelled, None),
            Err(AppError::CancellationReasonRequired)
        ));
        assert!(validate_order_transition(S::Open, S::Paid, None).is_err());
        assert!(validate_order_transition(S::Paid, S::Cancelled, Some("refund")).is_err());
        assert!(validate_order_transition(S::Cancelled, S::Open, None).is_err());
    }

    #[test]
    fn await_payment_once_every_item_is_done() {
        assert!(should_await_payment(
            OrderStatus::Open,
            &[Delivered, Cancelled, Delivered]
        ));
        assert!(!should_await_payment(OrderStatus::Open, &[Delivered, Ready]));
        assert!(!should_await_payment(OrderStatus::AwaitingPayment, &[Delivered]));
        assert!(!should_await_payment(OrderStatus::Open, &[]));
    }

    #[test]
    fn kitchen_status_precedence() {
        assert_eq!(kitchen_status(&[]), KitchenStatus::Pending);
        assert_eq!(kitchen_status(&[Cancelled]), KitchenStatus::Pending);
        assert_eq!(kitchen_status(&[Ready, Preparing, Delivered]), KitchenStatus::Preparing);
        assert_eq!(kitchen_status(&[Ready, Ready, Cancelled]), KitchenStatus::Ready);
        assert_eq!(kitchen_status(&[Pending, Pending]), KitchenStatus::Pending);
        assert_eq!(kitchen_status(&[Delivered, Cancelled]), KitchenStatus::Delivered);
        assert_eq!(kitchen_status(&[Pending, Delivered]), KitchenStatus::Pending);
        assert_eq!(kitchen_status(&[Ready, Delivered]), KitchenStatus::Pending);
    }

    #[test]
    fn kitchen_status_ignores_item_order() {
        let a = [Pending, Preparing, Ready];
        let b = [Ready, Pending, Preparing];
        assert_eq!(kitchen_status(&a), kitchen_status(&b));
    }

    #[test]
    fn pricing_skips_cancelled_lines() {
        let lines = [(1_200, 2, Pending), (500, 1, Cancelled), (350, 3, Delivered)];
        let pricing = compute_pricing(&lines, 1_000).unwrap();
        assert_eq!(pricing.subtotal, 3_450);
        assert_eq!(pricing.tax, 345);
        assert_eq!(pricing.total, pricing.subtotal + pricing.tax);
    }

    #[test]
    fn tax_rounds_half_up() {
        let pricing = compute_pricing(&[(5, 1, Pending)], 1_000).unwrap();
        assert_eq!(pricing.tax, 1);
        let pricing = compute_pricing(&[(4, 1, Pending)], 1_000).unwrap();
        assert_eq!(pricing.tax, 0);
        let pricing = compute_pricing(&[], 1_000).unwrap();
        assert_eq!(pricing, OrderPricing::default());
    }

    #[test]
    fn pricing_overflow_is_rejected() {
        let huge = compute_pricing(&[(5_000_000, i32::MAX, AwaitingPayment)], 1_000);
        assert!(matches!(huge, Err(AppError::BadRequest(_))));

        let many = compute_pricing(&[(i64::MAX / 2, 1, Pending), (i64::MAX / 2, 2, Pending)], 0);
        assert!(matches!(many, Err(AppError::BadRequest(_))));

        // The subtotal fits but the tax does not.
        let taxed = compute_pricing(&[(i64::MAX / 1_000, 1, Pending)], 10_000);
        assert!(matches!(taxed, Err(AppError::BadRequest(_))));

        // Cancelled lines are never multiplied out.
        let skipped = compute_pricing(&[(i64::MAX, i32::MAX, Cancelled), (100, 1, Pending)], 0).unwrap();
        assert_eq!(skipped.total, 100);
    }
}
