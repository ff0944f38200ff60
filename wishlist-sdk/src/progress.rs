use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::objects::ItemSnapshot;

/// Funding target of an item: its target amount, else its price.
pub fn effective_target(target_amount: Option<Decimal>, price: Option<Decimal>) -> Option<Decimal> {
    target_amount.or(price).filter(|t| *t > Decimal::ZERO)
}

/// Progress of an item towards its [`effective_target`].
pub fn item_progress(item: &ItemSnapshot) -> f64 {
    progress_percent(
        item.collected_amount,
        effective_target(item.target_amount, item.price),
    )
}

/// Percentage of `target` covered by `collected`, clamped to `0..=100`.
///
/// Returns `0.0` when there is no positive target.
pub fn progress_percent(collected: Decimal, target: Option<Decimal>) -> f64 {
    let Some(target) = target.filter(|t| *t > Decimal::ZERO) else {
        return 0.0;
    };
    // Only a ratio far above 100% overflows.
    let percent = collected
        .checked_div(target)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ONE_HUNDRED)
        .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
        .round_dp(2);
    percent.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rub(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_progress_is_clamped() {
        let target = Some(rub(10_000));
        assert_eq!(progress_percent(rub(3_000), target), 30.0);
        assert_eq!(progress_percent(rub(11_000), target), 100.0);
        assert_eq!(progress_percent(Decimal::ZERO, target), 0.0);
    }

    #[test]
    fn test_progress_without_target() {
        assert_eq!(progress_percent(rub(500), None), 0.0);
        assert_eq!(progress_percent(rub(500), Some(Decimal::ZERO)), 0.0);
    }

    #[test]
    fn test_price_is_the_fallback_target() {
        assert_eq!(effective_target(None, Some(rub(200))), Some(rub(200)));
        assert_eq!(effective_target(Some(rub(100)), Some(rub(200))), Some(rub(100)));
        assert_eq!(effective_target(None, None), None);
    }

    #[test]
    fn test_progress_with_a_tiny_target_does_not_overflow() {
        let collected: Decimal = "50000000000000000000000000000".parse().unwrap();
        assert_eq!(progress_percent(collected, Some(Decimal::new(1, 2))), 100.0);
        assert_eq!(progress_percent(Decimal::MAX, Some(Decimal::new(1, 28))), 100.0);
    }

    #[test]
    fn test_progress_rounds_to_two_places() {
        assert_eq!(progress_percent(rub(1), Some(rub(3))), 33.33);
    }
}
