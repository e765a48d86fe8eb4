//! Fraud heuristics: amount-mismatch tolerance and deposit velocity.

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::ports::{LedgerStore, VelocityCounts};

/// Velocity limits over the trailing window. Exceeding any of them flags the
/// deposit as suspicious; it never blocks initiation.
#[derive(Debug, Clone)]
pub struct VelocityThresholds {
    pub max_deposits_by_ip: i64,
    pub max_deposits_by_user: i64,
    pub max_large_deposits_by_user: i64,
    pub large_amount: BigDecimal,
    pub window_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SuspicionReport {
    pub is_suspicious: bool,
    pub metrics: VelocityCounts,
}

/// Mismatch tolerance for a gateway charge: 1% of the expected total, with a
/// 0.5 GHS floor to absorb rounding on small deposits.
pub fn amount_tolerance(expected: &BigDecimal) -> BigDecimal {
    let floor = BigDecimal::from(5) / BigDecimal::from(10);
    let one_percent = expected.clone() / BigDecimal::from(100);
    if one_percent > floor { one_percent } else { floor }
}

/// True when the amount actually paid is close enough to the expected total.
/// Anything outside the tolerance is treated as fraud, however near.
pub fn amount_within_tolerance(expected: &BigDecimal, actual: &BigDecimal) -> bool {
    (expected.clone() - actual.clone()).abs() <= amount_tolerance(expected)
}

/// Counts recent deposit activity for the user and originating IP. Read-only;
/// a ledger error degrades to "not suspicious" so the check can never block a
/// deposit.
pub async fn check_suspicious(
    ledger: &dyn LedgerStore,
    thresholds: &VelocityThresholds,
    user_id: Uuid,
    client_ip: &str,
) -> SuspicionReport {
    let window_start = Utc::now() - Duration::hours(thresholds.window_hours);

    let metrics = match ledger
        .velocity_counts(user_id, client_ip, window_start, &thresholds.large_amount)
        .await
    {
        Ok(counts) => counts,
        Err(err) => {
            tracing::error!(%user_id, error = %err, "velocity check failed, skipping");
            return SuspicionReport {
                is_suspicious: false,
                metrics: VelocityCounts::default(),
            };
        }
    };

    let is_suspicious = metrics.deposits_by_ip > thresholds.max_deposits_by_ip
        || metrics.deposits_by_user > thresholds.max_deposits_by_user
        || metrics.large_deposits_by_user > thresholds.max_large_deposits_by_user;

    if is_suspicious {
        tracing::warn!(
            %user_id,
            client_ip,
            deposits_by_ip = metrics.deposits_by_ip,
            deposits_by_user = metrics.deposits_by_user,
            large_deposits_by_user = metrics.large_deposits_by_user,
            "suspicious deposit velocity"
        );
    }

    SuspicionReport {
        is_suspicious,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn tolerance_has_a_half_cedi_floor() {
        // 1% of 10 is 0.1, the floor wins
        assert_eq!(amount_tolerance(&dec("10")), dec("0.5"));
    }

    #[test]
    fn tolerance_grows_with_the_expected_amount() {
        assert_eq!(amount_tolerance(&dec("100")), dec("1"));
        assert_eq!(amount_tolerance(&dec("1000")), dec("10"));
    }

    #[test]
    fn payment_inside_tolerance_is_accepted() {
        // expected 100 -> tolerance max(0.5, 1.0) = 1.0
        assert!(amount_within_tolerance(&dec("100"), &dec("100.49")));
        assert!(amount_within_tolerance(&dec("100"), &dec("99.51")));
        assert!(amount_within_tolerance(&dec("100"), &dec("101")));
    }

    #[test]
    fn payment_outside_tolerance_is_rejected() {
        assert!(!amount_within_tolerance(&dec("100"), &dec("101.51")));
        assert!(!amount_within_tolerance(&dec("100"), &dec("98.99")));
        assert!(!amount_within_tolerance(&dec("20.60"), &dec("15")));
    }

    #[test]
    fn underpayment_and_overpayment_are_symmetric() {
        let expected = dec("200");
        assert!(amount_within_tolerance(&expected, &dec("198.01")));
        assert!(amount_within_tolerance(&expected, &dec("201.99")));
        assert!(!amount_within_tolerance(&expected, &dec("197.99")));
        assert!(!amount_within_tolerance(&expected, &dec("202.01")));
    }
}
