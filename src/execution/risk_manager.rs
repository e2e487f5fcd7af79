use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Portfolio-level limits enforced at admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Max concurrent non-closed positions (default 3).
    pub max_open_positions: usize,
    /// Max summed notional across non-closed positions, in SOL (default 1.2).
    pub max_total_exposure_sol: Decimal,
    /// Native balance that must remain after an entry, in SOL (default 0.05).
    pub min_sol_balance: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_open_positions: 3,
            max_total_exposure_sol: Decimal::new(12, 1), // 1.2
            min_sol_balance: Decimal::new(5, 2),         // 0.05
        }
    }
}

/// Current committed capital, reservations included.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ExposureSnapshot {
    pub open_positions: usize,
    pub total_sol: Decimal,
}

/// Why an entry candidate was not admitted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdmissionReject {
    #[error("entries are paused")]
    Paused,

    #[error("entry cooldown active")]
    Cooldown,

    #[error("mint already has a live position")]
    DuplicatePosition,

    #[error("insufficient trade history: {have}/{need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("risk denied: {}", reasons.join(", "))]
    RiskDenied { reasons: Vec<String> },

    #[error("strategy skipped: {0}")]
    StrategySkip(String),

    #[error("too many open positions: {current}/{max}")]
    TooManyPositions { current: usize, max: usize },

    #[error("exposure cap: {current} + {size} > {cap} SOL")]
    ExposureCap {
        current: Decimal,
        size: Decimal,
        cap: Decimal,
    },

    #[error("wallet reserve: balance {balance} − size {size} < reserve {reserve} SOL")]
    WalletReserve {
        balance: Decimal,
        size: Decimal,
        reserve: Decimal,
    },

    #[error("wallet balance unavailable: {0}")]
    BalanceUnavailable(String),
}

impl AdmissionReject {
    /// Stable label for metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionReject::Paused => "paused",
            AdmissionReject::Cooldown => "cooldown",
            AdmissionReject::DuplicatePosition => "duplicate",
            AdmissionReject::InsufficientHistory { .. } => "history",
            AdmissionReject::RiskDenied { .. } => "risk",
            AdmissionReject::StrategySkip(_) => "strategy",
            AdmissionReject::TooManyPositions { .. } => "max_positions",
            AdmissionReject::ExposureCap { .. } => "exposure",
            AdmissionReject::WalletReserve { .. } => "wallet_reserve",
            AdmissionReject::BalanceUnavailable(_) => "balance_unavailable",
        }
    }
}

/// Count and notional caps. Both must hold with the candidate included.
pub fn check_exposure(
    size: Decimal,
    exposure: &ExposureSnapshot,
    limits: &RiskLimits,
) -> Result<(), AdmissionReject> {
    if exposure.open_positions + 1 > limits.max_open_positions {
        return Err(AdmissionReject::TooManyPositions {
            current: exposure.open_positions,
            max: limits.max_open_positions,
        });
    }

    if exposure.total_sol + size > limits.max_total_exposure_sol {
        return Err(AdmissionReject::ExposureCap {
            current: exposure.total_sol,
            size,
            cap: limits.max_total_exposure_sol,
        });
    }

    Ok(())
}

/// The wallet must keep `min_sol_balance` after paying for the entry.
pub fn check_wallet_reserve(
    balance: Decimal,
    size: Decimal,
    limits: &RiskLimits,
) -> Result<(), AdmissionReject> {
    if balance - size < limits.min_sol_balance {
        return Err(AdmissionReject::WalletReserve {
            balance,
            size,
            reserve: limits.min_sol_balance,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn exposure(open: usize, total: Decimal) -> ExposureSnapshot {
        ExposureSnapshot {
            open_positions: open,
            total_sol: total,
        }
    }

    #[test]
    fn test_exposure_passes() {
        let result = check_exposure(
            Decimal::new(4, 1),
            &exposure(1, Decimal::new(4, 1)),
            &RiskLimits::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_too_many_positions() {
        let result = check_exposure(
            Decimal::new(1, 1),
            &exposure(3, Decimal::new(3, 1)),
            &RiskLimits::default(),
        );
        assert!(matches!(result, Err(AdmissionReject::TooManyPositions { current: 3, max: 3 })));
    }

    #[test]
    fn test_exposure_cap_is_inclusive_of_candidate() {
        // 0.9 + 0.4 = 1.3 > 1.2
        let result = check_exposure(
            Decimal::new(4, 1),
            &exposure(2, Decimal::new(9, 1)),
            &RiskLimits::default(),
        );
        assert!(matches!(result, Err(AdmissionReject::ExposureCap { .. })));

        // 0.8 + 0.4 = 1.2, exactly at the cap
        let result = check_exposure(
            Decimal::new(4, 1),
            &exposure(2, Decimal::new(8, 1)),
            &RiskLimits::default(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_wallet_reserve() {
        let limits = RiskLimits::default();
        assert!(check_wallet_reserve(Decimal::new(45, 2), Decimal::new(4, 1), &limits).is_ok());
        let result = check_wallet_reserve(Decimal::new(44, 2), Decimal::new(4, 1), &limits);
        assert!(matches!(result, Err(AdmissionReject::WalletReserve { .. })));
    }

    #[test]
    fn test_reject_codes_are_distinct() {
        let rejects = [
            AdmissionReject::Paused,
            AdmissionReject::Cooldown,
            AdmissionReject::DuplicatePosition,
            AdmissionReject::InsufficientHistory { have: 1, need: 5 },
            AdmissionReject::RiskDenied { reasons: vec![] },
            AdmissionReject::StrategySkip(String::new()),
            AdmissionReject::TooManyPositions { current: 0, max: 0 },
            AdmissionReject::ExposureCap {
                current: Decimal::ZERO,
                size: Decimal::ZERO,
                cap: Decimal::ZERO,
            },
            AdmissionReject::WalletReserve {
                balance: Decimal::ZERO,
                size: Decimal::ZERO,
                reserve: Decimal::ZERO,
            },
            AdmissionReject::BalanceUnavailable(String::new()),
        ];
        let mut codes: Vec<&str> = rejects.iter().map(|r| r.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), rejects.len());
    }
}
