use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Entry sizing bounds, in SOL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingLimits {
    pub base: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

impl Default for SizingLimits {
    fn default() -> Self {
        Self {
            base: Decimal::new(4, 1),  // 0.4
            min: Decimal::new(1, 1),   // 0.1
            max: Decimal::new(75, 2),  // 0.75
        }
    }
}

/// Base size scaled by the strategy multiplier, clamped to `[min, max]`.
pub fn calculate_size(limits: &SizingLimits, multiplier: Decimal) -> Decimal {
    let raw = limits.base * multiplier;
    raw.max(limits.min).min(limits.max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiplier_scales_base() {
        let size = calculate_size(&SizingLimits::default(), Decimal::new(15, 1));
        assert_eq!(size, Decimal::new(6, 1)); // 0.4 × 1.5
    }

    #[test]
    fn test_clamped_to_max() {
        let size = calculate_size(&SizingLimits::default(), Decimal::from(3));
        assert_eq!(size, Decimal::new(75, 2));
    }

    #[test]
    fn test_clamped_to_min() {
        let size = calculate_size(&SizingLimits::default(), Decimal::new(1, 1));
        assert_eq!(size, Decimal::new(1, 1));
    }

    #[test]
    fn test_zero_multiplier_still_min() {
        let size = calculate_size(&SizingLimits::default(), Decimal::ZERO);
        assert_eq!(size, Decimal::new(1, 1));
    }
}
