use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TakeProfitRung;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataCompleteness {
    Low,
    Medium,
    High,
}

/// Verdict of the risk layer for a mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    /// 0..=100, higher is safer.
    pub score: i32,
    pub allow: bool,
    pub reasons: Vec<String>,
    pub data_completeness: DataCompleteness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Enter,
    Skip,
}

/// Optional stop-loss / ladder override suggested by a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopOverride {
    pub stop_loss_pct: Option<Decimal>,
    pub take_profits: Option<Vec<TakeProfitRung>>,
}

/// Verdict of the strategy layer for a mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub action: Action,
    pub confidence: Decimal,
    pub size_multiplier: Decimal,
    pub suggested: Option<StopOverride>,
    pub rationale: String,
}

impl StrategySignal {
    pub fn skip(confidence: Decimal, rationale: impl Into<String>) -> Self {
        Self {
            action: Action::Skip,
            confidence,
            size_multiplier: Decimal::ONE,
            suggested: None,
            rationale: rationale.into(),
        }
    }

    pub fn is_enter(&self) -> bool {
        self.action == Action::Enter
    }
}
