use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of a position.
///
/// `Idle` is reserved and never entered by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Idle,
    PendingEntry,
    Open,
    PendingExit,
    Closed,
}

/// Every edge the state machine accepts. Anything else is rejected.
const TRANSITIONS: &[(PositionState, PositionState)] = &[
    (PositionState::PendingEntry, PositionState::Open),
    (PositionState::PendingEntry, PositionState::Closed),
    (PositionState::Open, PositionState::PendingExit),
    (PositionState::PendingExit, PositionState::Open),
    (PositionState::PendingExit, PositionState::Closed),
];

impl PositionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionState::Idle => "IDLE",
            PositionState::PendingEntry => "PENDING_ENTRY",
            PositionState::Open => "OPEN",
            PositionState::PendingExit => "PENDING_EXIT",
            PositionState::Closed => "CLOSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed)
    }

    pub fn can_transition_to(&self, next: PositionState) -> bool {
        TRANSITIONS.contains(&(*self, next))
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IDLE" => Ok(PositionState::Idle),
            "PENDING_ENTRY" => Ok(PositionState::PendingEntry),
            "OPEN" => Ok(PositionState::Open),
            "PENDING_EXIT" => Ok(PositionState::PendingExit),
            "CLOSED" => Ok(PositionState::Closed),
            other => Err(anyhow::anyhow!("unknown position state: {other}")),
        }
    }
}

/// One step of the take-profit ladder.
///
/// Serialized with the short `pct` / `profit` keys used by `TP_LADDER_JSON`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitRung {
    /// Fraction of remaining holdings to sell when the rung fires.
    #[serde(rename = "pct")]
    pub sell_pct: Decimal,
    /// PnL fraction at which the rung fires.
    #[serde(rename = "profit")]
    pub profit_threshold: Decimal,
}

impl TakeProfitRung {
    pub fn new(sell_pct: Decimal, profit_threshold: Decimal) -> Self {
        Self {
            sell_pct,
            profit_threshold,
        }
    }
}

/// Check a ladder: sell fractions in (0, 1], thresholds strictly increasing.
pub fn validate_ladder(rungs: &[TakeProfitRung]) -> anyhow::Result<()> {
    let mut previous: Option<Decimal> = None;
    for (i, rung) in rungs.iter().enumerate() {
        if rung.sell_pct <= Decimal::ZERO || rung.sell_pct > Decimal::ONE {
            anyhow::bail!("take-profit rung {i}: sell pct {} not in (0, 1]", rung.sell_pct);
        }
        if let Some(prev) = previous {
            if rung.profit_threshold <= prev {
                anyhow::bail!(
                    "take-profit rung {i}: threshold {} not above previous {prev}",
                    rung.profit_threshold
                );
            }
        }
        previous = Some(rung.profit_threshold);
    }
    Ok(())
}

/// The unit of capital at risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub mint: String,
    pub state: PositionState,

    // Terms fixed at creation
    pub size_sol: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profits: Vec<TakeProfitRung>,
    pub trail_mode: String,

    // Fill / runtime
    pub tokens: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub tp_filled: usize,
    pub peak_pnl_pct: Option<Decimal>,

    // Audit
    pub entry_signature: Option<String>,
    pub exit_signature: Option<String>,
    pub exit_reason: Option<String>,
    pub last_error: Option<String>,

    pub entry_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// PnL fraction at `price`, or `None` while the entry price is unknown.
    pub fn pnl_pct(&self, price: Decimal) -> Option<Decimal> {
        let entry = self.entry_price?;
        if entry <= Decimal::ZERO {
            return None;
        }
        Some((price - entry) / entry)
    }

    /// The ladder rung that fires next, if any remain.
    pub fn next_rung(&self) -> Option<&TakeProfitRung> {
        self.take_profits.get(self.tp_filled)
    }
}
