use rust_decimal::Decimal;
use serde::Serialize;

/// Outcome of a submission ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub signature: Option<String>,
    pub confirmed: bool,
    pub error: Option<String>,
    pub attempt: u32,
}

impl ExecutionResult {
    pub fn confirmed(signature: String, attempt: u32) -> Self {
        Self {
            signature: Some(signature),
            confirmed: true,
            error: None,
            attempt,
        }
    }

    pub fn failed(error: Option<String>, attempt: u32) -> Self {
        Self {
            signature: None,
            confirmed: false,
            error,
            attempt,
        }
    }
}

/// Realized balance changes of a confirmed transaction, read back from chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FillDeltas {
    /// Payer SOL delta (post − pre). Negative when SOL was spent.
    pub sol_delta: Decimal,
    /// Aggregate token delta across payer-owned accounts for the mint.
    pub token_delta: Option<Decimal>,
}

impl FillDeltas {
    /// Average SOL paid per token for a buy fill, if the fill is complete.
    pub fn entry_price(&self) -> Option<Decimal> {
        let tokens = self.token_delta?;
        if tokens <= Decimal::ZERO || self.sol_delta >= Decimal::ZERO {
            return None;
        }
        Some(-self.sol_delta / tokens)
    }
}
