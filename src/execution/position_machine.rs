use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::db::PositionStore;
use crate::models::{Position, PositionState, TakeProfitRung};

/// Audit data attached to a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionMeta {
    pub entry_signature: Option<String>,
    pub exit_signature: Option<String>,
    pub exit_reason: Option<String>,
    pub error: Option<String>,
}

impl TransitionMeta {
    pub fn entry(signature: Option<String>) -> Self {
        Self {
            entry_signature: signature,
            ..Self::default()
        }
    }

    pub fn exit(signature: Option<String>, reason: &str) -> Self {
        Self {
            exit_signature: signature,
            exit_reason: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to} for position {id}")]
    Illegal {
        id: Uuid,
        from: PositionState,
        to: PositionState,
    },

    #[error("position {0} is closed")]
    Closed(Uuid),
}

/// Owns position lifecycle changes and writes every change through to the
/// store.
///
/// A store failure after a change is logged and not returned: the caller's
/// in-memory position already reflects the change, and the next save writes
/// the full row again.
pub struct PositionMachine {
    store: Arc<dyn PositionStore>,
}

impl PositionMachine {
    pub fn new(store: Arc<dyn PositionStore>) -> Self {
        Self { store }
    }

    /// Create a PENDING_ENTRY position and persist it. Fails only if the
    /// initial write fails, in which case nothing was committed.
    pub async fn create(
        &self,
        mint: &str,
        size_sol: Decimal,
        stop_loss_pct: Decimal,
        take_profits: Vec<TakeProfitRung>,
        trail_mode: &str,
    ) -> anyhow::Result<Position> {
        let now = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            mint: mint.to_string(),
            state: PositionState::PendingEntry,
            size_sol,
            stop_loss_pct,
            take_profits,
            trail_mode: trail_mode.to_string(),
            tokens: None,
            entry_price: None,
            tp_filled: 0,
            peak_pnl_pct: None,
            entry_signature: None,
            exit_signature: None,
            exit_reason: None,
            last_error: None,
            entry_timestamp: None,
            created_at: now,
            updated_at: now,
        };

        self.store.save_position(&position).await?;
        tracing::info!(
            position_id = %position.id,
            mint,
            size_sol = %size_sol,
            "Position created (PENDING_ENTRY)"
        );
        Ok(position)
    }

    /// Move `position` to `next`, merge `meta`, and persist.
    ///
    /// Entering OPEN stamps `entry_timestamp` the first time only.
    pub async fn transition(
        &self,
        position: &mut Position,
        next: PositionState,
        meta: TransitionMeta,
    ) -> Result<(), TransitionError> {
        let from = position.state;
        if !from.can_transition_to(next) {
            tracing::error!(
                position_id = %position.id,
                mint = %position.mint,
                %from,
                to = %next,
                "Rejected illegal position transition"
            );
            return Err(TransitionError::Illegal {
                id: position.id,
                from,
                to: next,
            });
        }

        let now = Utc::now();
        position.state = next;
        position.updated_at = now;
        if next == PositionState::Open && position.entry_timestamp.is_none() {
            position.entry_timestamp = Some(now);
        }
        if meta.entry_signature.is_some() {
            position.entry_signature = meta.entry_signature;
        }
        if meta.exit_signature.is_some() {
            position.exit_signature = meta.exit_signature;
        }
        if meta.exit_reason.is_some() {
            position.exit_reason = meta.exit_reason;
        }
        if meta.error.is_some() {
            position.last_error = meta.error;
        }

        tracing::info!(
            position_id = %position.id,
            mint = %position.mint,
            %from,
            to = %next,
            "Position transition"
        );
        self.write(position).await;
        Ok(())
    }

    /// Persist runtime fields (entry price, peak PnL, tokens) without a
    /// state change. Closed positions are immutable.
    pub async fn persist(&self, position: &mut Position) -> Result<(), TransitionError> {
        if position.state.is_terminal() {
            return Err(TransitionError::Closed(position.id));
        }
        position.updated_at = Utc::now();
        self.write(position).await;
        Ok(())
    }

    async fn write(&self, position: &Position) {
        if let Err(e) = self.store.save_position(position).await {
            tracing::error!(
                position_id = %position.id,
                mint = %position.mint,
                error = %e,
                "Failed to persist position"
            );
        }
    }
}
