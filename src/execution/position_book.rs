use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::models::{Position, PositionState};

use super::risk_manager::{check_exposure, AdmissionReject, ExposureSnapshot, RiskLimits};

/// A live position shared between the entry path and the exit manager.
pub type SharedPosition = Arc<Mutex<Position>>;

/// In-memory mirror of committed capital, keyed by mint.
///
/// A mint is *reserved* once admission commits to it, before any
/// transaction is sent, so concurrent candidates cannot double-commit the
/// same slot or the same exposure. The reservation becomes a position on
/// `attach` and is dropped on `release` when the position closes.
#[derive(Clone, Default)]
pub struct PositionBook {
    inner: Arc<Mutex<BookInner>>,
}

#[derive(Default)]
struct BookInner {
    /// mint → notional committed in SOL.
    active: HashMap<String, Decimal>,
    /// mint → live position.
    positions: HashMap<String, SharedPosition>,
}

impl BookInner {
    fn publish(&self) {
        metrics::gauge!("open_positions").set(self.active.len() as f64);
    }

    fn exposure(&self) -> ExposureSnapshot {
        ExposureSnapshot {
            open_positions: self.active.len(),
            total_sol: self.active.values().copied().sum(),
        }
    }
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-seed from persisted non-closed positions at startup.
    pub async fn rebuild(&self, positions: Vec<Position>) {
        let mut inner = self.inner.lock().await;
        inner.active.clear();
        inner.positions.clear();
        for pos in positions {
            if pos.state == PositionState::Closed {
                continue;
            }
            inner.active.insert(pos.mint.clone(), pos.size_sol);
            inner
                .positions
                .insert(pos.mint.clone(), Arc::new(Mutex::new(pos)));
        }
        inner.publish();
        let exposure = inner.exposure();
        tracing::info!(
            open_positions = exposure.open_positions,
            total_sol = %exposure.total_sol,
            "Position book rebuilt"
        );
    }

    pub async fn is_active(&self, mint: &str) -> bool {
        self.inner.lock().await.active.contains_key(mint)
    }

    pub async fn exposure(&self) -> ExposureSnapshot {
        self.inner.lock().await.exposure()
    }

    /// Duplicate guard plus exposure caps, checked and committed atomically.
    pub async fn try_reserve(
        &self,
        mint: &str,
        size: Decimal,
        limits: &RiskLimits,
    ) -> Result<(), AdmissionReject> {
        let mut inner = self.inner.lock().await;
        if inner.active.contains_key(mint) {
            return Err(AdmissionReject::DuplicatePosition);
        }
        check_exposure(size, &inner.exposure(), limits)?;

        inner.active.insert(mint.to_string(), size);
        inner.publish();
        tracing::debug!(mint, size = %size, "Position book: reserved");
        Ok(())
    }

    /// Bind a created position to its mint's reservation.
    pub async fn attach(&self, position: Position) -> SharedPosition {
        let mint = position.mint.clone();
        let size = position.size_sol;
        let shared = Arc::new(Mutex::new(position));
        let mut inner = self.inner.lock().await;
        inner.active.entry(mint.clone()).or_insert(size);
        inner.positions.insert(mint, shared.clone());
        inner.publish();
        shared
    }

    /// Free the mint's slot and notional (entry failed or position closed).
    pub async fn release(&self, mint: &str) {
        let mut inner = self.inner.lock().await;
        inner.positions.remove(mint);
        if let Some(size) = inner.active.remove(mint) {
            tracing::debug!(mint, size = %size, "Position book: released");
        }
        inner.publish();
    }

    /// Handles of every tracked position, in no particular order.
    pub async fn handles(&self) -> Vec<SharedPosition> {
        self.inner.lock().await.positions.values().cloned().collect()
    }

    /// Mints holding a reservation or a position.
    pub async fn active_mints(&self) -> HashSet<String> {
        self.inner.lock().await.active.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.active.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
