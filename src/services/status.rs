use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;

use crate::execution::{EntryGate, PositionBook, TransactionEngine};

/// Operator view of the running engine.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub wallet: String,
    pub balance_sol: Option<Decimal>,
    pub dry_run: bool,
    pub live: bool,
    pub open_positions: usize,
    pub exposure_sol: Decimal,
    pub feed_connected: bool,
    pub entries_paused: bool,
}

/// Assembles [`StatusSnapshot`]s from the shared runtime handles.
#[derive(Clone)]
pub struct StatusProvider {
    wallet: Pubkey,
    engine: Option<Arc<TransactionEngine>>,
    book: PositionBook,
    gate: EntryGate,
    feed_connected: Arc<AtomicBool>,
    dry_run: bool,
    live: bool,
}

impl StatusProvider {
    pub fn new(
        wallet: Pubkey,
        engine: Option<Arc<TransactionEngine>>,
        book: PositionBook,
        gate: EntryGate,
        feed_connected: Arc<AtomicBool>,
        dry_run: bool,
        live: bool,
    ) -> Self {
        Self {
            wallet,
            engine,
            book,
            gate,
            feed_connected,
            dry_run,
            live,
        }
    }

    pub fn gate(&self) -> &EntryGate {
        &self.gate
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        let balance_sol = match &self.engine {
            Some(engine) => match engine.balance(&self.wallet).await {
                Ok(b) => Some(b),
                Err(e) => {
                    tracing::warn!(error = %e, "Status: balance lookup failed");
                    None
                }
            },
            None => None,
        };
        let exposure = self.book.exposure().await;

        StatusSnapshot {
            wallet: self.wallet.to_string(),
            balance_sol,
            dry_run: self.dry_run,
            live: self.live,
            open_positions: exposure.open_positions,
            exposure_sol: exposure.total_sol,
            feed_connected: self.feed_connected.load(Ordering::Relaxed),
            entries_paused: self.gate.is_paused(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RiskLimits;

    #[tokio::test]
    async fn test_snapshot_reflects_shared_flags() {
        let book = PositionBook::new();
        let gate = EntryGate::new();
        let feed = Arc::new(AtomicBool::new(false));
        let provider = StatusProvider::new(
            Pubkey::new_unique(),
            None,
            book.clone(),
            gate.clone(),
            feed.clone(),
            true,
            false,
        );

        book.try_reserve("m", Decimal::new(4, 1), &RiskLimits::default())
            .await
            .unwrap();
        gate.pause();
        feed.store(true, Ordering::Relaxed);

        let snap = provider.snapshot().await;
        assert_eq!(snap.open_positions, 1);
        assert_eq!(snap.exposure_sol, Decimal::new(4, 1));
        assert!(snap.entries_paused);
        assert!(snap.feed_connected);
        assert!(snap.dry_run);
        assert!(!snap.live);
        assert_eq!(snap.balance_sol, None);
    }
}
