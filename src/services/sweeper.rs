use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::gauge;
use tokio::time::interval;

use crate::config::AppConfig;
use crate::execution::{EntryPipeline, PositionBook};
use crate::ingestion::MarketState;
use crate::services::ExitManager;

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub every: Duration,
    /// Mints untouched for this long are forgotten, unless a position holds them.
    pub idle: chrono::Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            every: Duration::from_secs(60),
            idle: chrono::Duration::seconds(600),
        }
    }
}

impl SweepConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            every: Duration::from_secs(config.market_sweep_sec),
            idle: chrono::Duration::seconds(config.market_idle_sec),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub mints_evicted: usize,
    pub cooldowns_pruned: usize,
}

/// Keeps per-mint memory bounded on a feed that never stops listing mints.
pub struct Sweeper {
    market: Arc<MarketState>,
    book: PositionBook,
    entries: Arc<EntryPipeline>,
    exits: Arc<ExitManager>,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(
        market: Arc<MarketState>,
        book: PositionBook,
        entries: Arc<EntryPipeline>,
        exits: Arc<ExitManager>,
        config: SweepConfig,
    ) -> Self {
        Self {
            market,
            book,
            entries,
            exits,
            config,
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.config.every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep(Utc::now()).await;
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepStats {
        let keep = self.book.active_mints().await;
        let stats = SweepStats {
            mints_evicted: self.market.evict_idle(now, self.config.idle, &keep),
            cooldowns_pruned: self.entries.prune_cooldowns(now) + self.exits.prune_cooldowns(now),
        };

        gauge!("tracked_mints").set(self.market.mint_count() as f64);
        if stats.mints_evicted > 0 {
            tracing::debug!(
                mints_evicted = stats.mints_evicted,
                cooldowns_pruned = stats.cooldowns_pruned,
                tracked = self.market.mint_count(),
                "Market state swept"
            );
        }
        stats
    }
}
