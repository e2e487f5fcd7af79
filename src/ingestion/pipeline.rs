use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::PositionStore;
use crate::execution::{EntryOutcome, EntryPipeline};
use crate::models::{TokenInfo, TradeEvent};

use super::feed::FeedEvent;
use super::market_state::MarketState;

/// Routes feed events into market state, the store and the entry pipeline.
pub struct EventPipeline {
    market: Arc<MarketState>,
    store: Arc<dyn PositionStore>,
    entries: Arc<EntryPipeline>,
    feed_connected: Arc<AtomicBool>,
}

impl EventPipeline {
    pub fn new(
        market: Arc<MarketState>,
        store: Arc<dyn PositionStore>,
        entries: Arc<EntryPipeline>,
        feed_connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            market,
            store,
            entries,
            feed_connected,
        }
    }

    /// Consume the feed until its sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = rx.recv().await {
            self.process(event).await;
        }
        tracing::warn!("Feed event channel closed");
    }

    /// Handle one event. Trades spawn an entry evaluation and return its
    /// handle so the feed loop never waits on execution.
    pub async fn process(&self, event: FeedEvent) -> Option<JoinHandle<EntryOutcome>> {
        match event {
            FeedEvent::Connected => {
                self.feed_connected.store(true, Ordering::Relaxed);
                tracing::info!("Feed connected");
                None
            }
            FeedEvent::Disconnected => {
                self.feed_connected.store(false, Ordering::Relaxed);
                tracing::warn!("Feed disconnected");
                None
            }
            FeedEvent::NewToken(info) => {
                self.process_new_token(info).await;
                None
            }
            FeedEvent::Trade(event) => Some(self.process_trade(event).await),
        }
    }

    async fn process_new_token(&self, info: TokenInfo) {
        tracing::info!(
            mint = %info.mint,
            creator = %info.creator,
            freeze_authority = ?info.freeze_authority,
            mint_authority = ?info.mint_authority,
            "New token"
        );
        if let Err(e) = self.store.upsert_token(&info).await {
            tracing::error!(mint = %info.mint, error = %e, "Failed to store token");
        }
        self.market.record_token(info);
    }

    async fn process_trade(&self, event: TradeEvent) -> JoinHandle<EntryOutcome> {
        let start = Instant::now();
        counter!("trade_events_total").increment(1);
        tracing::debug!(%event, "Trade event");

        self.market.record_trade(&event);
        if let Err(e) = self.store.save_trade(&event).await {
            tracing::error!(signature = %event.signature, error = %e, "Failed to store trade");
        }
        histogram!("pipeline_latency_seconds").record(start.elapsed().as_secs_f64());

        let entries = self.entries.clone();
        let mint = event.mint;
        tokio::spawn(async move { entries.consider_entry(&mint, Utc::now()).await })
    }
}
