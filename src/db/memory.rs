use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Position, PositionState, RiskReport, TokenInfo, TradeEvent};

use super::PositionStore;

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tokens: HashMap<String, TokenInfo>,
    trades: HashMap<String, TradeEvent>,
    risk_reports: Vec<(String, RiskReport)>,
    positions: HashMap<Uuid, Position>,
    position_writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        // A poisoned lock only means another thread panicked mid-write;
        // the maps themselves are still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn position(&self, id: &Uuid) -> Option<Position> {
        self.lock().positions.get(id).cloned()
    }

    pub fn positions_for_mint(&self, mint: &str) -> Vec<Position> {
        self.lock()
            .positions
            .values()
            .filter(|p| p.mint == mint)
            .cloned()
            .collect()
    }

    pub fn token(&self, mint: &str) -> Option<TokenInfo> {
        self.lock().tokens.get(mint).cloned()
    }

    pub fn trade_count(&self) -> usize {
        self.lock().trades.len()
    }

    pub fn risk_reports(&self, mint: &str) -> Vec<RiskReport> {
        self.lock()
            .risk_reports
            .iter()
            .filter(|(m, _)| m == mint)
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Number of `save_position` calls observed.
    pub fn position_writes(&self) -> usize {
        self.lock().position_writes
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn upsert_token(&self, info: &TokenInfo) -> anyhow::Result<()> {
        self.lock().tokens.insert(info.mint.clone(), info.clone());
        Ok(())
    }

    async fn save_trade(&self, event: &TradeEvent) -> anyhow::Result<()> {
        self.lock()
            .trades
            .entry(event.signature.clone())
            .or_insert_with(|| event.clone());
        Ok(())
    }

    async fn save_risk_report(&self, mint: &str, report: &RiskReport) -> anyhow::Result<()> {
        self.lock()
            .risk_reports
            .push((mint.to_string(), report.clone()));
        Ok(())
    }

    async fn save_position(&self, position: &Position) -> anyhow::Result<()> {
        let mut inner = self.lock();
        inner.positions.insert(position.id, position.clone());
        inner.position_writes += 1;
        Ok(())
    }

    async fn list_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        let mut open: Vec<Position> = self
            .lock()
            .positions
            .values()
            .filter(|p| p.state != PositionState::Closed)
            .cloned()
            .collect();
        open.sort_by_key(|p| p.created_at);
        Ok(open)
    }

    async fn list_positions(&self, limit: i64) -> anyhow::Result<Vec<Position>> {
        let mut all: Vec<Position> = self.lock().positions.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
