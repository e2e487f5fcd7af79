pub mod memory;
pub mod position_repo;
pub mod risk_repo;
pub mod token_repo;
pub mod trade_repo;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::{Position, RiskReport, TokenInfo, TradeEvent};

pub use memory::MemoryStore;

pub async fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Verify connectivity
    sqlx::query("SELECT 1").execute(&pool).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Durable record of positions, trades, tokens and risk reports.
///
/// The engine only mirrors what it needs in memory; this store is the
/// source of truth and is what the in-memory state is rebuilt from.
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn upsert_token(&self, info: &TokenInfo) -> anyhow::Result<()>;

    /// Idempotent: a trade whose signature is already stored is ignored.
    async fn save_trade(&self, event: &TradeEvent) -> anyhow::Result<()>;

    /// Append-only.
    async fn save_risk_report(&self, mint: &str, report: &RiskReport) -> anyhow::Result<()>;

    /// Full-row upsert keyed by position id.
    async fn save_position(&self, position: &Position) -> anyhow::Result<()>;

    /// Every position whose state is not CLOSED.
    async fn list_open_positions(&self) -> anyhow::Result<Vec<Position>>;

    /// Most recently updated positions, any state.
    async fn list_positions(&self, limit: i64) -> anyhow::Result<Vec<Position>>;

    async fn health_check(&self) -> anyhow::Result<()>;
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PositionStore for PgStore {
    async fn upsert_token(&self, info: &TokenInfo) -> anyhow::Result<()> {
        token_repo::upsert_token(&self.pool, info).await
    }

    async fn save_trade(&self, event: &TradeEvent) -> anyhow::Result<()> {
        trade_repo::insert_trade(&self.pool, event).await
    }

    async fn save_risk_report(&self, mint: &str, report: &RiskReport) -> anyhow::Result<()> {
        risk_repo::insert_report(&self.pool, mint, report).await
    }

    async fn save_position(&self, position: &Position) -> anyhow::Result<()> {
        position_repo::upsert_position(&self.pool, position).await
    }

    async fn list_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        position_repo::get_open_positions(&self.pool).await
    }

    async fn list_positions(&self, limit: i64) -> anyhow::Result<Vec<Position>> {
        position_repo::get_recent_positions(&self.pool, limit).await
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
