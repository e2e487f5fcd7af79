use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{Position, TakeProfitRung};

/// Database row for the positions table.
#[derive(Debug, FromRow)]
struct PositionRow {
    id: Uuid,
    mint: String,
    state: String,
    size_sol: Decimal,
    tokens: Option<Decimal>,
    entry_price: Option<Decimal>,
    stop_loss_pct: Decimal,
    take_profits: Json<Vec<TakeProfitRung>>,
    trail_mode: String,
    tp_filled: i32,
    peak_pnl_pct: Option<Decimal>,
    entry_signature: Option<String>,
    exit_signature: Option<String>,
    exit_reason: Option<String>,
    last_error: Option<String>,
    entry_timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PositionRow> for Position {
    type Error = anyhow::Error;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Position {
            id: row.id,
            mint: row.mint,
            state: row.state.parse()?,
            size_sol: row.size_sol,
            stop_loss_pct: row.stop_loss_pct,
            take_profits: row.take_profits.0,
            trail_mode: row.trail_mode,
            tokens: row.tokens,
            entry_price: row.entry_price,
            tp_filled: row.tp_filled.max(0) as usize,
            peak_pnl_pct: row.peak_pnl_pct,
            entry_signature: row.entry_signature,
            exit_signature: row.exit_signature,
            exit_reason: row.exit_reason,
            last_error: row.last_error,
            entry_timestamp: row.entry_timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_positions(rows: Vec<PositionRow>) -> anyhow::Result<Vec<Position>> {
    rows.into_iter().map(Position::try_from).collect()
}

/// Write the full position row, inserting or replacing by id.
pub async fn upsert_position(pool: &PgPool, pos: &Position) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO positions (
            id, mint, state, size_sol, tokens, entry_price, stop_loss_pct, take_profits,
            trail_mode, tp_filled, peak_pnl_pct, entry_signature, exit_signature,
            exit_reason, last_error, entry_timestamp, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (id) DO UPDATE SET
            state = EXCLUDED.state,
            size_sol = EXCLUDED.size_sol,
            tokens = EXCLUDED.tokens,
            entry_price = EXCLUDED.entry_price,
            stop_loss_pct = EXCLUDED.stop_loss_pct,
            take_profits = EXCLUDED.take_profits,
            trail_mode = EXCLUDED.trail_mode,
            tp_filled = EXCLUDED.tp_filled,
            peak_pnl_pct = EXCLUDED.peak_pnl_pct,
            entry_signature = EXCLUDED.entry_signature,
            exit_signature = EXCLUDED.exit_signature,
            exit_reason = EXCLUDED.exit_reason,
            last_error = EXCLUDED.last_error,
            entry_timestamp = EXCLUDED.entry_timestamp,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(pos.id)
    .bind(&pos.mint)
    .bind(pos.state.as_str())
    .bind(pos.size_sol)
    .bind(pos.tokens)
    .bind(pos.entry_price)
    .bind(pos.stop_loss_pct)
    .bind(Json(&pos.take_profits))
    .bind(&pos.trail_mode)
    .bind(pos.tp_filled as i32)
    .bind(pos.peak_pnl_pct)
    .bind(&pos.entry_signature)
    .bind(&pos.exit_signature)
    .bind(&pos.exit_reason)
    .bind(&pos.last_error)
    .bind(pos.entry_timestamp)
    .bind(pos.created_at)
    .bind(pos.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get all positions that are not CLOSED.
pub async fn get_open_positions(pool: &PgPool) -> anyhow::Result<Vec<Position>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions WHERE state <> 'CLOSED' ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    into_positions(rows)
}

/// Most recently updated positions, any state.
pub async fn get_recent_positions(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<Position>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT * FROM positions ORDER BY updated_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    into_positions(rows)
}
