use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};

use crate::models::{Side, TradeEvent};

#[derive(Debug, FromRow)]
struct TradeRow {
    signature: String,
    mint: String,
    side: String,
    price: Decimal,
    sol_amount: Decimal,
    trader: String,
    slot: i64,
    traded_at: DateTime<Utc>,
}

impl From<TradeRow> for TradeEvent {
    fn from(row: TradeRow) -> Self {
        TradeEvent {
            signature: row.signature,
            mint: row.mint,
            price: row.price,
            sol_amount: row.sol_amount,
            side: Side::from_is_buy(row.side == "buy"),
            slot: row.slot.max(0) as u64,
            trader: row.trader,
            timestamp: row.traded_at,
        }
    }
}

/// Insert a trade. A duplicate signature is silently ignored.
pub async fn insert_trade(pool: &PgPool, event: &TradeEvent) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO trades (signature, mint, side, price, sol_amount, trader, slot, traded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (signature) DO NOTHING
        "#,
    )
    .bind(&event.signature)
    .bind(&event.mint)
    .bind(event.side.as_str())
    .bind(event.price)
    .bind(event.sol_amount)
    .bind(&event.trader)
    .bind(event.slot as i64)
    .bind(event.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// The N most recent trades for a mint, oldest first.
pub async fn get_recent_trades(
    pool: &PgPool,
    mint: &str,
    limit: i64,
) -> anyhow::Result<Vec<TradeEvent>> {
    let mut rows = sqlx::query_as::<_, TradeRow>(
        "SELECT * FROM trades WHERE mint = $1 ORDER BY traded_at DESC LIMIT $2",
    )
    .bind(mint)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.reverse();
    Ok(rows.into_iter().map(TradeEvent::from).collect())
}
