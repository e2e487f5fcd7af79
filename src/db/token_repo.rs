use sqlx::PgPool;

use crate::models::TokenInfo;

/// Insert a newly detected token, or refresh its metadata.
pub async fn upsert_token(pool: &PgPool, info: &TokenInfo) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tokens (mint, creator, decimals, freeze_authority, mint_authority)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (mint) DO UPDATE
            SET creator = $2, decimals = $3, freeze_authority = $4, mint_authority = $5
        "#,
    )
    .bind(&info.mint)
    .bind(&info.creator)
    .bind(info.decimals as i16)
    .bind(&info.freeze_authority)
    .bind(&info.mint_authority)
    .execute(pool)
    .await?;

    Ok(())
}
