use sqlx::PgPool;

use crate::models::{DataCompleteness, RiskReport};

fn completeness_str(c: DataCompleteness) -> &'static str {
    match c {
        DataCompleteness::Low => "low",
        DataCompleteness::Medium => "medium",
        DataCompleteness::High => "high",
    }
}

/// Append a risk verdict for a mint.
pub async fn insert_report(pool: &PgPool, mint: &str, report: &RiskReport) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO risk_reports (mint, score, allow, reasons, data_completeness)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(mint)
    .bind(report.score)
    .bind(report.allow)
    .bind(&report.reasons)
    .bind(completeness_str(report.data_completeness))
    .execute(pool)
    .await?;

    Ok(())
}
