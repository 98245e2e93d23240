use crate::domain::analysis::{AnalysisResult, Recommendation, TechnicalIndicators};
use anyhow::Context;
use chrono::{DateTime, Utc};

pub async fn persist(pool: &sqlx::PgPool, result: &AnalysisResult) -> anyhow::Result<uuid::Uuid> {
    let id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO analysis_snapshots \
         (symbol, recommendation, target_price, analysis, risks, opportunities, \
          high_30d, low_30d, range_percent, generated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING id",
    )
    .bind(&result.symbol)
    .bind(result.recommendation.as_str())
    .bind(result.target_price)
    .bind(&result.analysis)
    .bind(&result.risks)
    .bind(&result.opportunities)
    .bind(result.technical_indicators.high_30d)
    .bind(result.technical_indicators.low_30d)
    .bind(result.technical_indicators.range_percent)
    .bind(result.generated_at)
    .fetch_one(pool)
    .await
    .context("insert analysis_snapshots failed")?;

    Ok(id)
}

type SnapshotRow = (
    String,
    String,
    Option<f64>,
    String,
    Vec<String>,
    Vec<String>,
    f64,
    f64,
    f64,
    DateTime<Utc>,
);

pub async fn fetch_latest(
    pool: &sqlx::PgPool,
    symbol: &str,
) -> anyhow::Result<Option<AnalysisResult>> {
    let row: Option<SnapshotRow> = sqlx::query_as(
        "SELECT symbol, recommendation, target_price, analysis, risks, opportunities, \
                high_30d, low_30d, range_percent, generated_at \
         FROM analysis_snapshots \
         WHERE symbol = $1 \
         ORDER BY generated_at DESC \
         LIMIT 1",
    )
    .bind(symbol)
    .fetch_optional(pool)
    .await
    .context("select analysis_snapshots failed")?;

    let Some((
        symbol,
        recommendation,
        target_price,
        analysis,
        risks,
        opportunities,
        high_30d,
        low_30d,
        range_percent,
        generated_at,
    )) = row
    else {
        return Ok(None);
    };

    let recommendation = Recommendation::from_db_str(&recommendation)
        .with_context(|| format!("invalid recommendation in DB: {recommendation}"))?;

    Ok(Some(AnalysisResult {
        symbol,
        analysis,
        recommendation,
        target_price,
        risks,
        opportunities,
        technical_indicators: TechnicalIndicators {
            high_30d,
            low_30d,
            range_percent,
        },
        generated_at,
    }))
}
