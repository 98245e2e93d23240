//! Postgres-backed key-value store. Ad hoc storage plus the health-check
//! round trip; not a database with schema or transactions.

use anyhow::Context;

pub async fn set(pool: &sqlx::PgPool, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO kv_store (key, value) VALUES ($1, $2) \
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .with_context(|| format!("kv set failed (key={key})"))?;
    Ok(())
}

pub async fn get(pool: &sqlx::PgPool, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("kv get failed (key={key})"))?;
    Ok(row.map(|(v,)| v))
}

pub async fn delete(pool: &sqlx::PgPool, key: &str) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM kv_store WHERE key = $1")
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("kv delete failed (key={key})"))?;
    Ok(())
}

pub async fn list_prefix(
    pool: &sqlx::PgPool,
    prefix: &str,
) -> anyhow::Result<Vec<(String, serde_json::Value)>> {
    let pattern = format!("{}%", escape_like(prefix));
    let rows: Vec<(String, serde_json::Value)> =
        sqlx::query_as("SELECT key, value FROM kv_store WHERE key LIKE $1 ORDER BY key ASC")
            .bind(pattern)
            .fetch_all(pool)
            .await
            .with_context(|| format!("kv list failed (prefix={prefix})"))?;
    Ok(rows)
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("research:project:"), "research:project:");
        assert_eq!(escape_like("a%b_c"), "a\\%b\\_c");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
