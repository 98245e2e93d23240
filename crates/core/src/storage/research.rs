//! Research projects live in the KV store as whole documents, one key per
//! project. Mutation is whole-document replacement.

use crate::domain::research::ResearchProject;
use crate::storage::kv;
use anyhow::Context;
use uuid::Uuid;

const KEY_PREFIX: &str = "research:project:";

fn key_for(id: Uuid) -> String {
    format!("{KEY_PREFIX}{id}")
}

pub async fn save_project(pool: &sqlx::PgPool, project: &ResearchProject) -> anyhow::Result<()> {
    let value = serde_json::to_value(project).context("serialize research project")?;
    kv::set(pool, &key_for(project.id), &value).await
}

pub async fn load_project(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> anyhow::Result<Option<ResearchProject>> {
    let Some(value) = kv::get(pool, &key_for(id)).await? else {
        return Ok(None);
    };
    let project = serde_json::from_value(value)
        .with_context(|| format!("stored research project is malformed (id={id})"))?;
    Ok(Some(project))
}

pub async fn list_projects(pool: &sqlx::PgPool) -> anyhow::Result<Vec<ResearchProject>> {
    let rows = kv::list_prefix(pool, KEY_PREFIX).await?;
    let mut out = Vec::with_capacity(rows.len());
    for (key, value) in rows {
        match serde_json::from_value::<ResearchProject>(value) {
            Ok(project) => out.push(project),
            Err(err) => {
                // Skip corrupt documents rather than failing the whole list.
                tracing::warn!(%key, error = %err, "skipping malformed research project");
            }
        }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_id() {
        let id = Uuid::nil();
        assert_eq!(
            key_for(id),
            "research:project:00000000-0000-0000-0000-000000000000"
        );
    }
}
