//! `workflow_definitions` operations.

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use engine::VersionQuery;

use crate::{models::DefinitionRow, DbError};

const COLUMNS: &str =
    "definition_id, version, is_latest, is_published, name, description, body";

/// Insert the row, or replace every column of an existing
/// `(definition_id, version)` row.
pub async fn upsert_definition(pool: &PgPool, row: &DefinitionRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_definitions
            (definition_id, version, is_latest, is_published, name, description, body)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (definition_id, version) DO UPDATE SET
            is_latest    = EXCLUDED.is_latest,
            is_published = EXCLUDED.is_published,
            name         = EXCLUDED.name,
            description  = EXCLUDED.description,
            body         = EXCLUDED.body,
            saved_at     = now()
        "#,
    )
    .bind(&row.definition_id)
    .bind(row.version)
    .bind(row.is_latest)
    .bind(row.is_published)
    .bind(&row.name)
    .bind(&row.description)
    .bind(&row.body)
    .execute(pool)
    .await?;

    debug!(definition_id = %row.definition_id, version = row.version, "definition upserted");
    Ok(())
}

/// Append the `AND ...` clause selecting `query`'s versions. Returns `false`
/// if no stored row can match, in which case nothing is appended.
pub(crate) fn push_version_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: VersionQuery,
) -> bool {
    match query {
        VersionQuery::Draft => {
            builder.push(" AND NOT is_published");
        }
        VersionQuery::Latest => {
            builder.push(" AND is_latest");
        }
        VersionQuery::Published => {
            builder.push(" AND is_published");
        }
        VersionQuery::LatestOrPublished => {
            builder.push(" AND (is_latest OR is_published)");
        }
        VersionQuery::AllVersions => {}
        VersionQuery::Exact(version) => {
            // The column is INTEGER, so larger versions are never stored.
            let Ok(version) = i32::try_from(version) else {
                return false;
            };
            builder.push(" AND version = ").push_bind(version);
        }
    }
    true
}

/// `None` when `query` cannot match any stored row.
pub(crate) fn select_highest(
    definition_id: &str,
    query: VersionQuery,
) -> Option<QueryBuilder<'_, Postgres>> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {COLUMNS} FROM workflow_definitions WHERE definition_id = "
    ));
    builder.push_bind(definition_id);
    if !push_version_filter(&mut builder, query) {
        return None;
    }
    builder.push(" ORDER BY version DESC LIMIT 1");
    Some(builder)
}

/// The highest version of `definition_id` matching `query`, if any.
pub async fn get_definition(
    pool: &PgPool,
    definition_id: &str,
    query: VersionQuery,
) -> Result<Option<DefinitionRow>, DbError> {
    let Some(mut builder) = select_highest(definition_id, query) else {
        debug!(definition_id, %query, "version query out of column range, skipping lookup");
        return Ok(None);
    };
    let row = builder
        .build_query_as::<DefinitionRow>()
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Every definition row, ordered by id then version.
pub async fn list_definitions(pool: &PgPool) -> Result<Vec<DefinitionRow>, DbError> {
    let rows = sqlx::query_as::<_, DefinitionRow>(&format!(
        "SELECT {COLUMNS} FROM workflow_definitions ORDER BY definition_id, version"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
