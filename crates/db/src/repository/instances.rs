//! `workflow_instances` operations.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{models::InstanceRow, DbError};

const SELECT: &str = r#"
    SELECT id, definition_id, definition_version, status, input, output, steps,
           started_at, finished_at
    FROM workflow_instances
"#;

/// Insert a new instance row.
///
/// Returns `DbError::Duplicate` if the id already exists.
pub async fn insert_instance(pool: &PgPool, row: &InstanceRow) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_instances
            (id, definition_id, definition_version, status, input, output, steps,
             started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(row.id)
    .bind(&row.definition_id)
    .bind(row.definition_version)
    .bind(&row.status)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.steps)
    .bind(row.started_at)
    .bind(row.finished_at)
    .execute(pool)
    .await
    .map_err(|e| DbError::from_insert(e, || format!("instance {}", row.id)))?;

    Ok(())
}

/// Fetch a single instance by its primary key.
pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<Option<InstanceRow>, DbError> {
    let row = sqlx::query_as::<_, InstanceRow>(&format!("{SELECT} WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Instances of every version of `definition_id`, oldest first.
pub async fn list_instances_for_definition(
    pool: &PgPool,
    definition_id: &str,
) -> Result<Vec<InstanceRow>, DbError> {
    let rows = sqlx::query_as::<_, InstanceRow>(&format!(
        "{SELECT} WHERE definition_id = $1 ORDER BY started_at"
    ))
    .bind(definition_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
