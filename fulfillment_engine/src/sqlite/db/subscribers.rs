use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

/// Adds a member to `group` if it has fewer than `max` members, returning the new count. Returns `None` when full.
pub async fn try_join(
    group: &str,
    max: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query("INSERT INTO subscriber_counters (name, count, updated_at) VALUES ($1, 0, $2) ON CONFLICT DO NOTHING")
        .bind(group)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let count = sqlx::query_scalar(
        "UPDATE subscriber_counters SET count = count + 1, updated_at = $1 WHERE name = $2 AND count < $3 RETURNING count",
    )
    .bind(now)
    .bind(group)
    .bind(max)
    .fetch_optional(conn)
    .await?;
    Ok(count)
}

pub async fn leave(group: &str, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: Option<i64> = sqlx::query_scalar(
        "UPDATE subscriber_counters SET count = MAX(count - 1, 0), updated_at = $1 WHERE name = $2 RETURNING count",
    )
    .bind(now)
    .bind(group)
    .fetch_optional(conn)
    .await?;
    Ok(count.unwrap_or(0))
}

pub async fn reset(group: &str, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE subscriber_counters SET count = 0, updated_at = $1 WHERE name = $2")
        .bind(now)
        .bind(group)
        .execute(conn)
        .await?;
    Ok(())
}
