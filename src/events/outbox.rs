//! Transactional outbox for durable event delivery on Postgres.
//!
//! `enqueue` writes an event row inside the caller's transaction; a polling
//! worker claims batches with `FOR UPDATE SKIP LOCKED` and replays them over
//! the in-process channel, retrying with exponential backoff. On SQLite the
//! outbox is a no-op and events flow only through the channel.

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Enqueue a domain event into the outbox table, inside the same transaction
/// as the state change it describes.
pub async fn enqueue(
    db: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    event: &Event,
) -> Result<(), ServiceError> {
    if db.get_database_backend() != DbBackend::Postgres {
        debug!(
            "outbox enqueue skipped for non-Postgres backend (aggregate_type={}, event_type={})",
            aggregate_type,
            event.type_name()
        );
        return Ok(());
    }

    let id = Uuid::new_v4();
    let payload = serde_json::to_value(event)
        .map_err(|e| ServiceError::EventError(format!("serialize outbox payload: {}", e)))?;
    let sql = r#"INSERT INTO outbox_events
        (id, aggregate_type, aggregate_id, event_type, payload, status, attempts, available_at, created_at)
        VALUES ($1, $2, $3, $4, $5::jsonb, 'pending', 0, NOW(), NOW())"#;
    let stmt = Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        vec![
            id.into(),
            aggregate_type.into(),
            aggregate_id.map(|v| v.into()).unwrap_or(Value::Null.into()),
            event.type_name().into(),
            payload.into(),
        ],
    );
    db.execute(stmt).await?;
    debug!(
        "enqueued outbox event {} type={} agg={}",
        id,
        event.type_name(),
        aggregate_type
    );
    Ok(())
}

/// Spawn the polling worker. Does nothing on non-Postgres backends.
pub async fn start_worker(db: Arc<DatabaseConnection>, sender: EventSender) {
    if db.get_database_backend() != DbBackend::Postgres {
        info!(
            "Outbox worker disabled for {:?} backend; relying on direct event emission",
            db.get_database_backend()
        );
        return;
    }

    tokio::spawn(async move {
        loop {
            if let Err(e) = drain_once(&db, &sender, 50).await {
                error!("outbox worker error: {}", e);
            }
            sleep(Duration::from_millis(500)).await;
        }
    });
}

async fn drain_once(
    db: &DatabaseConnection,
    sender: &EventSender,
    batch_size: i64,
) -> Result<(), ServiceError> {
    const MAX_ATTEMPTS: i32 = 8;
    const BASE_BACKOFF_SECS: u64 = 2;

    // Claim a batch; SKIP LOCKED keeps concurrent workers from colliding.
    let sql_claim = r#"
        WITH cte AS (
            SELECT id FROM outbox_events
            WHERE status = 'pending' AND available_at <= NOW()
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
        )
        UPDATE outbox_events o
        SET status = 'processing', updated_at = NOW(), attempts = o.attempts + 1
        FROM cte
        WHERE o.id = cte.id
        RETURNING o.id, o.event_type, o.payload
    "#;
    let stmt =
        Statement::from_sql_and_values(DbBackend::Postgres, sql_claim, vec![batch_size.into()]);
    let rows: Vec<QueryResult> = db.query_all(stmt).await?;

    for row in rows {
        let id: Uuid = row.try_get("", "id").unwrap_or_default();
        let et: String = row.try_get("", "event_type").unwrap_or_default();
        let payload: Value = row.try_get("", "payload").unwrap_or(Value::Null);

        let evt = serde_json::from_value::<Event>(payload)
            .unwrap_or_else(|_| Event::generic(et.clone()));

        if sender.send(evt).await.is_ok() {
            let sql_update = r#"UPDATE outbox_events SET status = 'delivered', processed_at = NOW(), updated_at = NOW(), error_message = NULL WHERE id = $1"#;
            let stmt_upd =
                Statement::from_sql_and_values(DbBackend::Postgres, sql_update, vec![id.into()]);
            if let Err(e) = db.execute(stmt_upd).await {
                warn!("failed updating outbox {}: {}", id, e);
            }
        } else {
            let sql_attempts = r#"SELECT attempts FROM outbox_events WHERE id = $1"#;
            let row = db
                .query_one(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    sql_attempts,
                    vec![id.into()],
                ))
                .await?;
            let attempts: i32 = row
                .and_then(|r| r.try_get("", "attempts").ok())
                .unwrap_or(1);
            if attempts < MAX_ATTEMPTS {
                let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
                let now_ms = chrono::Utc::now().timestamp_millis() as u64;
                let jitter = now_ms % 1000; // ms
                let sql_retry = r#"UPDATE outbox_events SET status = 'pending', available_at = NOW() + make_interval(secs := $2::int) + ($3::int * interval '1 millisecond'), updated_at = NOW(), error_message = 'send failed' WHERE id = $1"#;
                let stmt_retry = Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    sql_retry,
                    vec![id.into(), (backoff as i64).into(), (jitter as i64).into()],
                );
                if let Err(e) = db.execute(stmt_retry).await {
                    warn!("failed scheduling retry for outbox {}: {}", id, e);
                }
            } else {
                let sql_fail = r#"UPDATE outbox_events SET status = 'failed', updated_at = NOW(), error_message = 'max attempts exceeded' WHERE id = $1"#;
                let stmt_fail =
                    Statement::from_sql_and_values(DbBackend::Postgres, sql_fail, vec![id.into()]);
                if let Err(e) = db.execute(stmt_fail).await {
                    warn!("failed marking outbox {} failed: {}", id, e);
                }
            }
        }
    }
    Ok(())
}
