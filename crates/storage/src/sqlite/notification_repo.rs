use chrono::{DateTime, Utc};
use course_core::model::{NewNotification, Notification, StudentId};
use sqlx::SqliteConnection;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_notification_row},
};
use crate::repository::{NotificationRepository, StorageError};

/// Insert on an existing connection so callers can include it in their transaction.
pub(super) async fn insert_notification(
    db: &mut SqliteConnection,
    notification: &NewNotification,
    at: DateTime<Utc>,
) -> Result<i64, StorageError> {
    let res = sqlx::query(
        r"
            INSERT INTO notifications (
                user_id, kind, title, message, related_id, link, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ",
    )
    .bind(id_i64("user_id", notification.user_id.value())?)
    .bind(notification.kind.as_str())
    .bind(notification.title.as_str())
    .bind(notification.message.as_str())
    .bind(id_i64("related_id", notification.related_id)?)
    .bind(notification.link.as_str())
    .bind(at)
    .execute(&mut *db)
    .await
    .map_err(conn)?;

    Ok(res.last_insert_rowid())
}

#[async_trait::async_trait]
impl NotificationRepository for SqliteRepository {
    async fn list_for_user(
        &self,
        user_id: StudentId,
        limit: u32,
    ) -> Result<Vec<Notification>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, kind, title, message, related_id, link, created_at
                FROM notifications
                WHERE user_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_notification_row).collect()
    }
}
