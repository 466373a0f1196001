use crate::{
    auth::new_id,
    models::{now_rfc3339, Message, NewMessage, MESSAGE_STATUSES, MESSAGE_UNREAD},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult, INVALID_PARAMETER_CODE};

const MESSAGE_COLUMNS: &str = "id, name, email, phone, subject, body, status, created_at";

impl Gateway {
    pub async fn list_messages(&self) -> GatewayResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_message(&self, id: &str) -> GatewayResult<Message> {
        sqlx::query_as::<_, Message>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("message"))
    }

    /// Stores a contact-form submission as unread.
    pub async fn create_message(&self, input: NewMessage) -> GatewayResult<Message> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO messages (id, name, email, phone, subject, body, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.email.trim())
        .bind(input.phone)
        .bind(input.subject)
        .bind(input.body.trim())
        .bind(MESSAGE_UNREAD)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_message(&id).await
    }

    pub async fn update_message_status(&self, id: &str, status: &str) -> GatewayResult<Message> {
        if !MESSAGE_STATUSES.contains(&status) {
            return Err(GatewayError::remote(
                INVALID_PARAMETER_CODE,
                format!("unknown message status {status}"),
            ));
        }
        let result = sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "message")?;
        self.get_message(id).await
    }

    pub async fn delete_message(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "message")
    }

    pub async fn count_unread_messages(&self) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE status = ?")
            .bind(MESSAGE_UNREAD)
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}
