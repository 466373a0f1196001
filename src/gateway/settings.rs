use crate::models::Setting;

use super::{Gateway, GatewayResult};

impl Gateway {
    pub async fn all_settings(&self) -> GatewayResult<Vec<Setting>> {
        let rows = sqlx::query_as::<_, Setting>("SELECT key, value FROM settings ORDER BY key")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get_setting(&self, key: &str) -> GatewayResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    /// Inserts or replaces every pair in one transaction.
    pub async fn upsert_settings(&self, pairs: &[(String, String)]) -> GatewayResult<()> {
        let mut tx = self.db.begin().await?;
        for (key, value) in pairs {
            sqlx::query(
                r#"INSERT INTO settings (key, value) VALUES (?, ?)
                   ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
