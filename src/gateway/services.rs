use crate::{
    auth::new_id,
    models::{now_rfc3339, NewService, Service},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult};

const SERVICE_COLUMNS: &str =
    "id, name, description, duration_minutes, price, active, category, created_at";

impl Gateway {
    pub async fn list_services(&self) -> GatewayResult<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services ORDER BY name COLLATE NOCASE"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn list_active_services(&self) -> GatewayResult<Vec<Service>> {
        let rows = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE active = 1 ORDER BY category, price"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_service(&self, id: &str) -> GatewayResult<Service> {
        sqlx::query_as::<_, Service>(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("service"))
    }

    pub async fn create_service(&self, input: NewService) -> GatewayResult<Service> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO services (id, name, description, duration_minutes, price, active, category, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.description)
        .bind(input.duration_minutes)
        .bind(input.price)
        .bind(input.active)
        .bind(input.category)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_service(&id).await
    }

    pub async fn update_service(&self, id: &str, input: NewService) -> GatewayResult<Service> {
        let result = sqlx::query(
            r#"UPDATE services
               SET name = ?, description = ?, duration_minutes = ?, price = ?, active = ?, category = ?
               WHERE id = ?"#,
        )
        .bind(input.name.trim())
        .bind(input.description)
        .bind(input.duration_minutes)
        .bind(input.price)
        .bind(input.active)
        .bind(input.category)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_affected(result.rows_affected(), "service")?;
        self.get_service(id).await
    }

    pub async fn delete_service(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "service")
    }
}
