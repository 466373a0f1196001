use std::collections::HashMap;

use crate::{
    auth::new_id,
    models::{now_rfc3339, NewStaff, Staff},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult};

const STAFF_COLUMNS: &str = "id, name, email, phone, bio, active, created_at";

impl Gateway {
    pub async fn list_staff(&self) -> GatewayResult<Vec<Staff>> {
        let rows = sqlx::query_as::<_, Staff>(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff ORDER BY name COLLATE NOCASE"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_staff(&self, id: &str) -> GatewayResult<Staff> {
        sqlx::query_as::<_, Staff>(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("staff member"))
    }

    pub async fn create_staff(&self, input: NewStaff) -> GatewayResult<Staff> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO staff (id, name, email, phone, bio, active, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.email)
        .bind(input.phone)
        .bind(input.bio)
        .bind(input.active)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_staff(&id).await
    }

    pub async fn update_staff(&self, id: &str, input: NewStaff) -> GatewayResult<Staff> {
        let result = sqlx::query(
            "UPDATE staff SET name = ?, email = ?, phone = ?, bio = ?, active = ? WHERE id = ?",
        )
        .bind(input.name.trim())
        .bind(input.email)
        .bind(input.phone)
        .bind(input.bio)
        .bind(input.active)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_affected(result.rows_affected(), "staff member")?;
        self.get_staff(id).await
    }

    pub async fn delete_staff(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM staff WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "staff member")
    }

    pub async fn staff_service_ids(&self, staff_id: &str) -> GatewayResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT service_id FROM staff_services WHERE staff_id = ? ORDER BY service_id",
        )
        .bind(staff_id)
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Replaces the full assignment set of a staff member.
    pub async fn set_staff_services(&self, staff_id: &str, service_ids: &[String]) -> GatewayResult<()> {
        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM staff_services WHERE staff_id = ?")
            .bind(staff_id)
            .execute(&mut *tx)
            .await?;
        for service_id in service_ids {
            sqlx::query("INSERT OR IGNORE INTO staff_services (staff_id, service_id) VALUES (?, ?)")
                .bind(staff_id)
                .bind(service_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Service names per staff id, for the staff list.
    pub async fn staff_assignments(&self) -> GatewayResult<HashMap<String, Vec<String>>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"SELECT ss.staff_id, s.name
               FROM staff_services ss
               JOIN services s ON s.id = ss.service_id
               ORDER BY s.name COLLATE NOCASE"#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut assignments: HashMap<String, Vec<String>> = HashMap::new();
        for (staff_id, service_name) in rows {
            assignments.entry(staff_id).or_default().push(service_name);
        }
        Ok(assignments)
    }
}
