use crate::{
    auth::new_id,
    models::{now_rfc3339, Customer, NewCustomer},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, user_id, created_at";

impl Gateway {
    pub async fn list_customers(&self) -> GatewayResult<Vec<Customer>> {
        let rows = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY name COLLATE NOCASE"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_customer(&self, id: &str) -> GatewayResult<Customer> {
        sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(GatewayError::NotFound("customer"))
    }

    pub async fn find_customer_by_email(&self, email: &str) -> GatewayResult<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE lower(email) = lower(?) LIMIT 1"
        ))
        .bind(email.trim())
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn find_customer_by_user(&self, user_id: &str) -> GatewayResult<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE user_id = ? LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn create_customer(&self, input: NewCustomer) -> GatewayResult<Customer> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO customers (id, name, email, phone, user_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.email.as_deref().map(|email| email.trim().to_lowercase()))
        .bind(input.phone)
        .bind(input.user_id)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_customer(&id).await
    }

    /// Updates contact details. The auth link is left untouched.
    pub async fn update_customer(&self, id: &str, input: NewCustomer) -> GatewayResult<Customer> {
        let result = sqlx::query("UPDATE customers SET name = ?, email = ?, phone = ? WHERE id = ?")
            .bind(input.name.trim())
            .bind(input.email.as_deref().map(|email| email.trim().to_lowercase()))
            .bind(input.phone)
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "customer")?;
        self.get_customer(id).await
    }

    pub async fn delete_customer(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "customer")
    }

    pub async fn count_customers(&self) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Resolves the customer record for an authenticated user: by auth link first,
    /// then by email (linking it), otherwise a new record is created.
    pub async fn find_or_create_customer(
        &self,
        user_id: &str,
        email: &str,
        phone: Option<&str>,
    ) -> GatewayResult<Customer> {
        let phone = phone.map(str::trim).filter(|value| !value.is_empty());

        if let Some(customer) = self.find_customer_by_user(user_id).await? {
            return self.fill_missing_phone(customer, phone).await;
        }

        if let Some(customer) = self.find_customer_by_email(email).await? {
            sqlx::query("UPDATE customers SET user_id = ? WHERE id = ? AND user_id IS NULL")
                .bind(user_id)
                .bind(&customer.id)
                .execute(&self.db)
                .await?;
            let customer = self.get_customer(&customer.id).await?;
            return self.fill_missing_phone(customer, phone).await;
        }

        let created = self
            .create_customer(NewCustomer {
                name: display_name_from_email(email),
                email: Some(email.to_string()),
                phone: phone.map(str::to_string),
                user_id: Some(user_id.to_string()),
            })
            .await;

        match created {
            Ok(customer) => Ok(customer),
            // Another request created the same email first.
            Err(err) if err.is_unique_violation() => self
                .find_customer_by_email(email)
                .await?
                .ok_or(GatewayError::NotFound("customer")),
            Err(err) => Err(err),
        }
    }

    async fn fill_missing_phone(
        &self,
        customer: Customer,
        phone: Option<&str>,
    ) -> GatewayResult<Customer> {
        let Some(phone) = phone else {
            return Ok(customer);
        };
        if customer.phone.as_deref().is_some_and(|value| !value.trim().is_empty()) {
            return Ok(customer);
        }
        sqlx::query("UPDATE customers SET phone = ? WHERE id = ?")
            .bind(phone)
            .bind(&customer.id)
            .execute(&self.db)
            .await?;
        self.get_customer(&customer.id).await
    }
}

fn display_name_from_email(email: &str) -> String {
    let local = email.split('@').next().unwrap_or(email).trim();
    if local.is_empty() {
        email.trim().to_string()
    } else {
        local.to_string()
    }
}
