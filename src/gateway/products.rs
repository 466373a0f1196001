use crate::{
    auth::new_id,
    models::{now_rfc3339, NewProduct, Product},
    pricing::{clamp_discount, round2, sale_price},
};

use super::{expect_affected, Gateway, GatewayError, GatewayResult};

const PRODUCT_COLUMNS: &str = "id, name, description, brand, category, purchase_price, original_price, \
     discount_percentage, sale_price, quantity, reorder_level, image_url, created_at";

impl Gateway {
    pub async fn list_products(&self) -> GatewayResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name COLLATE NOCASE"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn get_product(&self, id: &str) -> GatewayResult<Product> {
        sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(GatewayError::NotFound("product"))
    }

    pub async fn create_product(&self, input: NewProduct) -> GatewayResult<Product> {
        let id = new_id();
        let discount = clamp_discount(input.discount_percentage);
        sqlx::query(
            r#"INSERT INTO products
               (id, name, description, brand, category, purchase_price, original_price,
                discount_percentage, sale_price, quantity, reorder_level, image_url, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.name.trim())
        .bind(input.description)
        .bind(input.brand)
        .bind(input.category)
        .bind(round2(input.purchase_price))
        .bind(round2(input.original_price))
        .bind(discount)
        .bind(sale_price(input.original_price, discount))
        .bind(input.quantity)
        .bind(input.reorder_level)
        .bind(input.image_url)
        .bind(now_rfc3339())
        .execute(&self.db)
        .await?;
        self.get_product(&id).await
    }

    pub async fn update_product(&self, id: &str, input: NewProduct) -> GatewayResult<Product> {
        let discount = clamp_discount(input.discount_percentage);
        let result = sqlx::query(
            r#"UPDATE products
               SET name = ?, description = ?, brand = ?, category = ?, purchase_price = ?,
                   original_price = ?, discount_percentage = ?, sale_price = ?, quantity = ?,
                   reorder_level = ?, image_url = ?
               WHERE id = ?"#,
        )
        .bind(input.name.trim())
        .bind(input.description)
        .bind(input.brand)
        .bind(input.category)
        .bind(round2(input.purchase_price))
        .bind(round2(input.original_price))
        .bind(discount)
        .bind(sale_price(input.original_price, discount))
        .bind(input.quantity)
        .bind(input.reorder_level)
        .bind(input.image_url)
        .bind(id)
        .execute(&self.db)
        .await?;
        expect_affected(result.rows_affected(), "product")?;
        self.get_product(id).await
    }

    pub async fn set_product_image(&self, id: &str, image_url: Option<&str>) -> GatewayResult<Product> {
        let result = sqlx::query("UPDATE products SET image_url = ? WHERE id = ?")
            .bind(image_url)
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "product")?;
        self.get_product(id).await
    }

    pub async fn delete_product(&self, id: &str) -> GatewayResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        expect_affected(result.rows_affected(), "product")
    }

    pub async fn count_low_stock_products(&self) -> GatewayResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM products WHERE quantity <= reorder_level",
        )
        .fetch_one(&self.db)
        .await?;
        Ok(count)
    }
}
