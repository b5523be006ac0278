use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::BackendError;
use crate::models::{NewProduct, Product};
use crate::realtime::{LiveRow, Table};

const PRODUCT_COLUMNS: &str = "id, title, description, category, price, stock, artisan_id,
     artisan_name, rating, image_url, created_at";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        price: row.get(4)?,
        stock: row.get(5)?,
        artisan_id: row.get(6)?,
        artisan_name: row.get(7)?,
        rating: row.get(8)?,
        image_url: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Whole catalog, newest listings first. Filtering and sorting happen in
/// memory in `catalog`.
pub fn fetch_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC"
        ))
        .context("failed to prepare product query")?;

    let products = stmt
        .query_map([], product_from_row)
        .context("failed to load products")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect products")?;

    Ok(products)
}

pub fn fetch_product(conn: &Connection, id: i64) -> Result<Option<Product>> {
    conn.query_row(
        &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
        [id],
        product_from_row,
    )
    .optional()
    .context("failed to load product")
}

pub fn create_product(conn: &Connection, product: &NewProduct) -> Result<Product> {
    conn.execute(
        "INSERT INTO products (title, description, category, price, stock, artisan_id,
                               artisan_name, image_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            product.title,
            product.description,
            product.category,
            product.price,
            product.stock,
            product.artisan_id,
            product.artisan_name,
            product.image_url,
            Utc::now(),
        ],
    )
    .context("failed to insert product")?;

    let id = conn.last_insert_rowid();
    info!(product_id = id, artisan_id = product.artisan_id, "product listed");
    fetch_product(conn, id)?.ok_or_else(|| BackendError::NotFound { entity: "Product" }.into())
}

impl LiveRow for Product {
    const TABLE: Table = Table::Products;

    fn row_id(&self) -> i64 {
        self.id
    }

    fn fetch(conn: &Connection, id: i64) -> Result<Option<Self>> {
        fetch_product(conn, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_profile, open_in_memory};
    use crate::models::{NewProfile, Role};

    #[test]
    fn products_are_listed_newest_first() {
        let conn = open_in_memory().unwrap();
        let artisan = create_profile(
            &conn,
            &NewProfile {
                full_name: "Meera".into(),
                email: "meera@example.com".into(),
                role: Role::Host,
                phone: None,
                location: Some("Thrissur".into()),
                is_local: true,
            },
        )
        .unwrap();

        for title in ["Coir mat", "Brass lamp"] {
            create_product(
                &conn,
                &NewProduct {
                    title: title.into(),
                    description: String::new(),
                    category: "home".into(),
                    price: 18.5,
                    stock: 4,
                    artisan_id: artisan.id,
                    artisan_name: artisan.full_name.clone(),
                    image_url: None,
                },
            )
            .unwrap();
        }

        let titles: Vec<_> = fetch_products(&conn)
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Brass lamp", "Coir mat"]);
        assert!(fetch_product(&conn, 99).unwrap().is_none());
    }
}
