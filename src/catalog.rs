//! Catalog lookup: product snapshots at order-placement time.

use crate::domain::value_objects::Money;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub product_id: Uuid,
    pub name: String,
    pub price: Money,
    pub img: String,
    pub is_active: bool,
}

#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn resolve(&self, product_id: Uuid) -> Result<Option<CatalogEntry>>;
}

#[derive(Clone)]
pub struct PgCatalog { db: PgPool }

impl PgCatalog {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[derive(sqlx::FromRow)]
struct ProductRow { id: Uuid, name: String, price: i64, img: String, is_active: bool }

#[async_trait]
impl CatalogLookup for PgCatalog {
    async fn resolve(&self, product_id: Uuid) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query_as::<_, ProductRow>("SELECT id, name, price, img, is_active FROM products WHERE id = $1")
            .bind(product_id).fetch_optional(&self.db).await?;
        Ok(row.map(|r| CatalogEntry { product_id: r.id, name: r.name, price: Money::new(r.price), img: r.img, is_active: r.is_active }))
    }
}
