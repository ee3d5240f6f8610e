//! Product catalog.

use chrono::Utc;
use common::{Money, Page, PageRequest, ProductId};
use serde::Deserialize;
use store::{NewProduct, Product, ProductQuery, Store, Transaction};

use crate::context::Caller;
use crate::error::{DomainError, Result};
use crate::inventory;

/// Fields of a new catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub stock: u32,
    pub category: String,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Partial product update. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub active: Option<bool>,
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn valid_price(price: Money) -> Result<Money> {
    if price.is_negative() {
        return Err(DomainError::InvalidArgument(
            "price must not be negative".to_string(),
        ));
    }
    Ok(price)
}

/// Service for the product catalog.
///
/// Reads are open to everyone; non-admin listings only show active
/// products. Writes require the admin role. Archived products are invisible.
pub struct CatalogService<S: Store> {
    store: S,
}

impl<S: Store> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, caller: &Caller, input: CreateProduct) -> Result<Product> {
        caller.require_admin()?;
        let product = NewProduct {
            name: required_text("name", &input.name)?,
            description: input.description,
            price: valid_price(input.price)?,
            stock: input.stock,
            category: required_text("category", &input.category)?,
            active: input.active.unwrap_or(true),
        };

        let mut tx = self.store.begin().await?;
        let product = tx.insert_product(product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn update(
        &self,
        caller: &Caller,
        id: ProductId,
        input: UpdateProduct,
    ) -> Result<Product> {
        caller.require_admin()?;

        let mut tx = self.store.begin().await?;
        let mut product = visible(tx.lock_product(id).await?, id)?;
        if let Some(ref name) = input.name {
            product.name = required_text("name", name)?;
        }
        if let Some(description) = input.description {
            product.description = Some(description);
        }
        if let Some(price) = input.price {
            product.price = valid_price(price)?;
        }
        if let Some(ref category) = input.category {
            product.category = required_text("category", category)?;
        }
        if let Some(active) = input.active {
            product.active = active;
        }
        product.updated_at = Utc::now();
        tx.update_product(&product).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Archives a product. It disappears from the catalog but stays
    /// referenced by past orders.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, caller: &Caller, id: ProductId) -> Result<()> {
        caller.require_admin()?;

        let mut tx = self.store.begin().await?;
        let mut product = visible(tx.lock_product(id).await?, id)?;
        let now = Utc::now();
        product.active = false;
        product.archived_at = Some(now);
        product.updated_at = now;
        tx.update_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %id, "product archived");
        Ok(())
    }

    pub async fn get(&self, id: ProductId) -> Result<Product> {
        let mut tx = self.store.begin().await?;
        visible(tx.get_product(id).await?, id)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, caller: &Caller, mut query: ProductQuery) -> Result<Page<Product>> {
        if !caller.is_admin() {
            query.active = Some(true);
        }
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_products(&query).await?;
        Ok(Page::new(items, total, query.page))
    }

    pub async fn by_category(
        &self,
        caller: &Caller,
        category: &str,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        let query = ProductQuery {
            category: Some(category.to_string()),
            page,
            ..Default::default()
        };
        self.list(caller, query).await
    }

    /// Case-insensitive search over name and description.
    pub async fn search(
        &self,
        caller: &Caller,
        text: &str,
        page: PageRequest,
    ) -> Result<Page<Product>> {
        let text = required_text("search text", text)?;
        let query = ProductQuery {
            search: Some(text),
            page,
            ..Default::default()
        };
        self.list(caller, query).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn adjust_stock(&self, caller: &Caller, id: ProductId, delta: i64) -> Result<Product> {
        caller.require_admin()?;

        let mut tx = self.store.begin().await?;
        let product = inventory::adjust_stock(&mut tx, id, delta).await?;
        tx.commit().await?;

        tracing::info!(product_id = %id, delta, stock = product.stock, "stock adjusted");
        Ok(product)
    }
}

fn visible(product: Option<Product>, id: ProductId) -> Result<Product> {
    product
        .filter(|p| !p.is_archived())
        .ok_or_else(|| DomainError::not_found("Product", id))
}

#[cfg(test)]
mod tests {
    use common::UserId;
    use store::InMemoryStore;

    use super::*;

    fn admin() -> Caller {
        Caller::admin(UserId::new(1))
    }

    fn hammer() -> CreateProduct {
        CreateProduct {
            name: "  Hammer ".to_string(),
            description: Some("Claw hammer".to_string()),
            price: Money::from_cents(1299),
            stock: 5,
            category: "tools".to_string(),
            active: None,
        }
    }

    #[tokio::test]
    async fn create_requires_admin_and_valid_fields() {
        let catalog = CatalogService::new(InMemoryStore::new());

        let err = catalog
            .create(&Caller::user(UserId::new(2)), hammer())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let mut bad = hammer();
        bad.price = Money::from_cents(-1);
        assert!(matches!(
            catalog.create(&admin(), bad).await,
            Err(DomainError::InvalidArgument(_))
        ));

        let product = catalog.create(&admin(), hammer()).await.unwrap();
        assert_eq!(product.name, "Hammer");
        assert!(product.active);
    }

    #[tokio::test]
    async fn deleted_products_disappear_from_reads() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let product = catalog.create(&admin(), hammer()).await.unwrap();

        catalog.delete(&admin(), product.id).await.unwrap();

        assert!(matches!(
            catalog.get(product.id).await,
            Err(DomainError::NotFound { .. })
        ));
        let page = catalog.list(&admin(), ProductQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(matches!(
            catalog.delete(&admin(), product.id).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn shoppers_only_list_active_products() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let product = catalog.create(&admin(), hammer()).await.unwrap();
        catalog.create(&admin(), CreateProduct { name: "Saw".to_string(), ..hammer() }).await.unwrap();
        catalog
            .update(
                &admin(),
                product.id,
                UpdateProduct {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let shopper = Caller::anonymous();
        let page = catalog.list(&shopper, ProductQuery::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Saw");

        let page = catalog.list(&admin(), ProductQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn search_and_category() {
        let catalog = CatalogService::new(InMemoryStore::new());
        catalog.create(&admin(), hammer()).await.unwrap();
        catalog
            .create(
                &admin(),
                CreateProduct {
                    name: "Apron".to_string(),
                    description: None,
                    category: "clothing".to_string(),
                    ..hammer()
                },
            )
            .await
            .unwrap();

        let shopper = Caller::anonymous();
        let found = catalog
            .search(&shopper, "CLAW", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].name, "Hammer");

        let clothing = catalog
            .by_category(&shopper, "clothing", PageRequest::default())
            .await
            .unwrap();
        assert_eq!(clothing.items.len(), 1);
        assert_eq!(clothing.items[0].name, "Apron");
    }

    #[tokio::test]
    async fn adjust_stock_is_admin_only() {
        let catalog = CatalogService::new(InMemoryStore::new());
        let product = catalog.create(&admin(), hammer()).await.unwrap();

        assert!(matches!(
            catalog
                .adjust_stock(&Caller::user(UserId::new(3)), product.id, 1)
                .await,
            Err(DomainError::Forbidden(_))
        ));
        let adjusted = catalog.adjust_stock(&admin(), product.id, -5).await.unwrap();
        assert_eq!(adjusted.stock, 0);
    }
}
