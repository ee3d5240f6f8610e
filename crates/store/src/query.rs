use chrono::{DateTime, Utc};
use common::{Money, OrderStatus, PageRequest, SortDirection, UserId};
use serde::Deserialize;

use crate::{Order, Product};

/// Column a product listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortField {
    #[default]
    Id,
    Name,
    Price,
    Stock,
    CreatedAt,
}

impl ProductSortField {
    pub fn as_column(&self) -> &'static str {
        match self {
            ProductSortField::Id => "id",
            ProductSortField::Name => "name",
            ProductSortField::Price => "price_cents",
            ProductSortField::Stock => "stock",
            ProductSortField::CreatedAt => "created_at",
        }
    }
}

/// Filter for product listings. Archived products never match.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Exact category match.
    pub category: Option<String>,

    /// Case-insensitive substring of name or description.
    pub search: Option<String>,

    /// Filter on the active flag.
    pub active: Option<bool>,

    /// Minimum unit price (inclusive).
    pub min_price: Option<Money>,

    /// Maximum unit price (inclusive).
    pub max_price: Option<Money>,

    pub sort: ProductSortField,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl ProductQuery {
    /// Returns true if `product` passes every filter of this query.
    pub fn matches(&self, product: &Product) -> bool {
        if product.is_archived() {
            return false;
        }
        if let Some(ref category) = self.category
            && &product.category != category
        {
            return false;
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let in_name = product.name.to_lowercase().contains(&needle);
            let in_description = product
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        if let Some(active) = self.active
            && product.active != active
        {
            return false;
        }
        if let Some(min) = self.min_price
            && product.price < min
        {
            return false;
        }
        if let Some(max) = self.max_price
            && product.price > max
        {
            return false;
        }
        true
    }
}

/// Column an order listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSortField {
    Id,
    #[default]
    CreatedAt,
    Total,
    Status,
}

impl OrderSortField {
    pub fn as_column(&self) -> &'static str {
        match self {
            OrderSortField::Id => "id",
            OrderSortField::CreatedAt => "created_at",
            OrderSortField::Total => "total_cents",
            OrderSortField::Status => "status",
        }
    }
}

/// Filter for order listings.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Restrict to orders owned by this user.
    pub user_id: Option<UserId>,

    pub status: Option<OrderStatus>,

    /// Orders created at or after this instant.
    pub created_from: Option<DateTime<Utc>>,

    /// Orders created at or before this instant.
    pub created_to: Option<DateTime<Utc>>,

    /// Minimum order total (inclusive).
    pub min_total: Option<Money>,

    /// Maximum order total (inclusive).
    pub max_total: Option<Money>,

    pub sort: OrderSortField,
    pub direction: SortDirection,
    pub page: PageRequest,
}

impl OrderQuery {
    /// Returns true if `order` passes every filter of this query.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(user_id) = self.user_id
            && order.user_id != user_id
        {
            return false;
        }
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(from) = self.created_from
            && order.created_at < from
        {
            return false;
        }
        if let Some(to) = self.created_to
            && order.created_at > to
        {
            return false;
        }
        if let Some(min) = self.min_total
            && order.total < min
        {
            return false;
        }
        if let Some(max) = self.max_total
            && order.total > max
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use common::ProductId;

    use super::*;

    fn product(name: &str, description: Option<&str>) -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(1),
            name: name.to_string(),
            description: description.map(String::from),
            price: Money::from_cents(500),
            stock: 3,
            category: "tools".to_string(),
            active: true,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn search_matches_name_or_description_case_insensitively() {
        let query = ProductQuery {
            search: Some("HAMMER".to_string()),
            ..Default::default()
        };
        assert!(query.matches(&product("Claw hammer", None)));
        assert!(query.matches(&product("Tool", Some("a small hammer"))));
        assert!(!query.matches(&product("Saw", Some("cuts wood"))));
    }

    #[test]
    fn archived_products_never_match() {
        let mut p = product("Claw hammer", None);
        p.archived_at = Some(Utc::now());
        assert!(!ProductQuery::default().matches(&p));
    }

    #[test]
    fn price_range_is_inclusive() {
        let query = ProductQuery {
            min_price: Some(Money::from_cents(500)),
            max_price: Some(Money::from_cents(500)),
            ..Default::default()
        };
        assert!(query.matches(&product("Claw hammer", None)));
    }
}
