//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use common::{Money, OrderStatus, PageRequest, Role, SessionId, SortDirection, UserId};
use serial_test::serial;
use store::{
    CartOwner, NewOrder, NewOrderItem, NewProduct, NewUser, OrderQuery, PostgresStore,
    ProductQuery, ProductSortField, Store, StoreError, Transaction, USERS_EMAIL_UNIQUE,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let store = PostgresStore::connect(&connection_string, 2).await.unwrap();
            store.run_migrations().await.unwrap();
            store.pool().close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_items, orders, cart_items, carts, products, users RESTART IDENTITY CASCADE",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store
}

fn new_product(name: &str, price_cents: i64, stock: u32) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: Some(format!("{name} description")),
        price: Money::from_cents(price_cents),
        stock,
        category: "tools".to_string(),
        active: true,
    }
}

fn new_user(email: &str) -> NewUser {
    NewUser {
        email: email.to_string(),
        name: "Test User".to_string(),
        password_hash: "salt$hash".to_string(),
        role: Role::User,
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_product_roundtrip_and_rollback() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let product = tx.insert_product(new_product("Hammer", 1299, 5)).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let mut locked = tx.lock_product(product.id).await.unwrap().unwrap();
    locked.stock = 0;
    tx.update_product(&locked).await.unwrap();
    drop(tx);

    let mut tx = store.begin().await.unwrap();
    let loaded = tx.get_product(product.id).await.unwrap().unwrap();
    assert_eq!(loaded.stock, 5);
    assert_eq!(loaded.price, Money::from_cents(1299));
    assert!(!loaded.is_archived());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_list_products_filters_sorts_and_pages() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    for (name, price) in [("Saw", 2500), ("Hammer", 1299), ("Drill", 8999), ("100% Glue", 499)] {
        tx.insert_product(new_product(name, price, 3)).await.unwrap();
    }
    let mut archived = tx.insert_product(new_product("Old hammer", 100, 1)).await.unwrap();
    archived.archived_at = Some(chrono::Utc::now());
    tx.update_product(&archived).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let query = ProductQuery {
        sort: ProductSortField::Price,
        direction: SortDirection::Asc,
        page: PageRequest::new(1, 2),
        ..Default::default()
    };
    let (page, total) = tx.list_products(&query).await.unwrap();
    assert_eq!(total, 4);
    let names: Vec<_> = page.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["100% Glue", "Hammer"]);

    let search = ProductQuery {
        search: Some("HAMMER".to_string()),
        ..Default::default()
    };
    let (found, total) = tx.list_products(&search).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].name, "Hammer");

    let literal = ProductQuery {
        search: Some("%".to_string()),
        ..Default::default()
    };
    let (_, total) = tx.list_products(&literal).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_cart_lines_and_unique_product_per_cart() {
    let store = get_test_store().await;
    let owner = CartOwner::Session(SessionId::new("guest-1").unwrap());

    let mut tx = store.begin().await.unwrap();
    let product = tx.insert_product(new_product("Hammer", 1299, 5)).await.unwrap();
    let cart = tx.insert_cart(&owner).await.unwrap();
    let item = tx.insert_cart_item(cart.id, product.id, 2).await.unwrap();
    tx.set_cart_item_quantity(item.id, 4).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let cart = tx.find_cart(&owner).await.unwrap().unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 4);

    let err = tx.insert_cart_item(cart.id, product.id, 1).await.unwrap_err();
    assert!(err.is_unique_violation("cart_items_cart_id_product_id_key"));
    drop(tx);

    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_cart(&owner).await.unwrap_err();
    assert!(err.is_unique_violation("carts_session_id_key"));
    drop(tx);

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.clear_cart_items(cart.id).await.unwrap(), 1);
    tx.delete_cart(cart.id).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.find_cart(&owner).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_orders_with_items_and_status_totals() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let user = tx.insert_user(new_user("buyer@example.com")).await.unwrap();
    let hammer = tx.insert_product(new_product("Hammer", 1299, 5)).await.unwrap();
    let saw = tx.insert_product(new_product("Saw", 2500, 5)).await.unwrap();
    let first = tx
        .insert_order(NewOrder::new(
            user.id,
            Some("leave at door".to_string()),
            vec![
                NewOrderItem {
                    product_id: hammer.id,
                    quantity: 2,
                    unit_price: hammer.price,
                },
                NewOrderItem {
                    product_id: saw.id,
                    quantity: 1,
                    unit_price: saw.price,
                },
            ],
        )
        .unwrap())
        .await
        .unwrap();
    let second = tx
        .insert_order(NewOrder::new(
            user.id,
            None,
            vec![NewOrderItem {
                product_id: saw.id,
                quantity: 1,
                unit_price: saw.price,
            }],
        )
        .unwrap())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(first.status, OrderStatus::Pending);
    assert_eq!(first.total, Money::from_cents(5098));
    assert_eq!(first.items.len(), 2);
    assert_eq!(Some(first.total), first.items_total());

    let mut tx = store.begin().await.unwrap();
    let mut locked = tx.lock_order(second.id).await.unwrap().unwrap();
    locked.status = OrderStatus::Cancelled;
    tx.update_order(&locked).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let (orders, total) = tx
        .list_orders(&OrderQuery {
            user_id: Some(user.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(orders.iter().all(|o| !o.items.is_empty()));

    let totals = tx.order_status_totals(Some(user.id)).await.unwrap();
    let pending = totals.iter().find(|t| t.status == OrderStatus::Pending).unwrap();
    assert_eq!(pending.count, 1);
    assert_eq!(pending.total, Money::from_cents(5098));
    let cancelled = totals.iter().find(|t| t.status == OrderStatus::Cancelled).unwrap();
    assert_eq!(cancelled.total, Money::from_cents(2500));

    assert!(tx.order_status_totals(Some(UserId::new(999))).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_user_email_is_unique_ignoring_case() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let user = tx.insert_user(new_user("Buyer@Example.com")).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let found = tx.find_user_by_email("buyer@example.COM").await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    let err = tx.insert_user(new_user("BUYER@example.com")).await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }));
    assert!(err.is_unique_violation(USERS_EMAIL_UNIQUE));
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn test_concurrent_cart_creation_conflicts_without_aborting() {
    let store = get_test_store().await;
    let owner = CartOwner::User(UserId::new(1));
    {
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(new_user("buyer@example.com")).await.unwrap();
        tx.commit().await.unwrap();
    }

    let mut first = store.begin().await.unwrap();
    let created = first.insert_cart(&owner).await.unwrap();

    let mut second = store.begin().await.unwrap();
    assert!(second.find_cart(&owner).await.unwrap().is_none());

    let committer = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        first.commit().await.unwrap();
    });

    // Blocks on the uncommitted row, then reports the conflict.
    let err = second.insert_cart(&owner).await.unwrap_err();
    assert!(err.is_unique_violation(owner.unique_constraint()));
    committer.await.unwrap();

    let found = second.find_cart(&owner).await.unwrap().unwrap();
    assert_eq!(found.id, created.id);
    second.commit().await.unwrap();
}
