//! HTTP route handlers.

pub mod auth;
pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use common::PageRequest;

fn page_request(page: Option<u32>, limit: Option<u32>) -> PageRequest {
    PageRequest::new(
        page.unwrap_or(1),
        limit.unwrap_or(PageRequest::DEFAULT_LIMIT),
    )
}
