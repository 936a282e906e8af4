#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use storefront_core::{
    Address, Document, DocumentStore, MemoryDocumentStore, Order, Product, ProductCategory,
    PurchasedItem, Role, ShipmentStatus, UserInfo,
};
use storefront_core::core::OrderUser;

pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_600_000_000 + seconds, 0).unwrap()
}

pub fn product(id: &str, category: ProductCategory, inventory: u32, seconds: i64) -> Product {
    Product {
        id: id.to_string(),
        title: format!("Product {id}"),
        description: format!("Description of {id}"),
        image_url: format!("https://img.example.com/{id}.png"),
        image_ref: format!("products/{id}"),
        image_file_name: format!("{id}.png"),
        price: 25.0,
        category,
        inventory,
        creator: "admin-1".to_string(),
        created_at: at(seconds),
        updated_at: None,
    }
}

pub fn address() -> Address {
    Address {
        fullname: "Kim Lee".to_string(),
        address1: "1 Harbour St".to_string(),
        address2: None,
        city: "Busan".to_string(),
        zip_code: "48058".to_string(),
        phone: "010-0000-0000".to_string(),
    }
}

pub fn order(id: &str, user_id: &str, lines: Vec<(Product, u32)>, seconds: i64) -> Order {
    let items: Vec<PurchasedItem> = lines
        .into_iter()
        .map(|(item, quantity)| PurchasedItem {
            quantity,
            user: user_id.to_string(),
            item,
        })
        .collect();
    Order {
        id: id.to_string(),
        amount: storefront_core::core::cart_amount(&items),
        total_quantity: storefront_core::core::cart_quantity(&items),
        items,
        shipping_address: address(),
        user: OrderUser {
            id: user_id.to_string(),
            name: format!("User {user_id}"),
        },
        payment_status: None,
        shipment_status: Some(ShipmentStatus::New),
        created_at: at(seconds),
        updated_at: None,
    }
}

pub fn user(id: &str, role: Role, seconds: i64) -> UserInfo {
    UserInfo {
        id: id.to_string(),
        username: format!("user-{id}"),
        email: format!("{id}@example.com"),
        role,
        created_at: at(seconds),
        shipping_addresses: None,
        stripe_customer_id: None,
        updated_at: None,
    }
}

/// Inserts `count` products, newest last, cycling through the categories.
pub async fn seed_products(store: &Arc<MemoryDocumentStore>, count: usize) -> Vec<Product> {
    let mut products = Vec::with_capacity(count);
    for n in 0..count {
        let category = ProductCategory::ALL[n % ProductCategory::ALL.len()];
        let product = product(&format!("p{n:02}"), category, 10, n as i64);
        store
            .insert(
                storefront_core::Collection::Products,
                Document::from_entity(&product).unwrap(),
            )
            .await
            .unwrap();
        products.push(product);
    }
    products
}

/// Ids from newest to oldest, as a window lists them.
pub fn newest_first_ids(products: &[Product]) -> Vec<String> {
    products.iter().rev().map(|p| p.id.clone()).collect()
}
