use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::{Collection, Filter, ListEntity};

/// Role carried by an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin,
    Admin,
    Client,
}

impl Role {
    /// Admins and super admins manage the whole store.
    #[inline]
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    #[inline]
    pub fn is_client(&self) -> bool {
        matches!(self, Role::Client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductCategory {
    Clothing,
    Shoes,
    Watches,
    Accessories,
}

impl ProductCategory {
    /// Categories in tab order.
    pub const ALL: [ProductCategory; 4] = [
        ProductCategory::Accessories,
        ProductCategory::Clothing,
        ProductCategory::Shoes,
        ProductCategory::Watches,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductCategory::Clothing => "Clothing",
            ProductCategory::Shoes => "Shoes",
            ProductCategory::Watches => "Watches",
            ProductCategory::Accessories => "Accessories",
        }
    }

    /// Tabs shown above the product grid: "All" first, then every category.
    pub fn tabs() -> Vec<Filter> {
        std::iter::once(Filter::All)
            .chain(Self::ALL.iter().map(|c| Filter::label(c.as_str())))
            .collect()
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipmentStatus {
    New,
    Preparing,
    Shipped,
    Delivered,
    Canceled,
}

impl ShipmentStatus {
    pub const ALL: [ShipmentStatus; 5] = [
        ShipmentStatus::New,
        ShipmentStatus::Preparing,
        ShipmentStatus::Shipped,
        ShipmentStatus::Delivered,
        ShipmentStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::New => "New",
            ShipmentStatus::Preparing => "Preparing",
            ShipmentStatus::Shipped => "Shipped",
            ShipmentStatus::Delivered => "Delivered",
            ShipmentStatus::Canceled => "Canceled",
        }
    }

    /// Order tabs list every status and end with "All".
    pub fn tabs() -> Vec<Filter> {
        Self::ALL
            .iter()
            .map(|s| Filter::label(s.as_str()))
            .chain(std::iter::once(Filter::All))
            .collect()
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Success,
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub fullname: String,
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    pub zip_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub image_ref: String,
    pub image_file_name: String,
    pub price: f64,
    pub category: ProductCategory,
    pub inventory: u32,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListEntity for Product {
    const COLLECTION: Collection = Collection::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn label(&self) -> Option<&str> {
        Some(self.category.as_str())
    }
}

/// A product line frozen into an order at purchase time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchasedItem {
    pub quantity: u32,
    pub user: String,
    pub item: Product,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUser {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub items: Vec<PurchasedItem>,
    pub amount: f64,
    pub total_quantity: u32,
    pub shipping_address: Address,
    pub user: OrderUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipment_status: Option<ShipmentStatus>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListEntity for Order {
    const COLLECTION: Collection = Collection::Orders;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn label(&self) -> Option<&str> {
        self.shipment_status.as_ref().map(ShipmentStatus::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_addresses: Option<Vec<Address>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListEntity for UserInfo {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Total number of units across purchased lines.
pub fn cart_quantity(items: &[PurchasedItem]) -> u32 {
    items.iter().map(|line| line.quantity).sum()
}

/// Total price across purchased lines.
pub fn cart_amount(items: &[PurchasedItem]) -> f64 {
    items
        .iter()
        .map(|line| f64::from(line.quantity) * line.item.price)
        .sum()
}
