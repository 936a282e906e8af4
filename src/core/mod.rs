pub mod entity;
pub mod error;
pub mod types;

pub use entity::{Collection, Cursor, Filter, ListEntity};
pub use error::{Result, StoreError};
pub use types::{
    Address, Order, OrderUser, PaymentStatus, Product, ProductCategory, PurchasedItem, Role,
    ShipmentStatus, UserInfo, cart_amount, cart_quantity,
};
