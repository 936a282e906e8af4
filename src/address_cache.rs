//! Remembers the shipping address picked at checkout between sessions.

use crate::core::{Address, Result};
use log::warn;
use std::collections::HashMap;
use std::sync::Mutex;

pub const SHIPPING_ADDRESS_KEY: &str = "shippingAddress";

/// Small string key/value storage local to one client.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: String) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.lock()?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock()?.remove(key);
        Ok(())
    }
}

pub struct ShippingAddressCache<K> {
    store: K,
}

impl<K: KeyValueStore> ShippingAddressCache<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    /// Cached address, or `None` when nothing usable is stored.
    pub fn get(&self) -> Result<Option<Address>> {
        let Some(raw) = self.store.get(SHIPPING_ADDRESS_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(address) => Ok(Some(address)),
            Err(err) => {
                warn!("ignoring malformed cached shipping address: {}", err);
                Ok(None)
            }
        }
    }

    pub fn set(&self, address: &Address) -> Result<()> {
        let raw = serde_json::to_string(address)?;
        self.store.set(SHIPPING_ADDRESS_KEY, raw)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(SHIPPING_ADDRESS_KEY)
    }

    pub fn store(&self) -> &K {
        &self.store
    }
}
