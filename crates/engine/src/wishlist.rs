//! Local-only wishlist.
//!
//! Shares the normalizer and persistence with the cart but has no remote
//! protocol: an item is either on the list or not.

use std::sync::Arc;

use cart_sync_core::{CartItem, ProductId, Quantity};
use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::error::add_breadcrumb;
use crate::normalize::{RawItem, normalize, normalize_list};
use crate::storage::{CartPersistence, Record, RecordEnvelope, StorageError};
use crate::store::LocalCartStore;

/// Saved-for-later items, in the order they were added.
pub struct Wishlist {
    items: IndexMap<ProductId, CartItem>,
    storage: Arc<dyn CartPersistence>,
}

impl Wishlist {
    /// Hydrate from storage; unreadable records start empty.
    pub fn open(storage: Arc<dyn CartPersistence>) -> Self {
        let items = match storage.load(Record::Wishlist) {
            Ok(Some(value)) => normalize_list(value)
                .into_iter()
                .map(|item| (item.id.clone(), item.with_qty(Quantity::ONE)))
                .collect(),
            Ok(None) => IndexMap::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted wishlist, starting empty");
                IndexMap::new()
            }
        };
        debug!(items = items.len(), "Wishlist hydrated");
        Self { items, storage }
    }

    /// Save an item. Returns `false` if it was already saved or has no id.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    pub fn add(&mut self, item: RawItem) -> Result<bool, StorageError> {
        let item = normalize(item).with_qty(Quantity::ONE);
        if item.id.is_empty() || self.items.contains_key(&item.id) {
            return Ok(false);
        }
        add_breadcrumb("wishlist", "add", &[("id", item.id.as_str())]);
        self.items.insert(item.id.clone(), item);
        self.commit()?;
        Ok(true)
    }

    /// Drop an item. Returns `false` if it was not saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the wishlist could not be persisted.
    pub fn remove(&mut self, id: &ProductId) -> Result<bool, StorageError> {
        if self.items.shift_remove(id).is_none() {
            return Ok(false);
        }
        add_breadcrumb("wishlist", "remove", &[("id", id.as_str())]);
        self.commit()?;
        Ok(true)
    }

    #[must_use]
    pub fn contains(&self, id: &ProductId) -> bool {
        self.items.contains_key(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Put one unit of a saved item in the cart and drop it from the list.
    ///
    /// Returns `false` if the item was not saved.
    ///
    /// # Errors
    ///
    /// Returns an error if either record could not be persisted. The item
    /// is removed from the wishlist only once the cart write succeeded.
    pub fn move_to_cart(
        &mut self,
        id: &ProductId,
        cart: &mut LocalCartStore,
    ) -> Result<bool, StorageError> {
        let Some(item) = self.items.get(id).cloned() else {
            return Ok(false);
        };
        cart.add_item(item, Quantity::ONE)?;
        self.remove(id)
    }

    fn commit(&self) -> Result<(), StorageError> {
        let result = RecordEnvelope::new(&self.items)
            .to_value()
            .and_then(|value| self.storage.save(Record::Wishlist, &value));
        if let Err(e) = &result {
            error!(error = %e, "Failed to persist wishlist");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStorage;

    fn product(id: &str) -> RawItem {
        RawItem::classify(json!({"_id": id, "name": format!("Product {id}"), "price": "12.50"}))
    }

    #[test]
    fn test_add_is_existence_only() {
        let mut wishlist = Wishlist::open(Arc::new(MemoryStorage::new()));
        assert!(wishlist.add(product("a")).unwrap());
        assert!(!wishlist.add(product("a")).unwrap());
        assert_eq!(wishlist.len(), 1);
        assert_eq!(wishlist.items().next().unwrap().qty, Quantity::ONE);
    }

    #[test]
    fn test_add_without_id_is_ignored() {
        let mut wishlist = Wishlist::open(Arc::new(MemoryStorage::new()));
        assert!(!wishlist.add(RawItem::classify(json!({"title": "?"}))).unwrap());
        assert!(wishlist.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut wishlist = Wishlist::open(Arc::new(MemoryStorage::new()));
        wishlist.add(product("a")).unwrap();
        assert!(wishlist.remove(&ProductId::new("a")).unwrap());
        assert!(!wishlist.remove(&ProductId::new("a")).unwrap());
        assert!(!wishlist.contains(&ProductId::new("a")));
    }

    #[test]
    fn test_persists_separately_from_cart() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let mut wishlist = Wishlist::open(storage.clone());
            wishlist.add(product("a")).unwrap();
            wishlist.add(product("b")).unwrap();
        }
        assert!(storage.raw(Record::Cart).is_none());

        let reopened = Wishlist::open(storage);
        let ids: Vec<_> = reopened.items().map(|i| i.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_move_to_cart() {
        let storage = Arc::new(MemoryStorage::new());
        let mut wishlist = Wishlist::open(storage.clone());
        let mut cart = LocalCartStore::open(storage);
        wishlist.add(product("a")).unwrap();

        assert!(wishlist.move_to_cart(&ProductId::new("a"), &mut cart).unwrap());
        assert!(wishlist.is_empty());
        assert_eq!(cart.cart().quantity_of(&ProductId::new("a")), 1);
        assert_eq!(cart.cart().get(&ProductId::new("a")).unwrap().title, "Product a");

        assert!(!wishlist.move_to_cart(&ProductId::new("a"), &mut cart).unwrap());
    }

    #[test]
    fn test_move_keeps_item_when_cart_write_fails() {
        let storage = Arc::new(MemoryStorage::new());
        let mut wishlist = Wishlist::open(storage.clone());
        let mut cart = LocalCartStore::open(storage.clone());
        wishlist.add(product("a")).unwrap();
        storage.set_fail_saves(true);

        assert!(wishlist.move_to_cart(&ProductId::new("a"), &mut cart).is_err());
        assert!(wishlist.contains(&ProductId::new("a")));
    }
}
