//! Product identifier newtype.
//!
//! The catalog and the remote cart service disagree on id representation
//! (numbers in the catalog, strings on the server), so every id is carried
//! as its string form.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Stable product identifier, unique within a cart.
///
/// An empty id is representable because normalization never fails; callers
/// treat it as "unidentifiable" and skip the item.
///
/// # Example
///
/// ```rust
/// # use cart_sync_core::ProductId;
/// let id = ProductId::new("42");
/// assert_eq!(id.as_str(), "42");
/// assert_eq!(ProductId::from(7_u64), ProductId::new("7"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Create a new product id. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty (the item could not be identified).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ProductId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<u64> for ProductId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
