//! Identity types for PaySettle
//!
//! Merchants and shops are strongly typed wrappers around UUIDs so the two
//! can never be swapped by accident. An [`Owner`] is the unit settlement
//! figures are computed for.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

define_id_type!(MerchantId, "merchant", "Unique identifier for a merchant");
define_id_type!(ShopId, "shop", "Unique identifier for a shop (sub-entity of a merchant)");

/// The merchant or shop a settlement is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub merchant_id: MerchantId,
    pub shop_id: Option<ShopId>,
}

impl Owner {
    /// Merchant-level owner
    pub fn merchant(merchant_id: MerchantId) -> Self {
        Self {
            merchant_id,
            shop_id: None,
        }
    }

    /// Shop-level owner
    pub fn shop(merchant_id: MerchantId, shop_id: ShopId) -> Self {
        Self {
            merchant_id,
            shop_id: Some(shop_id),
        }
    }

    pub fn is_shop(&self) -> bool {
        self.shop_id.is_some()
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shop_id {
            Some(shop) => write!(f, "{}/{}", self.merchant_id, shop),
            None => write!(f, "{}", self.merchant_id),
        }
    }
}
