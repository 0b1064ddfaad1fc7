use serde::{Deserialize, Serialize};

/// Declares a numeric identifier newtype.
///
/// Identifiers are database-assigned 64-bit integers. Wrapping them keeps
/// an order id from being passed where a variant id is expected.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its raw value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

numeric_id!(
    /// Identifier of a storefront user (customer or administrator).
    UserId
);

numeric_id!(
    /// Identifier of a catalog product.
    ProductId
);

numeric_id!(
    /// Identifier of a purchasable product variant.
    VariantId
);

numeric_id!(
    /// Identifier of an order.
    ///
    /// Also the correlation id customers embed in bank-transfer descriptions.
    OrderId
);

numeric_id!(
    /// Identifier of an order line.
    OrderItemId
);
