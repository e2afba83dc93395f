//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. The shop API hands
//! out plain unsigned integers for every entity, so all wrappers are `u64`.

use serde::{Deserialize, Serialize};

/// Macro to define a type-safe ID wrapper.
///
/// Creates a newtype wrapper around `u64` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`
/// - Conversion methods: `new()`, `as_u64()`
/// - `From<u64>` and `Into<u64>` implementations
///
/// # Example
///
/// ```rust
/// # use wavecart_core::define_id;
/// define_id!(LeftId);
/// define_id!(RightId);
///
/// let left = LeftId::new(1);
/// let right = RightId::new(1);
///
/// // These are different types, so this won't compile:
/// // let _: LeftId = right;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Create a new ID from a u64 value.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Get the underlying u64 value.
            #[must_use]
            pub const fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(ProductId);
define_id!(VariantId);
define_id!(CategoryId);
define_id!(FacetGroupId);
define_id!(FacetValueId);
define_id!(OrderId);

/// Deserialization helper for maps keyed by stringified numeric ids.
///
/// The shop API returns per-id results as objects whose keys are the decimal
/// string form of the id (`{"123": {...}}`).
#[must_use]
pub fn parse_id_key(key: &str) -> Option<u64> {
    key.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = ProductId::new(227_838);
        assert_eq!(id.as_u64(), 227_838);
        assert_eq!(u64::from(id), 227_838);
        assert_eq!(ProductId::from(227_838), id);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(CategoryId::new(16077).to_string(), "16077");
    }

    #[test]
    fn test_id_serde_transparent() {
        let id: VariantId = serde_json::from_str("4813890").expect("valid id");
        assert_eq!(id, VariantId::new(4_813_890));
        assert_eq!(
            serde_json::to_string(&id).expect("serializable"),
            "4813890"
        );
    }

    #[test]
    fn test_parse_id_key() {
        assert_eq!(parse_id_key("123"), Some(123));
        assert_eq!(parse_id_key("not-a-number"), None);
    }
}
