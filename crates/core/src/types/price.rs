//! Type-safe price representation.
//!
//! The shop API reports every monetary amount as an integer number of
//! eurocents (`1999` is 19.99 EUR). `Price` keeps that representation and
//! only converts at the display boundary.

use serde::{Deserialize, Serialize};

/// A price in eurocents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Create a price from an amount of eurocents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// The raw amount in eurocents.
    #[must_use]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whether this is the zero price (the API uses `0` for "not set",
    /// e.g. `old_price` on a variant that was never discounted).
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Price {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let euros = self.0 / 100;
        let cents = (self.0 % 100).abs();
        write!(f, "{euros},{cents:02} \u{20ac}")
    }
}

impl From<i64> for Price {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}
