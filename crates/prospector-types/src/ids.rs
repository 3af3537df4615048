//! Type-safe identifier wrappers.
//!
//! The game server hands out three kinds of opaque identifiers: coin units
//! (numbers), permit (license) ids (numbers), and treasure ids (strings).
//! Each gets its own newtype so they can never be mixed up at a call site.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around an integer identifier.
macro_rules! define_numeric_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }
    };
}

define_numeric_id! {
    /// One unit of in-game currency. Coins are fungible; the id only exists
    /// because the server wants the exact units back when they are spent.
    CoinId(u32)
}

define_numeric_id! {
    /// Identifier of a digging permit (a "license" on the wire).
    PermitId(u64)
}

/// Identifier of a dug-up treasure, exchanged for coins via `cash`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreasureId(pub String);

impl TreasureId {
    /// Borrow the raw treasure id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for TreasureId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TreasureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TreasureId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}
