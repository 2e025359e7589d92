//! Typed `u32` IDs for signals and clock domains.

use crate::arena::ArenaId;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A signal within a fragment.
    SignalId,
    "sig"
);

define_id!(
    /// A clock domain within a fragment.
    DomainId,
    "dom"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_roundtrip_and_display() {
        let id = SignalId::from_raw(5);
        assert_eq!(id.as_raw(), 5);
        assert_eq!(id.to_string(), "sig5");
        assert_eq!(DomainId::from_raw(0).to_string(), "dom0");
    }

    #[test]
    fn ids_order_by_index() {
        assert!(SignalId::from_raw(1) < SignalId::from_raw(2));
    }
}
