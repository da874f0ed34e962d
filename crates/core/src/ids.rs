//! Typed identifiers.
//!
//! Every catalog object is referenced by a small copyable id rather than by pointer, so that
//! catalog snapshots, journal records and planner state can refer to objects without borrowing them.

use core::fmt;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw id value.
            #[inline]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw id value.
            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a namespace.
    NamespaceId,
    "ns"
);
define_id!(
    /// Identifier of a logical entity (table, collection or graph).
    LogicalEntityId,
    "le"
);
define_id!(
    /// Identifier of an allocation entity (one placement of a logical entity on an adapter).
    AllocationId,
    "al"
);
define_id!(
    /// Identifier of a physical entity (an adapter's materialization of an allocation).
    PhysicalEntityId,
    "ph"
);
define_id!(
    /// Identifier of a registered adapter instance.
    AdapterId,
    "ad"
);
define_id!(
    /// Identifier of a logical column or property, unique across the catalog.
    ColumnId,
    "c"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(NamespaceId::new(3).to_string(), "ns3");
        assert_eq!(AllocationId::new(12).to_string(), "al12");
    }

    #[test]
    fn test_id_ordering() {
        assert!(NamespaceId::new(1) < NamespaceId::new(2));
        assert_eq!(ColumnId::new(7).raw(), 7);
    }

    #[test]
    fn test_id_serde_transparent() {
        let json = serde_json::to_string(&LogicalEntityId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: LogicalEntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LogicalEntityId::new(42));
    }
}
