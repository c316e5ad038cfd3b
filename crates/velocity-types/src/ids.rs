//! Type-safe identifier wrappers around [`String`].
//!
//! Junctions are keyed by the stable string names used in the static
//! configuration (e.g. `junction1`), and vehicles by whatever identifier
//! the triggering client supplies. Wrapping both prevents passing a
//! vehicle id where a junction id is expected.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Return the inner [`String`] value.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl core::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Stable key of a junction, taken from the static configuration.
    JunctionId
}

define_id! {
    /// Identifier of the emergency vehicle that requested preemption.
    VehicleId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = JunctionId::new("junction1");
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json.as_deref(), Some("\"junction1\""));
    }

    #[test]
    fn id_display_matches_inner() {
        let id = VehicleId::from("amb-7");
        assert_eq!(id.to_string(), "amb-7");
        assert_eq!(id.as_str(), "amb-7");
    }

    #[test]
    fn ids_lookup_by_str() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(JunctionId::from("junction1"), 1_u8);
        assert_eq!(map.get("junction1"), Some(&1));
    }
}
