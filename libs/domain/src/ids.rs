//! Type-safe prefixed ID types for domain entities.
//!
//! Each ID type wraps a UUID v7 (time-ordered) and serializes with a
//! human-readable prefix, e.g. `wf_01961a8e-7d3a-7f1c-9b2e-4a5c6d7e8f90`.
//!
//! Adapter ids and skill package ids are *not* UUIDs: they are dotted name
//! strings (`system.logger`, `skill.builtin.mood.checkin`) and stay plain
//! `String`s throughout the platform.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when parsing entity IDs
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdParseError {
    #[error("missing prefix separator '_'")]
    MissingPrefix,
    #[error("wrong prefix: expected '{expected}', got '{got}'")]
    WrongPrefix { expected: &'static str, got: String },
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl From<uuid::Error> for IdParseError {
    fn from(e: uuid::Error) -> Self {
        IdParseError::InvalidUuid(e.to_string())
    }
}

/// Macro to define a prefixed ID type with all necessary implementations
macro_rules! define_prefixed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            /// The string prefix for this ID type
            pub const PREFIX: &'static str = $prefix;

            /// Create a new ID with UUID v7 (time-ordered)
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Create an ID from an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the underlying UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Get the inner UUID value
            #[must_use]
            pub const fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (prefix, uuid_str) = s.split_once('_').ok_or(IdParseError::MissingPrefix)?;

                if prefix != Self::PREFIX {
                    return Err(IdParseError::WrongPrefix {
                        expected: Self::PREFIX,
                        got: prefix.to_string(),
                    });
                }

                let uuid = Uuid::parse_str(uuid_str)?;
                Ok(Self(uuid))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

define_prefixed_id!(UserId, "user");
define_prefixed_id!(WorkflowId, "wf");
define_prefixed_id!(ExecutionId, "exec");
define_prefixed_id!(InstallationId, "inst");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip() {
        let id = WorkflowId::new();
        let s = id.to_string();
        assert!(s.starts_with("wf_"));

        let parsed: WorkflowId = s.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_wrong_prefix_rejected() {
        let id = ExecutionId::new();
        let err = id.to_string().parse::<WorkflowId>().unwrap_err();
        assert!(matches!(err, IdParseError::WrongPrefix { .. }));
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let err = Uuid::now_v7().to_string().parse::<UserId>();
        // A bare UUID contains no '_' before the UUID body, so the split
        // yields a wrong prefix rather than a missing one.
        assert!(err.is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = InstallationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let back: InstallationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
