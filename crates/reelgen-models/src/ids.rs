//! Identifier newtypes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a video project record.
    VideoId
);
string_id!(
    /// Identifier of a queued task delivery.
    TaskId
);
string_id!(
    /// Identifier of a bulk generation job.
    BulkJobId
);
string_id!(
    /// Identifier of a story-generation request.
    StoryRequestId
);
string_id!(
    /// Identifier of a connected publishing channel.
    ChannelId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(VideoId::new(), VideoId::new());
    }

    #[test]
    fn test_blank_id_is_empty() {
        assert!(VideoId::from("  ").is_empty());
        assert!(!VideoId::from("v1").is_empty());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let json = serde_json::to_string(&BulkJobId::from("b-1")).unwrap();
        assert_eq!(json, "\"b-1\"");
    }
}
