//! Typed ID wrappers for run, task, session, and artifact identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up run IDs, task IDs, etc.
/// These are opaque strings underneath — comparison is byte-wise,
/// and the kernel makes no assumptions about their format beyond
/// what `generate()` produces.
macro_rules! typed_id {
    ($name:ident, $prefix:literal, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh prefixed v4-UUID identifier.
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), uuid::Uuid::new_v4().simple()))
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(RunId, "run", "Unique identifier for a single executor run.");
typed_id!(TaskId, "task", "Unique identifier for a task within a workflow.");
typed_id!(SessionId, "session", "Unique identifier for an orchestrated session.");
typed_id!(ArtifactId, "artifact", "Unique identifier for a produced artifact.");
