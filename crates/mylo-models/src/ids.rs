//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
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
    /// Identifier of a job record (one uploaded source video).
    JobId
);

string_id!(
    /// Identifier of the owning account. Also the concurrency partition key.
    OwnerId
);

string_id!(
    /// Identifier of a clip artifact.
    ClipId
);

/// Key of one workflow instance.
///
/// Formatted as `<job_id>:<run>`. A fresh key is allocated for every
/// submission; a redelivered trigger carries its original key so the
/// executor can resume from the journal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    /// Allocate a new instance key for a job.
    pub fn for_job(job_id: &JobId) -> Self {
        Self(format!("{}:{}", job_id, Uuid::new_v4().simple()))
    }

    /// Rebuild a key from its stored form.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Job ID portion of the key.
    pub fn job_id(&self) -> JobId {
        match self.0.rsplit_once(':') {
            Some((job, _)) => JobId::from_string(job),
            None => JobId::from_string(self.0.clone()),
        }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
