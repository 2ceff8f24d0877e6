//! Strongly-typed identifiers for worktally

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares an integer row identifier backed by a store rowid.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

row_id!(
    /// Opaque reference to a user owned by the identity collaborator
    UserId
);
row_id!(
    /// Work category a session may be filed under
    CategoryId
);
row_id!(
    /// Time-tracking session (timer or manual segment)
    SessionId
);
row_id!(
    /// Declared work target
    TargetId
);
row_id!(
    /// Immutable evaluation outcome
    EvaluationId
);
row_id!(NotificationId);
row_id!(PunishmentId);

/// Unique identifier for a connected IPC client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_ids_are_transparent_on_the_wire() {
        let id = SessionId::new(17);
        assert_eq!(serde_json::to_string(&id).unwrap(), "17");

        let parsed: TargetId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, TargetId::new(3));
        assert_eq!(i64::from(parsed), 3);
    }

    #[test]
    fn client_id_uniqueness() {
        let c1 = ClientId::new();
        let c2 = ClientId::new();
        assert_ne!(c1, c2);
    }
}
