//! Role and identity
//!
//! The single role-resolution path for the whole service. Roles are read from
//! the `users.role` column and parsed into the closed `Role` enumeration;
//! every authorization check downstream consumes an `Identity` value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed role enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::User => "USER",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(Role::Admin),
            "USER" => Ok(Role::User),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Error for role strings outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct RoleParseError(pub String);

/// The authenticated caller: user id plus resolved role.
///
/// This is the capability handed to handlers and services by the session
/// gate; it is the only source of authorization facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Ownership-or-admin check used by every per-entity accessor.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert_eq!(Role::Admin.as_str(), "ADMIN");
        assert_eq!(Role::User.to_string(), "USER");
    }

    #[test]
    fn test_role_rejects_unknown() {
        let err = "SUPERUSER".parse::<Role>();
        assert!(matches!(err, Err(RoleParseError(s)) if s == "SUPERUSER"));
        // Case matters: the column stores the canonical upper-case form.
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_identity_can_access() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        let user = Identity::new(owner, Role::User);

        assert!(admin.can_access(owner));
        assert!(user.can_access(owner));
        assert!(!user.can_access(stranger));
    }

    #[test]
    fn test_role_serde_uses_canonical_strings() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"ADMIN\"");
        let role: Role = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
