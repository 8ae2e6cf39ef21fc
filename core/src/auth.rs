//! Caller identity and the single capability check made at operation entry.
//!
//! The identity provider is external. Operations receive an already
//! resolved `Caller` (or none) and never look at tokens themselves.

use crate::{
    error::{LedgerError, LedgerResult},
    types::UserId,
};
use serde::{Deserialize, Serialize};

/// Custom role claims attached to a caller's token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleClaims {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub staff: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub uid: UserId,
    #[serde(default)]
    pub claims: RoleClaims,
}

impl Caller {
    /// A regular player with no role claims.
    pub fn player(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            claims: RoleClaims::default(),
        }
    }

    pub fn staff(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            claims: RoleClaims { admin: false, staff: true },
        }
    }

    pub fn admin(uid: impl Into<UserId>) -> Self {
        Self {
            uid: uid.into(),
            claims: RoleClaims { admin: true, staff: false },
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.claims.admin || self.claims.staff
    }
}

/// What an operation needs from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Floor work: seating players, dispensing and tallying chips, selling chips.
    ManageFloor,
    /// Any signed-in user acting on their own records.
    SelfService,
}

impl Capability {
    pub fn requires_privilege(&self) -> bool {
        matches!(self, Self::ManageFloor)
    }
}

/// Resolve the caller for an operation, or the reason it may not proceed.
pub fn authorize(caller: Option<&Caller>, capability: Capability) -> LedgerResult<&Caller> {
    let caller = caller.ok_or(LedgerError::Unauthenticated)?;
    if capability.requires_privilege() && !caller.is_privileged() {
        return Err(LedgerError::PermissionDenied(format!(
            "{} requires an admin or staff role",
            describe(capability)
        )));
    }
    Ok(caller)
}

/// Resource-level check: the caller owns the record or works the floor.
pub fn ensure_owner_or_privileged(caller: &Caller, owner: &str, what: &str) -> LedgerResult<()> {
    if caller.uid == owner || caller.is_privileged() {
        Ok(())
    } else {
        Err(LedgerError::PermissionDenied(format!(
            "{what} belongs to another user"
        )))
    }
}

fn describe(capability: Capability) -> &'static str {
    match capability {
        Capability::ManageFloor => "floor management",
        Capability::SelfService => "self service",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn missing_caller_is_unauthenticated() {
        let err = authorize(None, Capability::SelfService).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }

    #[test]
    fn players_cannot_manage_the_floor() {
        let player = Caller::player("u1");
        let err = authorize(Some(&player), Capability::ManageFloor).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert!(authorize(Some(&player), Capability::SelfService).is_ok());
    }

    #[test]
    fn staff_and_admin_are_privileged() {
        assert!(authorize(Some(&Caller::staff("s")), Capability::ManageFloor).is_ok());
        assert!(authorize(Some(&Caller::admin("a")), Capability::ManageFloor).is_ok());
    }

    #[test]
    fn ownership_check() {
        let player = Caller::player("u1");
        assert!(ensure_owner_or_privileged(&player, "u1", "order").is_ok());
        assert!(ensure_owner_or_privileged(&player, "u2", "order").is_err());
        assert!(ensure_owner_or_privileged(&Caller::staff("s"), "u2", "order").is_ok());
    }
}
