//! Per-request caller identity.

use common::{Role, SessionId, UserId};
use store::CartOwner;

use crate::error::DomainError;

/// An authenticated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Who is making a call: an authenticated principal, an anonymous session,
/// both, or neither.
///
/// Every workflow takes the caller explicitly; nothing is read from ambient
/// state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub principal: Option<Principal>,
    pub session_id: Option<SessionId>,
}

impl Caller {
    /// A caller with no identity at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            principal: Some(Principal::new(user_id, Role::User)),
            session_id: None,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            principal: Some(Principal::new(user_id, Role::Admin)),
            session_id: None,
        }
    }

    pub fn session(session_id: SessionId) -> Self {
        Self {
            principal: None,
            session_id: Some(session_id),
        }
    }

    /// Adds an anonymous session id to this caller.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn is_admin(&self) -> bool {
        self.principal.is_some_and(|p| p.is_admin())
    }

    /// Returns the authenticated principal or fails with `Unauthorized`.
    pub fn require_user(&self) -> Result<Principal, DomainError> {
        self.principal
            .ok_or_else(|| DomainError::Unauthorized("authentication required".to_string()))
    }

    /// Returns the principal if it is an admin.
    pub fn require_admin(&self) -> Result<Principal, DomainError> {
        let principal = self.require_user()?;
        if !principal.is_admin() {
            return Err(DomainError::Forbidden("admin role required".to_string()));
        }
        Ok(principal)
    }

    /// Resolves the cart owner. An authenticated user wins over a session.
    pub fn cart_owner(&self) -> Result<CartOwner, DomainError> {
        match (self.principal, &self.session_id) {
            (Some(principal), _) => Ok(CartOwner::User(principal.user_id)),
            (None, Some(session_id)) => Ok(CartOwner::Session(session_id.clone())),
            (None, None) => Err(DomainError::InvalidArgument(
                "a user or a session id is required".to_string(),
            )),
        }
    }
}
