//! # Identity Module
//!
//! Định nghĩa Identity - principal sở hữu credits.
//! - Anonymous: gắn với session, không có row trong database
//! - Authenticated: user đã đăng nhập, có row bền vững

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Loại identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKind {
    Anonymous,
    Authenticated,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Anonymous => "anonymous",
            IdentityKind::Authenticated => "authenticated",
        }
    }
}

/// Principal gọi vào Entitlement Gate.
///
/// Owner ID là opaque - gate không diễn giải nội dung của nó.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Identity {
    /// Session-scoped visitor
    Anonymous(String),
    /// Signed-in user
    Authenticated(String),
}

impl Identity {
    /// Tạo anonymous identity từ session ID có sẵn
    pub fn anonymous(session_id: &str) -> CoreResult<Self> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(CoreError::InvalidIdentity(
                "session id cannot be empty".to_string(),
            ));
        }
        Ok(Identity::Anonymous(session_id.to_string()))
    }

    /// Tạo anonymous identity với session ID ngẫu nhiên
    pub fn new_session() -> Self {
        Identity::Anonymous(format!("anon_{}", Uuid::new_v4().simple()))
    }

    /// Tạo authenticated identity
    pub fn authenticated(user_id: &str) -> CoreResult<Self> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(CoreError::InvalidIdentity(
                "user id cannot be empty".to_string(),
            ));
        }
        Ok(Identity::Authenticated(user_id.to_string()))
    }

    /// Owner key dùng cho ledger/policy stores
    pub fn owner_id(&self) -> &str {
        match self {
            Identity::Anonymous(id) | Identity::Authenticated(id) => id,
        }
    }

    pub fn kind(&self) -> IdentityKind {
        match self {
            Identity::Anonymous(_) => IdentityKind::Anonymous,
            Identity::Authenticated(_) => IdentityKind::Authenticated,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.owner_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_constructors() {
        let user = Identity::authenticated("  user_42 ").unwrap();
        assert_eq!(user.owner_id(), "user_42");
        assert!(!user.is_anonymous());
        assert_eq!(user.to_string(), "authenticated:user_42");

        assert!(Identity::authenticated("   ").is_err());
        assert!(Identity::anonymous("").is_err());
    }

    #[test]
    fn test_new_session_is_unique() {
        let a = Identity::new_session();
        let b = Identity::new_session();
        assert!(a.is_anonymous());
        assert!(a.owner_id().starts_with("anon_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_serde() {
        let user = Identity::authenticated("user_1").unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert_eq!(json, r#"{"kind":"authenticated","id":"user_1"}"#);
        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, user);
    }
}
