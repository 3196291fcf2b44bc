//! Who this node is acting as, and with which presence.
//!
//! Shared between the control loop, which mutates it, and the inbound
//! handler, which reads it at handling time.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use parley_shared::constants::VISITOR;
use parley_shared::PresenceStatus;

#[derive(Debug, Clone)]
struct SessionState {
    username: Option<String>,
    status: PresenceStatus,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<RwLock<SessionState>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState {
                username: None,
                status: PresenceStatus::Online,
            })),
        }
    }

    // A poisoned lock still holds a usable value: two plain fields.
    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// The authenticated username, if any.
    pub fn user(&self) -> Option<String> {
        self.read().username.clone()
    }

    /// The name this node acts under: the username or the visitor label.
    pub fn username(&self) -> String {
        self.user().unwrap_or_else(|| VISITOR.to_string())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().username.is_some()
    }

    pub fn status(&self) -> PresenceStatus {
        self.read().status
    }

    pub fn is_offline(&self) -> bool {
        self.status().is_offline()
    }

    pub fn set_user(&self, username: Option<String>) {
        self.write().username = username;
    }

    /// Replace the presence, returning the previous one.
    pub fn set_status(&self, status: PresenceStatus) -> PresenceStatus {
        std::mem::replace(&mut self.write().status, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visitor_until_login() {
        let session = Session::new();
        assert_eq!(session.username(), VISITOR);
        assert!(!session.is_authenticated());

        session.set_user(Some("alice".into()));
        assert_eq!(session.username(), "alice");

        let clone = session.clone();
        clone.set_user(None);
        assert!(!session.is_authenticated());
    }

    #[test]
    fn test_set_status_returns_previous() {
        let session = Session::new();
        assert_eq!(session.set_status(PresenceStatus::Offline), PresenceStatus::Online);
        assert!(session.is_offline());
    }
}
