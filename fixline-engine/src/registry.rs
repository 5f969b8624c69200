/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tracks which connection owns each logical session.

use fixline_core::error::SessionError;
use fixline_core::types::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Binds sessions to connection ids so one session never runs on two
/// connections at once.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bound: Mutex<HashMap<SessionId, u64>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `session` to `connection_id`.
    ///
    /// # Errors
    /// Returns `SessionError::AlreadyBound` if another connection holds it.
    pub fn bind(&self, session: &SessionId, connection_id: u64) -> Result<(), SessionError> {
        let mut bound = self.bound.lock();
        match bound.get(session) {
            Some(&owner) if owner != connection_id => Err(SessionError::AlreadyBound {
                session: session.to_string(),
            }),
            _ => {
                bound.insert(session.clone(), connection_id);
                Ok(())
            }
        }
    }

    /// Releases the binding if `connection_id` still owns it.
    pub fn release(&self, session: &SessionId, connection_id: u64) -> bool {
        let mut bound = self.bound.lock();
        if bound.get(session) == Some(&connection_id) {
            bound.remove(session);
            true
        } else {
            false
        }
    }

    /// Returns true if some connection holds the session.
    #[must_use]
    pub fn is_bound(&self, session: &SessionId) -> bool {
        self.bound.lock().contains_key(session)
    }

    /// Number of bound sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bound.lock().len()
    }

    /// Returns true if no session is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::CompId;

    fn id() -> SessionId {
        SessionId::new(CompId::new("SERVER").unwrap(), CompId::new("CLIENT").unwrap())
    }

    #[test]
    fn test_bind_and_release() {
        let registry = SessionRegistry::new();
        registry.bind(&id(), 1).unwrap();
        assert!(registry.is_bound(&id()));

        assert!(!registry.release(&id(), 2));
        assert!(registry.release(&id(), 1));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_connection_is_refused() {
        let registry = SessionRegistry::new();
        registry.bind(&id(), 1).unwrap();

        assert!(matches!(
            registry.bind(&id(), 2),
            Err(SessionError::AlreadyBound { .. })
        ));
        // rebinding the owner is a no-op
        registry.bind(&id(), 1).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
