#![forbid(unsafe_code)]

use crate::domain::SessionId;
use crate::error::Error;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Allows at most one recording session at a time across all engines that
/// share the gate.
#[derive(Debug, Clone, Default)]
pub struct SessionGate {
    active: Arc<Mutex<Option<SessionId>>>,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, session: SessionId) -> Result<SessionLease, Error> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(Error::SessionActive);
        }
        *active = Some(session);
        Ok(SessionLease {
            gate: Arc::clone(&self.active),
            session,
        })
    }

    pub fn active(&self) -> Option<SessionId> {
        *self.active.lock()
    }
}

/// Held while a session is live. Dropping it frees the gate.
#[derive(Debug)]
pub struct SessionLease {
    gate: Arc<Mutex<Option<SessionId>>>,
    session: SessionId,
}

impl SessionLease {
    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut active = self.gate.lock();
        if *active == Some(self.session) {
            debug!(session = %self.session, "session gate released");
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_session_is_refused_until_release() {
        let gate = SessionGate::new();
        let first = gate.try_acquire(SessionId::new()).unwrap();
        assert!(matches!(
            gate.try_acquire(SessionId::new()),
            Err(Error::SessionActive)
        ));
        assert_eq!(gate.active(), Some(first.session()));

        drop(first);
        assert!(gate.active().is_none());
        assert!(gate.try_acquire(SessionId::new()).is_ok());
    }
}
