//! Process-wide bookkeeping of open capture sessions
//!
//! Sessions are keyed by their correlation token, so a consumer that
//! receives a message can find the session that produced it.

use dashmap::DashMap;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use pcapbridge_core::{CorrelationToken, SessionState};

use crate::session::Session;

/// Registry of capture sessions keyed by correlation token
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<CorrelationToken, Session>,
}

static GLOBAL: OnceLock<SessionRegistry> = OnceLock::new();

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// The process-wide registry, created on first use
    pub fn global() -> &'static SessionRegistry {
        GLOBAL.get_or_init(|| {
            debug!("Initializing global session registry");
            SessionRegistry::new()
        })
    }

    /// Track a session; returns its token
    pub fn register(&self, session: Session) -> CorrelationToken {
        let token = session.token();
        debug!(token = %token, device = %session.device(), "Registering session");
        self.sessions.insert(token, session);
        token
    }

    /// Look up a session by token
    pub fn get(&self, token: &CorrelationToken) -> Option<Session> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }

    /// Stop tracking a session and hand it back
    pub fn remove(&self, token: &CorrelationToken) -> Option<Session> {
        self.sessions.remove(token).map(|(_, session)| session)
    }

    /// Tokens of all tracked sessions
    pub fn tokens(&self) -> Vec<CorrelationToken> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of tracked sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are tracked
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions that have already been closed
    pub fn reap_closed(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.state() != SessionState::Closed);
        let reaped = before.saturating_sub(self.sessions.len());
        if reaped > 0 {
            debug!(count = reaped, "Reaped closed sessions");
        }
        reaped
    }

    /// Close and forget every tracked session
    ///
    /// Returns the number of sessions this call closed. Sessions that
    /// were already closed are removed without counting.
    pub fn close_all(&self) -> usize {
        info!(count = self.sessions.len(), "Closing all capture sessions");

        let mut closed = 0;
        for token in self.tokens() {
            let Some(session) = self.remove(&token) else {
                continue;
            };
            match session.close() {
                Ok(()) => closed += 1,
                Err(e) if e.is_invalid_state() => {
                    debug!(token = %token, "Session was already closed");
                }
                Err(e) => warn!(token = %token, error = %e, "Failed to close session"),
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::memory::MemoryDriver;

    fn open(driver: &MemoryDriver) -> Session {
        Session::open_channel(driver, CaptureConfig::default())
            .unwrap()
            .0
    }

    #[test]
    fn test_register_and_lookup() {
        let driver = MemoryDriver::new();
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let session = open(&driver);
        let token = registry.register(session.clone());
        assert_eq!(token, session.token());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tokens(), vec![token]);

        let found = registry.get(&token).unwrap();
        assert_eq!(found.token(), token);

        assert!(registry.remove(&token).is_some());
        assert!(registry.get(&token).is_none());
    }

    #[test]
    fn test_close_all() {
        let driver = MemoryDriver::new();
        let registry = SessionRegistry::new();

        let running = open(&driver);
        running.start().unwrap();
        registry.register(running.clone());
        registry.register(open(&driver));

        let already_closed = open(&driver);
        already_closed.close().unwrap();
        registry.register(already_closed);

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert_eq!(running.state(), SessionState::Closed);
        assert_eq!(driver.closed_count(), 3);
    }

    #[test]
    fn test_reap_closed() {
        let driver = MemoryDriver::new();
        let registry = SessionRegistry::new();

        let a = open(&driver);
        let b = open(&driver);
        registry.register(a.clone());
        registry.register(b.clone());

        a.close().unwrap();
        assert_eq!(registry.reap_closed(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&b.token()).is_some());
    }

    #[test]
    fn test_global_is_shared() {
        let first = SessionRegistry::global() as *const SessionRegistry;
        let second = SessionRegistry::global() as *const SessionRegistry;
        assert_eq!(first, second);
    }
}
