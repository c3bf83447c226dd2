//! Named sessions.

use log::info;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::session::{Session, SessionState};

static GLOBAL: Lazy<SessionRegistry> = Lazy::new(SessionRegistry::new);

/// A set of sessions addressed by name.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

fn is_live(session: &Session) -> bool {
    !matches!(session.state(), SessionState::Closed | SessionState::Broken)
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry; the default session lives here too.
    pub fn global() -> &'static SessionRegistry {
        &GLOBAL
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a session under `name`. A closed or broken session already
    /// registered under that name is replaced; a live one is an error.
    pub fn open(&self, name: &str, config: EngineConfig) -> Result<Arc<Session>> {
        if let Some(existing) = self.get(name) {
            if is_live(&existing) {
                return Err(EngineError::InvalidArgument(format!(
                    "a session named '{name}' is already open"
                )));
            }
        }
        let session = Arc::new(Session::open(config)?);
        self.insert(name, session.clone())?;
        Ok(session)
    }

    /// Register an already opened session.
    pub fn insert(&self, name: &str, session: Arc<Session>) -> Result<()> {
        let mut sessions = self.sessions();
        if let Some(existing) = sessions.get(name) {
            if is_live(existing) && !Arc::ptr_eq(existing, &session) {
                return Err(EngineError::InvalidArgument(format!(
                    "a session named '{name}' is already open"
                )));
            }
        }
        info!("registered session '{name}' ({})", session.id());
        sessions.insert(name.to_string(), session);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions().get(name).cloned()
    }

    /// Close and forget `name`. Returns whether it was registered.
    pub fn close(&self, name: &str) -> Result<bool> {
        let removed = self.sessions().remove(name);
        match removed {
            Some(session) => {
                session.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close every registered session; the first failure is reported after
    /// all of them were attempted.
    pub fn close_all(&self) -> Result<()> {
        let drained: Vec<(String, Arc<Session>)> = self.sessions().drain().collect();
        let mut first_error = None;
        for (name, session) in drained {
            if let Err(e) = session.close() {
                log::warn!("closing session '{name}' failed: {e}");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::FakeEngine;

    fn fake_session() -> Arc<Session> {
        Arc::new(Session::with_channel(EngineConfig::default(), FakeEngine::new()).unwrap())
    }

    #[test]
    fn names_are_unique_while_live() {
        let registry = SessionRegistry::new();
        let first = fake_session();
        registry.insert("a", first.clone()).unwrap();
        registry.insert("a", first.clone()).unwrap();
        assert!(matches!(
            registry.insert("a", fake_session()),
            Err(EngineError::InvalidArgument(_))
        ));
        first.close().unwrap();
        registry.insert("a", fake_session()).unwrap();
        registry.insert("b", fake_session()).unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[test]
    fn close_removes_and_closes() {
        let registry = SessionRegistry::new();
        let session = fake_session();
        registry.insert("s", session.clone()).unwrap();
        assert!(registry.close("s").unwrap());
        assert!(!registry.close("s").unwrap());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.get("s").is_none());

        let other = fake_session();
        registry.insert("t", other.clone()).unwrap();
        registry.close_all().unwrap();
        assert!(registry.names().is_empty());
        assert_eq!(other.state(), SessionState::Closed);
    }

    #[test]
    fn sessions_are_independent() {
        let registry = SessionRegistry::new();
        registry.insert("one", fake_session()).unwrap();
        registry.insert("two", fake_session()).unwrap();
        let one = registry.get("one").unwrap();
        let two = registry.get("two").unwrap();
        one.put("x", &1.0f64).unwrap();
        assert_eq!(one.variable_names().unwrap(), vec!["x"]);
        assert!(two.variable_names().unwrap().is_empty());
    }
}
