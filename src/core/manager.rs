//! Session manager for multiple sessions
//!
//! The registry lock only guards bookkeeping (add, remove, switch). Spawning
//! and stopping children happen outside it, and each session has its own
//! lock.

use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use super::session::{Session, SessionError, SessionEvent, SessionId, SessionOptions};
use super::term::validate_size;

pub type SharedSession = Arc<Mutex<Session>>;

struct Registry {
    sessions: HashMap<SessionId, SharedSession>,
    /// Activation order, most recently active last
    recent: Vec<SessionId>,
    active: Option<SessionId>,
    next_id: SessionId,
    default_size: (u16, u16),
}

impl Registry {
    fn activate(&mut self, id: SessionId) {
        self.recent.retain(|&other| other != id);
        self.recent.push(id);
        self.active = Some(id);
    }
}

pub struct SessionManager {
    registry: Mutex<Registry>,
    events: Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager and the receiving end of its event channel.
    pub fn new(default_cols: u16, default_rows: u16) -> (Self, Receiver<SessionEvent>) {
        let (events, receiver) = channel();
        let manager = Self {
            registry: Mutex::new(Registry {
                sessions: HashMap::new(),
                recent: Vec::new(),
                active: None,
                next_id: 1,
                default_size: (default_cols, default_rows),
            }),
            events,
        };
        (manager, receiver)
    }

    /// Spawn a new session. The first session becomes active; later ones
    /// are registered as the least recently active.
    pub fn create_session(&self, options: SessionOptions) -> Result<SessionId, SessionError> {
        let (id, default_size) = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            (id, registry.default_size)
        };

        let size = options.size.unwrap_or(default_size);
        let session = Session::spawn(id, options, size, self.events.clone())?;

        let mut registry = self.registry.lock();
        registry.sessions.insert(id, Arc::new(Mutex::new(session)));
        registry.recent.insert(0, id);
        if registry.active.is_none() {
            registry.activate(id);
        }
        tracing::info!("Created session {}", id);
        Ok(id)
    }

    /// Close a session. Returns the session that is active afterwards.
    pub fn close_session(&self, id: SessionId) -> Result<Option<SessionId>, SessionError> {
        let (session, active) = {
            let mut registry = self.registry.lock();
            let session = registry
                .sessions
                .remove(&id)
                .ok_or(SessionError::NotFound(id))?;
            registry.recent.retain(|&other| other != id);
            if registry.active == Some(id) {
                registry.active = registry.recent.last().copied();
            }
            (session, registry.active)
        };

        match session.lock().close() {
            Ok(()) | Err(SessionError::Disposed(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(active)
    }

    pub fn switch_active(&self, id: SessionId) -> Result<(), SessionError> {
        let mut registry = self.registry.lock();
        if !registry.sessions.contains_key(&id) {
            return Err(SessionError::NotFound(id));
        }
        registry.activate(id);
        Ok(())
    }

    /// Restart the child of a session, optionally with new options
    pub fn restart_session(
        &self,
        id: SessionId,
        options: Option<SessionOptions>,
    ) -> Result<(), SessionError> {
        let session = self.get(id).ok_or(SessionError::NotFound(id))?;
        let mut session = session.lock();
        session.restart(options)
    }

    /// Resize every session and make the size the default for new ones.
    /// All sessions are attempted; the first failure is returned.
    pub fn broadcast_resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        validate_size(cols, rows)?;
        let sessions: Vec<SharedSession> = {
            let mut registry = self.registry.lock();
            registry.default_size = (cols, rows);
            registry.sessions.values().cloned().collect()
        };

        let mut first_error = None;
        for session in sessions {
            let mut session = session.lock();
            if let Err(e) = session.resize(cols, rows) {
                tracing::warn!("Failed to resize session {}: {}", session.id(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub fn get(&self, id: SessionId) -> Option<SharedSession> {
        self.registry.lock().sessions.get(&id).cloned()
    }

    pub fn active(&self) -> Option<SessionId> {
        self.registry.lock().active
    }

    pub fn active_session(&self) -> Option<SharedSession> {
        let registry = self.registry.lock();
        registry.active.and_then(|id| registry.sessions.get(&id).cloned())
    }

    /// Session ids in creation order
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.registry.lock().sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_size(&self) -> (u16, u16) {
        self.registry.lock().default_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_session_errors() {
        let (manager, _events) = SessionManager::new(80, 24);
        assert!(matches!(manager.switch_active(3), Err(SessionError::NotFound(3))));
        assert!(matches!(manager.close_session(3), Err(SessionError::NotFound(3))));
        assert!(matches!(
            manager.restart_session(3, None),
            Err(SessionError::NotFound(3))
        ));
        assert!(manager.is_empty());
        assert_eq!(manager.active(), None);
    }

    #[test]
    fn test_broadcast_resize_validates_and_sets_default() {
        let (manager, _events) = SessionManager::new(80, 24);
        assert!(matches!(
            manager.broadcast_resize(0, 10),
            Err(SessionError::Terminal(_))
        ));
        assert_eq!(manager.default_size(), (80, 24));
        manager.broadcast_resize(100, 30).expect("resize");
        assert_eq!(manager.default_size(), (100, 30));
    }

    #[test]
    fn test_failed_spawn_registers_nothing() {
        let (manager, _events) = SessionManager::new(80, 24);
        let options = SessionOptions {
            size: Some((0, 0)),
            ..SessionOptions::default()
        };
        assert!(manager.create_session(options).is_err());
        assert!(manager.is_empty());
        assert_eq!(manager.active(), None);
    }

    #[test]
    fn test_activation_order() {
        let mut registry = Registry {
            sessions: HashMap::new(),
            recent: vec![3, 1, 2],
            active: Some(2),
            next_id: 4,
            default_size: (80, 24),
        };
        registry.activate(1);
        assert_eq!(registry.recent, vec![3, 2, 1]);
        assert_eq!(registry.active, Some(1));
    }
}
