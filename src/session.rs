use crate::principal::Principal;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

/// Login or logout of one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEvent {
    principal: Principal,
    invalidate: bool,
}

impl SessionEvent {
    /// Creates an event. `invalidate` asks listeners to drop session state.
    pub fn new(principal: Principal, invalidate: bool) -> Self {
        Self {
            principal,
            invalidate,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn invalidate_session(&self) -> bool {
        self.invalidate
    }
}

/// Successful login, with where and when it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginEvent {
    session: SessionEvent,
    remote_host: Option<String>,
    at: SystemTime,
}

impl LoginEvent {
    pub fn new(principal: Principal, remote_host: Option<String>) -> Self {
        Self {
            session: SessionEvent::new(principal, false),
            remote_host,
            at: SystemTime::now(),
        }
    }

    pub fn session(&self) -> &SessionEvent {
        &self.session
    }

    pub fn principal(&self) -> &Principal {
        self.session.principal()
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    pub fn at(&self) -> SystemTime {
        self.at
    }
}

/// Audit and bookkeeping hook for session transitions.
///
/// Session listeners never mutate grants; identity changes flow through
/// [`crate::AuthenticationChangeListener`] instead.
pub trait SessionListener: Send + Sync {
    /// Called once after a session logs in.
    fn logged_in(&self, event: &LoginEvent) {
        let _ = event;
    }

    /// Called once after a session logs out.
    fn logged_out(&self, event: &SessionEvent) {
        let _ = event;
    }
}

/// Fans session transitions out to listeners, at most once per transition.
///
/// Transitions are keyed by session id. A principal without a session id is
/// delivered every time since there is nothing to de-duplicate on.
#[derive(Default)]
pub struct SessionNotifier {
    listeners: RwLock<Vec<Arc<dyn SessionListener>>>,
    active: Mutex<HashSet<String>>,
}

impl SessionNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn SessionListener>) {
        let mut guard = self.listeners.write().expect("poisoned lock");
        guard.push(listener);
    }

    /// Unregisters a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn SessionListener>) -> bool {
        let mut guard = self.listeners.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|existing| !Arc::ptr_eq(existing, listener));
        guard.len() != before
    }

    /// Returns whether a session id is currently logged in.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active.lock().expect("poisoned lock").contains(session_id)
    }

    /// Records a login. Returns false if the session was already active.
    pub fn fire_login(&self, event: &LoginEvent) -> bool {
        if let Some(session_id) = event.principal().session_id() {
            let mut active = self.active.lock().expect("poisoned lock");
            if !active.insert(session_id.to_string()) {
                return false;
            }
        }
        tracing::debug!(user = %event.principal().id(), "session logged in");
        for listener in self.snapshot() {
            listener.logged_in(event);
        }
        true
    }

    /// Records a logout. Returns false if the session was not active.
    pub fn fire_logout(&self, event: &SessionEvent) -> bool {
        if let Some(session_id) = event.principal().session_id() {
            let mut active = self.active.lock().expect("poisoned lock");
            if !active.remove(session_id) {
                return false;
            }
        }
        tracing::debug!(
            user = %event.principal().id(),
            invalidate = event.invalidate_session(),
            "session logged out"
        );
        for listener in self.snapshot() {
            listener.logged_out(event);
        }
        true
    }

    fn snapshot(&self) -> Vec<Arc<dyn SessionListener>> {
        self.listeners.read().expect("poisoned lock").clone()
    }
}

impl std::fmt::Debug for SessionNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionNotifier")
            .field("listeners", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}
