//! Session state and its persistence.
//!
//! The state is an enum so that a bearer token only exists while
//! authenticated and a pending challenge only while awaiting a second factor.
//! Transitions that need the backend live in [`crate::auth`]; this module owns
//! the state itself and everything that does not need a network round trip.

use std::sync::{Arc, PoisonError, RwLock};

use shared::User;

use crate::storage::{SessionStorage, TOKEN_KEY, USER_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Anonymous,
    AwaitingSecondFactor,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Anonymous,
    AwaitingSecondFactor { challenge: String },
    Authenticated { user: User, token: String },
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Anonymous => Phase::Anonymous,
            Self::AwaitingSecondFactor { .. } => Phase::AwaitingSecondFactor,
            Self::Authenticated { .. } => Phase::Authenticated,
        }
    }
}

/// Owner of the current session. Only its own methods mutate the state.
pub struct SessionStore {
    state: RwLock<SessionState>,
    storage: Arc<dyn SessionStorage>,
}

impl SessionStore {
    /// A fresh, anonymous session backed by `storage`
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            state: RwLock::new(SessionState::Anonymous),
            storage,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.read().unwrap_or_else(PoisonError::into_inner).phase()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == Phase::Authenticated
    }

    pub fn user(&self) -> Option<User> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SessionState::Authenticated { user, .. } => Some(user.clone()),
            _ => None,
        }
    }

    pub fn token(&self) -> Option<String> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SessionState::Authenticated { token, .. } => Some(token.clone()),
            _ => None,
        }
    }

    pub fn pending_challenge(&self) -> Option<String> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            SessionState::AwaitingSecondFactor { challenge } => Some(challenge.clone()),
            _ => None,
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let from = state.phase();
        *state = next;
        tracing::debug!(from = ?from, to = ?state.phase(), "Session transition");
    }

    /// Load the persisted token and user. Runs once at startup and never
    /// contacts the server; an expired token is found on the first 401.
    pub fn restore_session(&self) {
        match self.read_persisted() {
            Some((user, token)) => {
                tracing::info!(user_id = %user.id, "Restored persisted session");
                self.set_state(SessionState::Authenticated { user, token });
            }
            None => {
                tracing::debug!("No persisted session");
                self.set_state(SessionState::Anonymous);
            }
        }
    }

    fn read_persisted(&self) -> Option<(User, String)> {
        let token = match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!("Failed to read persisted token: {}", e);
                return None;
            }
        };
        let raw_user = match self.storage.get(USER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read persisted user: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<User>(&raw_user) {
            Ok(user) => Some((user, token)),
            Err(e) => {
                tracing::warn!("Discarding unreadable persisted user: {}", e);
                None
            }
        }
    }

    /// Enter the second-factor phase with the server's challenge id
    pub(crate) fn begin_challenge(&self, challenge: String) {
        self.set_state(SessionState::AwaitingSecondFactor { challenge });
    }

    /// Drop a pending challenge, keeping an authenticated session as is
    pub(crate) fn abandon_challenge(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, SessionState::AwaitingSecondFactor { .. }) {
            *state = SessionState::Anonymous;
        }
    }

    /// Install a freshly issued user and token and persist both
    pub(crate) fn establish(&self, user: User, token: String) {
        self.persist(&user, &token);
        tracing::info!(user_id = %user.id, role = ?user.role, "Session established");
        self.set_state(SessionState::Authenticated { user, token });
    }

    fn persist(&self, user: &User, token: &str) {
        let result = serde_json::to_string(user)
            .map_err(crate::storage::StorageError::from)
            .and_then(|raw| {
                self.storage.set(TOKEN_KEY, token)?;
                self.storage.set(USER_KEY, &raw)
            });
        if let Err(e) = result {
            // The in-memory session stays usable for this run
            tracing::warn!("Failed to persist session: {}", e);
        }
    }

    /// Clear the session. Always ends Anonymous; storage failures are only logged.
    pub fn logout(&self) {
        if let Err(e) = self.storage.remove_many(&[TOKEN_KEY, USER_KEY]) {
            tracing::warn!("Failed to clear persisted session: {}", e);
        }
        self.set_state(SessionState::Anonymous);
        tracing::info!("Logged out");
    }

    /// Unauthorized-response hook. Only acts if `token` is still the current
    /// one, so a stale 401 cannot end a session established in the meantime.
    pub(crate) fn expire(&self, token: &str) {
        let current = self.token();
        if current.as_deref() == Some(token) {
            tracing::warn!("Server rejected the session token, logging out");
            self.logout();
        } else if current.is_none() {
            // Nothing in memory, but a stale copy may still be on disk
            if let Err(e) = self.storage.remove_many(&[TOKEN_KEY, USER_KEY]) {
                tracing::warn!("Failed to clear persisted session: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageError, StorageResult};
    use shared::Role;

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "a@x.com".to_string(),
            full_name: "Ana".to_string(),
            role: Role::Member,
            member: None,
        }
    }

    struct BrokenStorage;

    impl SessionStorage for BrokenStorage {
        fn get(&self, _key: &str) -> StorageResult<Option<String>> {
            Err(StorageError::NoDataDir)
        }
        fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
            Err(StorageError::NoDataDir)
        }
        fn remove(&self, _key: &str) -> StorageResult<bool> {
            Err(StorageError::NoDataDir)
        }
    }

    #[test]
    fn test_starts_anonymous() {
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        assert_eq!(store.phase(), Phase::Anonymous);
        assert!(store.token().is_none());
        assert!(store.pending_challenge().is_none());
    }

    #[test]
    fn test_establish_persists_and_restores() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.establish(user(), "tok".to_string());
        assert_eq!(store.phase(), Phase::Authenticated);

        let restarted = SessionStore::new(storage);
        assert_eq!(restarted.phase(), Phase::Anonymous);
        restarted.restore_session();
        assert_eq!(restarted.phase(), Phase::Authenticated);
        assert_eq!(restarted.user(), Some(user()));
        assert_eq!(restarted.token().as_deref(), Some("tok"));
    }

    #[test]
    fn test_challenge_is_never_persisted() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.begin_challenge("u1".to_string());
        assert_eq!(store.pending_challenge().as_deref(), Some("u1"));
        assert!(store.token().is_none());

        let restarted = SessionStore::new(storage);
        restarted.restore_session();
        assert_eq!(restarted.phase(), Phase::Anonymous);
    }

    #[test]
    fn test_restore_requires_both_entries() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_KEY, "tok").unwrap();
        let store = SessionStore::new(storage.clone());
        store.restore_session();
        assert_eq!(store.phase(), Phase::Anonymous);

        storage.set(USER_KEY, "{not json").unwrap();
        store.restore_session();
        assert_eq!(store.phase(), Phase::Anonymous);
    }

    #[test]
    fn test_logout_survives_storage_failure() {
        let store = SessionStore::new(Arc::new(BrokenStorage));
        store.establish(user(), "tok".to_string());
        assert_eq!(store.phase(), Phase::Authenticated);
        store.logout();
        assert_eq!(store.phase(), Phase::Anonymous);
        assert!(store.user().is_none());
    }

    #[test]
    fn test_expire_ignores_stale_token() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::new(storage.clone());
        store.establish(user(), "new".to_string());
        store.expire("old");
        assert_eq!(store.phase(), Phase::Authenticated);
        store.expire("new");
        assert_eq!(store.phase(), Phase::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_abandon_challenge_keeps_authenticated_session() {
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        store.establish(user(), "tok".to_string());
        store.abandon_challenge();
        assert_eq!(store.phase(), Phase::Authenticated);

        store.begin_challenge("u1".to_string());
        store.abandon_challenge();
        assert_eq!(store.phase(), Phase::Anonymous);
    }
}
