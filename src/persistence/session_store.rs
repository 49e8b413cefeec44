use crate::domain::auth::driven_ports::SessionStore;
use crate::domain::auth::{Session, SessionId};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Sessions unused for this long are signed out
pub const DEFAULT_IDLE_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);
/// Sessions are signed out this long after sign-in no matter how active they are
pub const DEFAULT_ABSOLUTE_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct StoredSession {
    session: Session,
    created_at: Instant,
    last_accessed: Instant,
}

impl StoredSession {
    fn is_live(&self, now: Instant, idle_lifetime: Duration, absolute_lifetime: Duration) -> bool {
        now.duration_since(self.last_accessed) < idle_lifetime
            && now.duration_since(self.created_at) < absolute_lifetime
    }
}

/// Sessions live only in this process. Restarting the server signs everyone out and
/// discards any running timers.
///
/// Expired sessions read as missing and are dropped the next time one is looked up or
/// a new session is saved.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
    idle_lifetime: Duration,
    absolute_lifetime: Duration,
}

impl InMemorySessionStore {
    pub fn new() -> InMemorySessionStore {
        Self::with_lifetimes(DEFAULT_IDLE_LIFETIME, DEFAULT_ABSOLUTE_LIFETIME)
    }

    pub fn with_lifetimes(idle_lifetime: Duration, absolute_lifetime: Duration) -> InMemorySessionStore {
        InMemorySessionStore {
            sessions: RwLock::new(HashMap::new()),
            idle_lifetime,
            absolute_lifetime,
        }
    }

    /// Runs `action` on a live session, marking it as used. Expired sessions are removed.
    fn with_live_session<R>(
        &self,
        session_id: SessionId,
        action: impl FnOnce(&mut Session) -> R,
    ) -> Result<Option<R>, anyhow::Error> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let now = Instant::now();

        let Some(stored) = sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if !stored.is_live(now, self.idle_lifetime, self.absolute_lifetime) {
            sessions.remove(&session_id);
            debug!("Session {session_id} expired");
            return Ok(None);
        }

        stored.last_accessed = now;
        Ok(Some(action(&mut stored.session)))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for InMemorySessionStore {
    fn session(&self, session_id: SessionId) -> Result<Option<Session>, anyhow::Error> {
        self.with_live_session(session_id, |session| session.clone())
    }

    fn save(&self, session: Session) -> Result<(), anyhow::Error> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        let now = Instant::now();

        let before = sessions.len();
        sessions.retain(|_, stored| stored.is_live(now, self.idle_lifetime, self.absolute_lifetime));
        if sessions.len() < before {
            debug!("Evicted {} expired sessions", before - sessions.len());
        }

        let created_at = sessions
            .get(&session.id)
            .map(|stored| stored.created_at)
            .unwrap_or(now);
        sessions.insert(
            session.id,
            StoredSession {
                session,
                created_at,
                last_accessed: now,
            },
        );

        Ok(())
    }

    fn update<R>(
        &self,
        session_id: SessionId,
        change: impl FnOnce(&mut Session) -> R,
    ) -> Result<Option<R>, anyhow::Error> {
        self.with_live_session(session_id, change)
    }

    fn remove(&self, session_id: SessionId) -> Result<Option<Session>, anyhow::Error> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session store lock poisoned"))?;

        Ok(sessions.remove(&session_id).map(|stored| stored.session))
    }
}
