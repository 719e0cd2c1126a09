use super::{Session, SessionInput, SessionServices};
use crate::domain::{Account, LocalRepository, PullRequest, SessionError, SessionKey};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;

struct RegistryState {
    repository: Option<LocalRepository>,
    sessions: LruCache<SessionKey, Session>,
    current: Option<Session>,
}

/// Bounded set of open sessions for the active local repository.
///
/// Sessions are keyed by base repository owner and pull request number. A
/// session nobody else holds a handle to is dropped on the next lookup, and
/// at most `capacity` sessions are kept at all.
pub struct SessionRegistry {
    services: SessionServices,
    rebuild_quiet: Duration,
    state: Mutex<RegistryState>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices, capacity: usize, rebuild_quiet: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            services,
            rebuild_quiet,
            state: Mutex::new(RegistryState {
                repository: None,
                sessions: LruCache::new(capacity),
                current: None,
            }),
        }
    }

    pub fn repository(&self) -> Option<LocalRepository> {
        self.state.lock().repository.clone()
    }

    /// Switch the active repository. Every session of the previous one is closed.
    pub fn repository_changed(&self, repository: Option<LocalRepository>) {
        let closed: Vec<Session> = {
            let mut state = self.state.lock();
            if state.repository == repository {
                return;
            }
            state.repository = repository;
            state.current = None;
            let closed = state.sessions.iter().map(|(_, session)| session.clone()).collect();
            state.sessions.clear();
            closed
        };

        for session in &closed {
            session.close();
        }
        log::info!("repository changed, closed {} sessions", closed.len());
    }

    /// Get the session for `pull_request`, refreshing it when it already exists.
    pub async fn get_session(
        &self,
        pull_request: PullRequest,
        user: Account,
        repository_owner: &str,
        is_checked_out: bool,
    ) -> Result<Session, SessionError> {
        let key = pull_request.session_key();

        let (existing, repository) = {
            let mut state = self.state.lock();
            let repository = state.repository.clone().ok_or(SessionError::NoRepository)?;
            (state.sessions.get(&key).cloned(), repository)
        };

        if let Some(session) = existing {
            log::debug!("reusing session {key}");
            session.set_checked_out(is_checked_out);
            session.update(pull_request).await;
            return Ok(session);
        }

        let session = Session::new(SessionInput {
            services: self.services.clone(),
            user,
            pull_request,
            repository,
            repository_owner: repository_owner.to_string(),
            is_checked_out,
            rebuild_quiet: self.rebuild_quiet,
        });

        let evicted = {
            let mut state = self.state.lock();
            let mut evicted = prune(&mut state.sessions);
            if let Some((evicted_key, session)) = state.sessions.push(key.clone(), session.clone())
                && evicted_key != key
            {
                evicted.push(session);
            }
            evicted
        };
        close_unused(evicted);

        Ok(session)
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.lock().current.clone()
    }

    pub fn set_current(&self, session: Option<Session>) {
        self.state.lock().current = session;
    }

    /// Drop sessions that are no longer referenced outside the registry.
    pub fn prune_unused(&self) -> usize {
        let evicted = prune(&mut self.state.lock().sessions);
        let count = evicted.len();
        close_unused(evicted);
        count
    }

    pub fn len(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.state.lock().sessions.contains(key)
    }
}

fn prune(sessions: &mut LruCache<SessionKey, Session>) -> Vec<Session> {
    let unused: Vec<SessionKey> = sessions
        .iter()
        .filter(|(_, session)| session.handle_count() == 1)
        .map(|(key, _)| key.clone())
        .collect();
    unused
        .iter()
        .filter_map(|key| sessions.pop(key))
        .collect()
}

fn close_unused(sessions: Vec<Session>) {
    for session in sessions {
        // Someone may still hold an evicted session; only stop it if not.
        if session.handle_count() == 1 {
            log::debug!("closing unused session {}", session.key());
            session.close();
        }
    }
}
