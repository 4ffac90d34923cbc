use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::{LoginState, PersistedTokens, PersistenceError, TokenPersistence};

/// Listener invoked with `(previous, current)` after every login state transition.
pub type LoginStateObserver = dyn Fn(&LoginState, &LoginState) + Send + Sync;

/// Result of a conditional transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Transition {
    Applied,
    /// Another writer got there first; carries the state it left behind.
    Stale(LoginState),
    /// `log_out` ran since the caller read its epoch.
    SessionEnded,
}

struct Session {
    state: LoginState,
    /// Bumped by `log_out`; in-flight requests compare against it to detect a forced stop.
    epoch: u64,
}

/// Single source of truth for a client's login state.
///
/// Reads and writes are serialized by a mutex that is never held across an
/// `.await`. Token exchanges are serialized separately by an async gate so that
/// concurrent requests never refresh the same token twice.
pub struct TokenStore {
    session: Mutex<Session>,
    persistence: Option<Box<dyn TokenPersistence>>,
    observers: RwLock<Vec<Arc<LoginStateObserver>>>,
    exchange_gate: tokio::sync::Mutex<()>,
}

impl TokenStore {
    /// In-memory store starting from `initial`; nothing is persisted.
    pub fn new(initial: LoginState) -> Self {
        Self::build(initial, None)
    }

    /// Store backed by durable storage. The initial state is reconstructed from
    /// whatever tokens were saved previously.
    pub fn with_persistence(
        persistence: Box<dyn TokenPersistence>,
    ) -> Result<Self, PersistenceError> {
        let initial = persistence.load()?.into_state();
        info!(state = initial.label(), "restored login state");
        Ok(Self::build(initial, Some(persistence)))
    }

    fn build(initial: LoginState, persistence: Option<Box<dyn TokenPersistence>>) -> Self {
        Self {
            session: Mutex::new(Session {
                state: initial,
                epoch: 0,
            }),
            persistence,
            observers: RwLock::new(Vec::new()),
            exchange_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn get(&self) -> LoginState {
        self.lock().state.clone()
    }

    /// True for `LoggedIn` and `AccessTokenExpired`.
    pub fn is_authenticated(&self) -> bool {
        self.lock().state.is_authenticated()
    }

    pub fn set(&self, state: LoginState) {
        let previous = {
            let mut session = self.lock();
            self.replace(&mut session, state.clone())
        };
        self.notify(&previous, &state);
    }

    /// Replace the state only if it still equals `expected`. Returns whether the
    /// write happened.
    pub fn compare_and_set(&self, expected: &LoginState, state: LoginState) -> bool {
        let previous = {
            let mut session = self.lock();
            if session.state != *expected {
                return false;
            }
            self.replace(&mut session, state.clone())
        };
        self.notify(&previous, &state);
        true
    }

    /// Force `LoggedOut` and clear persisted tokens. Requests in flight stop at
    /// their next step with [`crate::EngineError::LoggedOut`].
    pub fn log_out(&self) {
        let previous = {
            let mut session = self.lock();
            session.epoch += 1;
            self.replace(&mut session, LoginState::LoggedOut)
        };
        info!("logged out");
        self.notify(&previous, &LoginState::LoggedOut);
    }

    /// Register a listener for state transitions. Listeners run synchronously on
    /// the writing task, after the state lock is released; a panicking listener is
    /// logged and otherwise ignored.
    ///
    /// Listeners may write back to the store. Transitions committed concurrently
    /// on different threads are not guaranteed to reach listeners in commit order;
    /// call [`TokenStore::get`] for the authoritative state.
    pub fn observe<F>(&self, observer: F)
    where
        F: Fn(&LoginState, &LoginState) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    pub(crate) fn snapshot(&self) -> (LoginState, u64) {
        let session = self.lock();
        (session.state.clone(), session.epoch)
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Conditional write used by the request engine.
    pub(crate) fn transition(
        &self,
        epoch: u64,
        expected: &LoginState,
        state: LoginState,
    ) -> Transition {
        let previous = {
            let mut session = self.lock();
            if session.epoch != epoch {
                return Transition::SessionEnded;
            }
            if session.state != *expected {
                return Transition::Stale(session.state.clone());
            }
            self.replace(&mut session, state.clone())
        };
        self.notify(&previous, &state);
        Transition::Applied
    }

    /// Serializes password and refresh grants across concurrent requests.
    pub(crate) async fn exchange_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exchange_gate.lock().await
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap the state and write it through while the lock is held, so persisted
    /// order always matches in-memory order.
    fn replace(&self, session: &mut Session, state: LoginState) -> LoginState {
        debug!(from = session.state.label(), to = state.label(), "login state transition");
        self.persist(&state);
        std::mem::replace(&mut session.state, state)
    }

    fn persist(&self, state: &LoginState) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let result = match state {
            LoginState::LoggedOut => persistence.clear(),
            other => persistence.save(&PersistedTokens::from_state(other)),
        };
        if let Err(err) = result {
            warn!(error = %err, "failed to persist login state");
        }
    }

    fn notify(&self, previous: &LoginState, current: &LoginState) {
        if previous == current {
            return;
        }
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| observer(previous, current)));
            if outcome.is_err() {
                warn!("login state observer panicked");
            }
        }
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new(LoginState::LoggedOut)
    }
}
