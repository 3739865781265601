// Token store: the single owner of the client-side session
//
// Guards, the resolver and the request layer all share one `TokenStore`
// through an `Arc`. Every mutation bumps a generation counter and publishes
// a `SessionEvent` so that subscribers react instead of polling storage.

use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};

use crate::session::backend::{MemoryBackend, SessionBackend};
use crate::session::error::StoreResult;
use crate::session::models::{Role, Session, StoredSession};

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Change published after every store mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was saved after sign-in
    SignedIn(Role),
    /// The visitor signed out explicitly
    SignedOut,
    /// The server rejected the token (HTTP 401)
    Invalidated,
    /// The server reported a different role for the current token
    RoleChanged(Role),
}

/// Synchronous view of the store, republished under the write lock
///
/// Guards read this instead of a cached auth state, so a cleared store is
/// visible to them before the clearing call returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionView {
    pub role: Option<Role>,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    session: Option<Session>,
    generation: u64,
}

/// Shared, durable holder of the current session
pub struct TokenStore {
    backend: Box<dyn SessionBackend>,
    state: RwLock<StoreState>,
    events: broadcast::Sender<SessionEvent>,
    view: watch::Sender<SessionView>,
}

impl StoreState {
    fn view(&self) -> SessionView {
        SessionView {
            role: self.session.as_ref().map(Session::role),
            generation: self.generation,
        }
    }
}

impl TokenStore {
    /// Open a store, loading whatever session the backend already holds
    pub fn open(backend: impl SessionBackend + 'static) -> StoreResult<Arc<Self>> {
        let session = backend.load()?.and_then(StoredSession::into_session);
        match &session {
            Some(s) => debug!("Restored session for user {} with role {}", s.user_id(), s.role()),
            None => debug!("No stored session found"),
        }

        let state = StoreState {
            session,
            generation: 0,
        };
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (view, _) = watch::channel(state.view());
        Ok(Arc::new(Self {
            backend: Box::new(backend),
            state: RwLock::new(state),
            events,
            view,
        }))
    }

    /// Empty store kept in memory only
    pub fn in_memory() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (view, _) = watch::channel(SessionView::default());
        Arc::new(Self {
            backend: Box::new(MemoryBackend::new()),
            state: RwLock::new(StoreState::default()),
            events,
            view,
        })
    }

    /// Persist a session, replacing any previous one
    pub async fn save(&self, session: Session) -> StoreResult<()> {
        let mut state = self.state.write().await;
        self.backend.store(&StoredSession::from_session(&session))?;

        let role = session.role();
        info!("Session saved for user {} with role {}", session.user_id(), role);
        state.session = Some(session);
        state.generation += 1;
        self.publish(&state, SessionEvent::SignedIn(role));
        Ok(())
    }

    /// Role and generation as of the last completed mutation, without locking
    pub fn view(&self) -> SessionView {
        *self.view.borrow()
    }

    /// Follow the view as it changes
    pub fn watch_view(&self) -> watch::Receiver<SessionView> {
        self.view.subscribe()
    }

    /// Current session, if any
    pub async fn read(&self) -> Option<Session> {
        self.state.read().await.session.clone()
    }

    /// Current session together with the generation it was read at
    pub async fn snapshot(&self) -> (Option<Session>, u64) {
        let state = self.state.read().await;
        (state.session.clone(), state.generation)
    }

    /// Generation counter, bumped by every mutation
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    /// Explicit sign-out
    pub async fn clear(&self) -> StoreResult<()> {
        self.remove(SessionEvent::SignedOut).await
    }

    /// Drop the session after the server rejected its token
    pub async fn invalidate(&self) -> StoreResult<()> {
        self.remove(SessionEvent::Invalidated).await
    }

    /// Drop the session after a rejection, unless it changed since `generation`
    ///
    /// Returns `false` and leaves the store alone when a newer session (or
    /// none) is already in place.
    pub async fn invalidate_if(&self, generation: u64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.generation != generation {
            debug!(
                "Ignoring rejection for generation {}, store is at {}",
                generation, state.generation
            );
            return Ok(false);
        }
        self.remove_locked(&mut state, SessionEvent::Invalidated)?;
        Ok(true)
    }

    /// Replace the stored role when nothing changed since `generation`
    ///
    /// Returns `false` and leaves the store alone when the session was
    /// replaced or removed in the meantime.
    pub async fn confirm_role(&self, generation: u64, role: Role) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.generation != generation {
            return Ok(false);
        }

        let updated = match &state.session {
            Some(session) if session.role() != role => session.with_role(role),
            Some(_) => return Ok(true),
            None => return Ok(false),
        };

        self.backend.store(&StoredSession::from_session(&updated))?;
        info!(
            "Role for user {} updated from server: {}",
            updated.user_id(),
            role
        );
        state.session = Some(updated);
        state.generation += 1;
        self.publish(&state, SessionEvent::RoleChanged(role));
        Ok(true)
    }

    /// Receive every subsequent session event
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn remove(&self, event: SessionEvent) -> StoreResult<()> {
        let mut state = self.state.write().await;
        self.remove_locked(&mut state, event)
    }

    fn remove_locked(&self, state: &mut StoreState, event: SessionEvent) -> StoreResult<()> {
        let had_session = state.session.take().is_some();

        // The in-memory session is gone even if the backend fails below
        if had_session {
            state.generation += 1;
        }
        let removed = self.backend.remove();

        if had_session {
            match event {
                SessionEvent::Invalidated => warn!("Session invalidated by server rejection"),
                _ => info!("Session cleared"),
            }
            self.publish(state, event);
        }
        removed
    }

    fn publish(&self, state: &StoreState, event: SessionEvent) {
        self.view.send_replace(state.view());
        // No receivers simply means nobody is listening yet
        let _ = self.events.send(event);
    }
}
