// Auth state resolver
//
// Turns the token store into an `AuthState`. The first resolve may confirm
// the stored session against the server; once settled, the state is read
// straight from the store's view, so a session cleared by a 401 is seen by
// every guard as soon as `invalidate` returns.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::state::AuthState;
use crate::session::{Role, SessionEvent, SessionView, TokenStore};

/// Outcome of asking the server about the stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// The token is valid; the server's role is authoritative
    Confirmed(Role),
    /// The server refused the token or reported an unusable identity
    Rejected,
    /// No verdict could be obtained (network or server failure)
    Unreachable(String),
}

/// Confirms the stored session against the "current user" endpoint
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self) -> Validation;
}

/// Derives and publishes `{ authenticated, loading, role }`
pub struct AuthResolver {
    store: Arc<TokenStore>,
    validator: Option<Arc<dyn SessionValidator>>,
    state: watch::Sender<AuthState>,
}

impl AuthResolver {
    /// Resolver that trusts the stored session without a server round-trip
    pub fn new(store: Arc<TokenStore>) -> Self {
        let (state, _) = watch::channel(AuthState::initializing());
        Self {
            store,
            validator: None,
            state,
        }
    }

    /// Confirm stored sessions with `validator` during resolution
    pub fn with_validator(mut self, validator: Arc<dyn SessionValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Current state
    ///
    /// While a resolution is pending this is `Initializing`. Afterwards it
    /// follows the store directly, without waiting for `run` to catch up.
    pub fn state(&self) -> AuthState {
        let published = *self.state.borrow();
        if published.loading {
            return published;
        }
        self.publish(derive(self.store.view()))
    }

    /// Subscribe to state changes
    pub fn watch(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Wait until the state machine leaves `Initializing`
    pub async fn settled(&self) -> AuthState {
        let mut rx = self.watch();
        let settled = match rx.wait_for(AuthState::is_settled).await {
            Ok(state) => *state,
            // Sender lives in `self`, so this only happens during teardown
            Err(_) => self.state(),
        };
        settled
    }

    /// Run one full check cycle, validating with the server when configured
    pub async fn resolve(&self) -> AuthState {
        loop {
            let (session, generation) = self.store.snapshot().await;

            let Some(session) = session else {
                return self.publish(AuthState::unauthenticated());
            };

            let Some(validator) = &self.validator else {
                return self.publish(AuthState::authenticated(session.role()));
            };

            self.publish(AuthState::initializing());
            debug!("Validating stored session for user {}", session.user_id());

            match validator.validate().await {
                Validation::Confirmed(role) => match self.store.confirm_role(generation, role).await {
                    Ok(true) => return self.publish(AuthState::authenticated(role)),
                    Ok(false) => {
                        debug!("Store changed during validation, discarding response");
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to persist confirmed role: {}", e);
                        return self.publish(AuthState::authenticated(role));
                    }
                },
                Validation::Rejected => match self.store.invalidate_if(generation).await {
                    Ok(true) => return self.publish(AuthState::unauthenticated()),
                    Ok(false) => {
                        debug!("Store changed during validation, discarding rejection");
                        continue;
                    }
                    Err(e) => {
                        // Memory is cleared even when the backend fails
                        warn!("Failed to clear rejected session: {}", e);
                        return self.publish(AuthState::unauthenticated());
                    }
                },
                Validation::Unreachable(reason) => {
                    if self.store.generation().await != generation {
                        continue;
                    }
                    // Only an explicit rejection signs the visitor out
                    warn!("Session validation unavailable, keeping stored role: {}", reason);
                    return self.publish(AuthState::authenticated(session.role()));
                }
            }
        }
    }

    /// Re-derive state from the store alone, without contacting the server
    pub async fn refresh(&self) -> AuthState {
        self.publish(derive(self.store.view()))
    }

    /// Resolve once, then follow store events until the store goes away
    pub async fn run(self: Arc<Self>) {
        let mut events = self.store.subscribe();
        self.resolve().await;

        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!("Session event: {:?}", event);
                    if matches!(event, SessionEvent::Invalidated) {
                        info!("Session invalidated, visitor is now signed out");
                    }
                    self.refresh().await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Missed {} session events, refreshing", skipped);
                    self.refresh().await;
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Spawn [`AuthResolver::run`] on the current runtime
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    fn publish(&self, next: AuthState) -> AuthState {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Auth state changed: {:?} -> {:?}", previous.phase(), next.phase());
        }
        next
    }
}

fn derive(view: SessionView) -> AuthState {
    match view.role {
        Some(role) => AuthState::authenticated(role),
        None => AuthState::unauthenticated(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::AuthPhase;
    use crate::session::Session;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Validator returning a fixed verdict and counting calls
    struct FixedValidator {
        verdict: Validation,
        calls: AtomicUsize,
    }

    impl FixedValidator {
        fn new(verdict: Validation) -> Arc<Self> {
            Arc::new(Self {
                verdict,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SessionValidator for FixedValidator {
        async fn validate(&self) -> Validation {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    /// Validator that blocks each call until released, to interleave store changes
    struct GatedValidator {
        entered: Notify,
        release: Notify,
        verdicts: Mutex<VecDeque<Validation>>,
    }

    impl GatedValidator {
        fn new(verdicts: impl IntoIterator<Item = Validation>) -> Arc<Self> {
            Arc::new(Self {
                entered: Notify::new(),
                release: Notify::new(),
                verdicts: Mutex::new(verdicts.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl SessionValidator for GatedValidator {
        async fn validate(&self) -> Validation {
            self.entered.notify_one();
            self.release.notified().await;
            self.verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Validation::Unreachable("no verdict left".to_string()))
        }
    }

    async fn store_with(role: Role) -> Arc<TokenStore> {
        let store = TokenStore::in_memory();
        store
            .save(Session::new("abc", "7", role).unwrap())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_starts_initializing() {
        let resolver = AuthResolver::new(TokenStore::in_memory());
        assert_eq!(resolver.state().phase(), AuthPhase::Initializing);
    }

    #[tokio::test]
    async fn test_empty_store_resolves_unauthenticated() {
        let validator = FixedValidator::new(Validation::Confirmed(Role::Admin));
        let resolver = AuthResolver::new(TokenStore::in_memory()).with_validator(validator.clone());

        assert_eq!(resolver.resolve().await, AuthState::unauthenticated());
        // No session means nothing to validate
        assert_eq!(validator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stored_session_without_validation() {
        let resolver = AuthResolver::new(store_with(Role::Staff).await);
        assert_eq!(resolver.resolve().await, AuthState::authenticated(Role::Staff));
    }

    #[tokio::test]
    async fn test_server_role_overrides_stored_role() {
        let store = store_with(Role::Staff).await;
        let resolver = AuthResolver::new(store.clone())
            .with_validator(FixedValidator::new(Validation::Confirmed(Role::Admin)));

        assert_eq!(resolver.resolve().await, AuthState::authenticated(Role::Admin));
        assert_eq!(store.read().await.unwrap().role(), Role::Admin);
    }

    #[tokio::test]
    async fn test_rejected_session_is_cleared() {
        let store = store_with(Role::Client).await;
        let resolver = AuthResolver::new(store.clone())
            .with_validator(FixedValidator::new(Validation::Rejected));

        assert_eq!(resolver.resolve().await, AuthState::unauthenticated());
        assert!(store.read().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_session() {
        let store = store_with(Role::Client).await;
        let resolver = AuthResolver::new(store.clone()).with_validator(FixedValidator::new(
            Validation::Unreachable("connection refused".to_string()),
        ));

        assert_eq!(resolver.resolve().await, AuthState::authenticated(Role::Client));
        assert!(store.read().await.is_some());
    }

    #[tokio::test]
    async fn test_stale_confirmation_is_discarded() {
        let store = store_with(Role::Staff).await;
        let validator = GatedValidator::new([Validation::Confirmed(Role::Staff)]);
        let resolver = Arc::new(AuthResolver::new(store.clone()).with_validator(validator.clone()));

        let pending = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        });

        validator.entered.notified().await;
        assert!(resolver.state().loading);

        // Session disappears while the confirmation is in flight
        store.invalidate().await.unwrap();
        validator.release.notify_one();

        let state = pending.await.unwrap();
        assert_eq!(state, AuthState::unauthenticated());
        assert!(store.read().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_rejection_spares_new_sign_in() {
        let store = store_with(Role::Staff).await;
        let validator = GatedValidator::new([Validation::Rejected, Validation::Confirmed(Role::Admin)]);
        let resolver = Arc::new(AuthResolver::new(store.clone()).with_validator(validator.clone()));

        let pending = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        });

        // The old token is rejected only after a new sign-in has landed
        validator.entered.notified().await;
        store
            .save(Session::new("fresh", "9", Role::Admin).unwrap())
            .await
            .unwrap();
        validator.release.notify_one();

        // The fresh session gets its own validation round
        validator.entered.notified().await;
        validator.release.notify_one();

        let state = pending.await.unwrap();
        assert_eq!(state, AuthState::authenticated(Role::Admin));
        assert_eq!(store.read().await.unwrap().token(), "fresh");
    }

    #[tokio::test]
    async fn test_state_follows_store_without_run() {
        let store = store_with(Role::Staff).await;
        let resolver = AuthResolver::new(store.clone());
        assert_eq!(resolver.resolve().await, AuthState::authenticated(Role::Staff));

        store.invalidate().await.unwrap();
        assert_eq!(resolver.state(), AuthState::unauthenticated());
        assert_eq!(*resolver.watch().borrow(), AuthState::unauthenticated());

        store
            .save(Session::new("def", "9", Role::Client).unwrap())
            .await
            .unwrap();
        assert_eq!(resolver.state(), AuthState::authenticated(Role::Client));
    }

    #[tokio::test]
    async fn test_pending_validation_stays_loading_after_clear() {
        let store = store_with(Role::Staff).await;
        let validator = GatedValidator::new([Validation::Confirmed(Role::Staff)]);
        let resolver = Arc::new(AuthResolver::new(store.clone()).with_validator(validator.clone()));

        let pending = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        });
        validator.entered.notified().await;

        store.invalidate().await.unwrap();
        assert_eq!(resolver.state().phase(), AuthPhase::Initializing);

        validator.release.notify_one();
        assert_eq!(pending.await.unwrap(), AuthState::unauthenticated());
        assert_eq!(resolver.state(), AuthState::unauthenticated());
    }

    #[tokio::test]
    async fn test_run_follows_store_events() {
        let store = store_with(Role::Staff).await;
        let resolver = Arc::new(AuthResolver::new(store.clone()));
        let mut rx = resolver.watch();
        let handle = resolver.clone().spawn();

        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.authenticated))
            .await
            .unwrap()
            .map(|s| *s)
            .unwrap();
        assert_eq!(state.role, Some(Role::Staff));

        store.invalidate().await.unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| !s.authenticated && !s.loading))
            .await
            .unwrap()
            .map(|s| *s)
            .unwrap();
        assert_eq!(state, AuthState::unauthenticated());

        store
            .save(Session::new("def", "9", Role::Admin).unwrap())
            .await
            .unwrap();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.authenticated))
            .await
            .unwrap()
            .map(|s| *s)
            .unwrap();
        assert_eq!(state.role, Some(Role::Admin));

        handle.abort();
    }

    #[tokio::test]
    async fn test_settled_waits_for_resolution() {
        let resolver = Arc::new(AuthResolver::new(store_with(Role::Client).await));
        let waiter = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.settled().await }
        });

        resolver.resolve().await;
        let state = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state, AuthState::authenticated(Role::Client));
    }
}
