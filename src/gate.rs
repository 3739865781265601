// Wiring: one token store shared by the request layer, resolver and guards

use std::sync::Arc;
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::auth::AuthResolver;
use crate::config::AppConfig;
use crate::guard::{Navigator, RouteError, RouteTable};
use crate::session::{FileBackend, SessionBackend, StoreError, TokenStore};

/// Errors raised while assembling the gate
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Assembled auth gate for one client process
pub struct AuthGate {
    api: ApiClient,
    resolver: Arc<AuthResolver>,
    navigator: Navigator,
}

impl AuthGate {
    /// Build the gate with the durable file store named in `config`
    pub fn from_config(config: &AppConfig) -> Result<Self, GateError> {
        let backend = FileBackend::new(&config.session_file);
        Self::with_backend(config, backend, RouteTable::dive_shop()?)
    }

    /// Build the gate over any storage backend and route table
    pub fn with_backend(
        config: &AppConfig,
        backend: impl SessionBackend + 'static,
        routes: RouteTable,
    ) -> Result<Self, GateError> {
        let store = TokenStore::open(backend)?;
        let api = ApiClient::new(config, store.clone())?;

        let mut resolver = AuthResolver::new(store);
        if config.validate_session {
            resolver = resolver.with_validator(Arc::new(api.clone()));
        }
        let resolver = Arc::new(resolver);

        let navigator = Navigator::new(resolver.clone(), routes, config.navigation.clone());

        Ok(Self {
            api,
            resolver,
            navigator,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn resolver(&self) -> &Arc<AuthResolver> {
        &self.resolver
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        self.api.store()
    }
}
