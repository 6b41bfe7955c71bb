use std::sync::Arc;

use axum::http::HeaderName;
use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::crypto::password;
use crate::crypto::sealed::TokenCodec;
use crate::crypto::secret_store::SecretStore;
use crate::error::{AppError, Result};
use crate::middleware_layer::uri_guard::UriGuard;
use crate::models::user::User;
use crate::ratelimit::fingerprint::FingerprintHasher;
use crate::ratelimit::{AdaptiveRateLimiter, ClientIpResolver, TrustPolicy};
use crate::repositories::csrf::{CsrfStore, MemoryCsrfStore, RedisCsrfStore};
use crate::repositories::user::{MemoryUserRepository, PgUserRepository, UserRepository};
use crate::services::auth::SessionAuthenticator;
use crate::tokens::bind::BindTokenService;
use crate::tokens::session::SessionTokens;

/// The application's state. Every service is built once here and shared.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Arc<Config>,
    /// Rotating secret behind every sealed token.
    pub secrets: SecretStore,
    pub codec: TokenCodec,
    pub bind: Arc<BindTokenService>,
    pub auth: Arc<SessionAuthenticator>,
    pub rate_limiter: Arc<AdaptiveRateLimiter>,
    pub ip_resolver: Arc<ClientIpResolver>,
    pub uri_guard: Arc<UriGuard>,
    /// Single-request CSRF tokens.
    pub csrf_store: Arc<dyn CsrfStore>,
    /// Set when `csrf_store` is in-process and needs sweeping.
    pub memory_csrf: Option<MemoryCsrfStore>,
}

impl AppState {
    /// Creates a new `AppState`, connecting to PostgreSQL and Redis when configured.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: Config) -> Result<Self> {
        let users: Arc<dyn UserRepository> = match &config.database_url {
            Some(url) => {
                let pool = crate::db::create_pool(url, config.db_timeout)?;
                crate::db::ping(&pool).await?;
                tracing::info!("✅ PostgreSQL pool initialized with deadpool-postgres");
                Arc::new(PgUserRepository::new(pool))
            }
            None => {
                tracing::warn!("⚠️  DATABASE_URL not set, users are kept in memory");
                let repo = MemoryUserRepository::new();
                if let Some((email, dev_password)) = &config.dev_user {
                    let hash = password::hash_password(dev_password)?;
                    repo.insert(User::new("dev", email, hash, "admin"));
                    tracing::info!("✅ Seeded development user {}", email);
                }
                Arc::new(repo)
            }
        };

        let (csrf_store, memory_csrf): (Arc<dyn CsrfStore>, Option<MemoryCsrfStore>) =
            match &config.redis_url {
                Some(url) => {
                    let client = redis::Client::open(url.as_str())?;
                    let manager = ConnectionManager::new(client).await?;
                    tracing::info!("✅ Redis connection manager initialized");
                    (Arc::new(RedisCsrfStore::new(manager)), None)
                }
                None => {
                    tracing::warn!("⚠️  REDIS_URL not set, CSRF tokens are kept in memory");
                    let store = MemoryCsrfStore::new();
                    (Arc::new(store.clone()), Some(store))
                }
            };

        Self::from_parts(config, users, csrf_store, memory_csrf)
    }

    /// Builds state over an in-memory user store with no external services.
    pub fn in_memory(config: Config, users: MemoryUserRepository) -> Result<Self> {
        let store = MemoryCsrfStore::new();
        Self::from_parts(config, Arc::new(users), Arc::new(store.clone()), Some(store))
    }

    fn from_parts(
        config: Config,
        users: Arc<dyn UserRepository>,
        csrf_store: Arc<dyn CsrfStore>,
        memory_csrf: Option<MemoryCsrfStore>,
    ) -> Result<Self> {
        let secrets = SecretStore::new();
        let codec = TokenCodec::new(secrets.clone());

        let bind = Arc::new(BindTokenService::new(
            &config.secrets.bind_csrf,
            &config.secrets.bind_rsp,
        ));

        let tokens = SessionTokens::new(
            &config.secrets.access,
            &config.secrets.refresh,
            config.token_issuer.clone(),
        );
        let auth = Arc::new(SessionAuthenticator::new(
            users,
            tokens,
            bind.clone(),
            config.db_timeout,
        ));

        let rate_limiter = Arc::new(AdaptiveRateLimiter::new(
            TrustPolicy::from_config(&config.trust),
            FingerprintHasher::new(config.rate_limit_secret.clone()),
            config.rate_limit_window,
        ));

        let header = HeaderName::try_from(config.trust.client_ip_header.as_str())
            .map_err(|e| AppError::Internal(format!("Invalid CLIENT_IP_HEADER: {}", e)))?;
        let ip_resolver = Arc::new(ClientIpResolver::new(config.trust.proxy_ranges.clone(), header));

        let uri_guard = Arc::new(
            UriGuard::new().map_err(|e| AppError::Internal(format!("Invalid URI pattern: {}", e)))?,
        );

        tracing::info!("✅ Token services initialized");

        Ok(Self {
            config: Arc::new(config),
            secrets,
            codec,
            bind,
            auth,
            rate_limiter,
            ip_resolver,
            uri_guard,
            csrf_store,
            memory_csrf,
        })
    }
}
