use std::sync::Arc;

use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::PgConnection;

use crate::ai::ChatModel;
use crate::auth::jwt::JwtService;
use crate::billing::BillingProvider;
use crate::config::AppConfig;
use crate::db::PgPool;
use crate::ephemeral::EphemeralStore;
use crate::error::AppError;

pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared application state handed to every handler. The AI and billing
/// clients sit behind traits so tests can swap in fakes without touching
/// the router.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub ai: Option<Arc<dyn ChatModel>>,
    pub billing: Option<Arc<dyn BillingProvider>>,
    pub public_sessions: Arc<EphemeralStore>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        ai: Option<Arc<dyn ChatModel>>,
        billing: Option<Arc<dyn BillingProvider>>,
    ) -> Self {
        let jwt = JwtService::new(
            &config.jwt_secret,
            &config.jwt_issuer,
            &config.jwt_audience,
            config.jwt_expiry_days,
        );
        let public_sessions = Arc::new(EphemeralStore::new(
            chrono::Duration::hours(config.public_session_ttl_hours),
            config.public_session_capacity,
            config.public_daily_limit,
        ));
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            ai,
            billing,
            public_sessions,
            http: reqwest::Client::new(),
        }
    }

    pub fn db(&self) -> Result<DbConnection, AppError> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("failed to get database connection: {err}")))
    }

    pub fn ai(&self) -> Result<Arc<dyn ChatModel>, AppError> {
        self.ai
            .clone()
            .ok_or_else(|| AppError::config("OPENAI_API_KEY is not configured"))
    }

    pub fn billing(&self) -> Result<Arc<dyn BillingProvider>, AppError> {
        self.billing
            .clone()
            .ok_or_else(|| AppError::config("Stripe is not configured"))
    }
}
