use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use studybuddy_backend::ai::{ChatModel, OpenAiChatModel};
use studybuddy_backend::billing::{BillingProvider, StripeClient};
use studybuddy_backend::config::AppConfig;
use studybuddy_backend::db;
use studybuddy_backend::routes;
use studybuddy_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        openai_enabled = config.openai_api_key.is_some(),
        stripe_enabled = config.stripe_secret_key.is_some(),
        notion_enabled = config.notion_client_id.is_some(),
        "loaded backend configuration"
    );

    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
    db::run_pending_migrations(&pool)?;

    let http = reqwest::Client::new();

    let ai: Option<Arc<dyn ChatModel>> = config
        .openai_api_key
        .as_deref()
        .map(|key| Arc::new(OpenAiChatModel::new(key, &config.openai_model)) as Arc<dyn ChatModel>);

    let billing: Option<Arc<dyn BillingProvider>> =
        match (config.stripe_secret_key.as_deref(), config.stripe_price_paid.as_deref()) {
            (Some(secret_key), Some(price_paid)) => {
                let client_url = config.client_url.as_deref().unwrap_or("http://localhost:5173");
                Some(Arc::new(StripeClient::new(
                    http.clone(),
                    secret_key,
                    price_paid,
                    client_url,
                )) as Arc<dyn BillingProvider>)
            }
            _ => None,
        };

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;

    let state = AppState::new(pool, config, ai, billing);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
