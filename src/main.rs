use crate::integrations::gemini_suggester::GeminiSuggester;
use crate::integrations::identity_toolkit::IdentityToolkit;
use crate::persistence::db_task_driven_ports::DbTaskSubscriber;
use crate::persistence::session_store::InMemorySessionStore;
use anyhow::Context;
use axum::Router;
use axum::extract::State;
use dotenv::dotenv;
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod api;
mod app_env;
mod db;
mod domain;
mod dto;
mod external_connections;
mod integrations;
mod logging;
mod persistence;
mod routing_utils;

/// Everything request handlers share: outbound connections plus the adapters that
/// hold state of their own
pub struct SharedData {
    pub ext_cxn: persistence::ExternalConnectivity,
    pub sessions: InMemorySessionStore,
    pub identity: IdentityToolkit,
    pub suggester: GeminiSuggester,
    pub task_subscriber: DbTaskSubscriber,
}

pub type AppState = State<Arc<SharedData>>;

fn env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn required_env(name: &str) -> Result<String, anyhow::Error> {
    env::var(name).with_context(|| format!("reading the {name} environment variable"))
}

/// Combines every route group with the API docs and request tracing
fn build_router(shared_data: Arc<SharedData>) -> Router {
    let routes = Router::new()
        .nest("/auth", api::auth::auth_routes())
        .merge(api::task::task_routes())
        .merge(api::timer::timer_routes())
        .merge(api::time_entry::time_entry_routes())
        .merge(api::suggestion::suggestion_routes())
        .merge(api::swagger_main::build_documentation())
        .with_state(shared_data);

    logging::attach_tracing_http(routes)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenv().ok();

    let otel_exporters = match (
        env::var(app_env::OTEL_SPAN_EXPORT_URL),
        env::var(app_env::OTEL_METRIC_EXPORT_URL),
    ) {
        (Ok(span_url), Ok(metric_url)) => Some(logging::init_exporters(&span_url, &metric_url)?),
        _ => None,
    };
    logging::setup_logging_and_tracing(logging::init_env_filter()?, otel_exporters);

    let db_url = required_env(app_env::DB_URL)?;
    let sqlx_db_connection = db::connect_sqlx(&db_url).await?;
    db::migrate(&sqlx_db_connection).await?;

    let identity = IdentityToolkit::new(
        &env_or_default(app_env::AUTH_BASE_URL, app_env::defaults::AUTH_BASE_URL),
        &required_env(app_env::AUTH_API_KEY)?,
    );
    let suggester = GeminiSuggester::new(
        &env_or_default(app_env::SUGGESTION_BASE_URL, app_env::defaults::SUGGESTION_BASE_URL),
        &required_env(app_env::SUGGESTION_API_KEY)?,
        &env_or_default(app_env::SUGGESTION_MODEL, app_env::defaults::SUGGESTION_MODEL),
    );

    let task_subscriber = DbTaskSubscriber::start(sqlx_db_connection.clone()).await?;

    let shared_data = Arc::new(SharedData {
        ext_cxn: persistence::ExternalConnectivity::new(sqlx_db_connection)?,
        sessions: InMemorySessionStore::new(),
        identity,
        suggester,
        task_subscriber,
    });
    let router = build_router(shared_data);

    let listen_addr = env_or_default(app_env::LISTEN_ADDR, app_env::defaults::LISTEN_ADDR);
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding to {listen_addr}"))?;
    info!("Starting server on {listen_addr}");
    axum::serve(listener, router)
        .await
        .context("running the HTTP server")?;

    Ok(())
}
