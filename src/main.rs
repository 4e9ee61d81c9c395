//! Notify Backend
//!
//! REST backend for the users, topics and subscriptions of a notification platform, with
//! SQLite persistence.

mod access;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::{SubscriptionIndex, TopicCatalog, UserDirectory};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory>,
    pub topics: Arc<TopicCatalog>,
    pub subscriptions: Arc<SubscriptionIndex>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Build every component on top of one shared pool.
    pub fn new(pool: sqlx::SqlitePool, config: Config) -> Self {
        Self {
            users: Arc::new(UserDirectory::new(pool.clone())),
            topics: Arc::new(TopicCatalog::new(pool.clone())),
            subscriptions: Arc::new(SubscriptionIndex::new(pool)),
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Notify Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (NOTIFY_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path, config.db_max_connections).await?;

    let state = AppState::new(pool, config.clone());

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Topics
        .route("/topics", get(api::list_topics).post(api::create_topic))
        .route("/topics/{id}", get(api::get_topic).put(api::update_topic))
        .route(
            "/topics/{id}/{user_id}",
            post(api::subscribe).delete(api::unsubscribe),
        )
        // Subscriptions
        .route("/subscriptions", get(api::list_subscriptions))
        .route(
            "/subscriptions/topic/{id}",
            get(api::list_topic_subscribers),
        )
        // Users
        .route("/users", get(api::list_users))
        .route("/users/lookup", get(api::lookup_user))
        .route("/users/identity", post(api::upsert_identity))
        .route("/users/{id}", get(api::get_user).delete(api::remove_user))
        .route("/users/{id}/profile", put(api::update_profile))
        .route(
            "/users/{id}/department",
            get(api::get_department).put(api::set_department),
        )
        .route("/users/{id}/telegram-chat", put(api::set_telegram_chat))
        .route(
            "/users/{id}/ban",
            post(api::ban_user).delete(api::unban_user),
        )
        .route(
            "/users/{id}/admin",
            get(api::get_admin_state)
                .put(api::promote_user)
                .delete(api::demote_user),
        )
        .route(
            "/users/{id}/events",
            get(api::get_events)
                .post(api::add_event)
                .delete(api::clear_events),
        )
        .route(
            "/users/{id}/events/{event_id}",
            axum::routing::delete(api::remove_event),
        )
        // Events
        .route("/events/{event_id}/users", get(api::list_event_users))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
