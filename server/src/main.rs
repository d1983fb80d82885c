use std::sync::Arc;

use axum::Router;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ticketing_server::config::Config;
use ticketing_server::routes::create_routes;
use ticketing_server::services::{LogNotifier, PaystackClient};
use ticketing_server::state::AppState;
use ticketing_server::store::{PgAdminStore, PgUserStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ticketing_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");
    if config.payment.secret_key.is_none() {
        tracing::warn!(
            "PAYSTACK_SECRET_KEY is not set; gateway payments and webhooks are disabled"
        );
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let gateway = PaystackClient::new(&config.payment).expect("Failed to build payment client");
    let addr = config.socket_addr();

    let state = AppState::new(
        Arc::new(config),
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgAdminStore::new(pool)),
        Arc::new(gateway),
        Arc::new(LogNotifier),
    );
    let app: Router = create_routes(state);

    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
