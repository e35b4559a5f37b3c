use std::sync::Arc;

use coupon_api::{
    auth::TokenService,
    config::AppConfig,
    coupons::{CouponUsageService, PgCouponStore, PgPurchasePipeline},
    create_router, db, AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Coupon API - Starting...");

    let config = AppConfig::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(
        &config.database_url,
        config.db_max_connections,
        config.db_acquire_timeout,
    )
    .await?;

    db::run_migrations(&pool).await?;

    let service = CouponUsageService::new(
        Arc::new(PgCouponStore::new(pool.clone())),
        Arc::new(PgPurchasePipeline::new(pool)),
    );
    let state = AppState::new(service, TokenService::new(config.jwt_secret.clone()));
    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Coupon API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
