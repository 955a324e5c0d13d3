use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
};

use crate::handlers::*;
use crate::{ApiError, ApiResult, ObjectService};

pub struct Server {
    config: crate::Config,
    service: Arc<dyn ObjectService>,
}

impl Server {
    pub fn new(config: crate::Config, service: Arc<dyn ObjectService>) -> Self {
        Self { config, service }
    }

    /// Serves until `shutdown` resolves, then lets in-flight requests finish.
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> ApiResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        let addr = self.config.bind_address();
        tracing::info!("Starting API server on {}", addr);

        let listener = TcpListener::bind(&addr).await
            .map_err(|e| ApiError::InternalError(format!("Failed to bind to {}: {}", addr, e)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ApiError::InternalError(format!("Server error: {}", e)))?;

        tracing::info!("API server on {} stopped", addr);
        Ok(())
    }

    pub fn router(&self) -> Router {
        Router::new()
            // Node-to-node
            .route("/health", get(health_check))
            .route(
                "/object/:id",
                get(get_replica).post(put_replica).delete(delete_replica),
            )

            // Client
            .route("/files", post(store_file))
            .route("/files/:id", get(get_file).delete(delete_file))
            .route("/files/:id/record", get(get_record))
            .route("/peers", post(register_peer))
            .route("/stats", get(get_stats))

            // Admin
            .route("/admin/backup", post(backup))
            .route("/admin/restore", post(restore))

            .fallback(not_found)
            .with_state(self.service.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(CorsLayer::permissive())
                    .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            )
    }
}
