use crate::accumulator::Accumulator;
use crate::config::WebhooksConfig;
use crate::webhooks::KongWebhook;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Router with every configured webhook mounted.
pub fn router(config: &WebhooksConfig, acc: Arc<dyn Accumulator>) -> Router {
    let router = KongWebhook::new(&config.kong).register(Router::new(), acc);
    router.layer(TraceLayer::new_for_http())
}

/// Listen for webhooks until `shutdown` resolves.
pub async fn run<F>(
    config: &WebhooksConfig,
    acc: Arc<dyn Accumulator>,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(config, acc);

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("webhooks listening on {local_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
