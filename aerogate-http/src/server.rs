//! Listener binding and graceful serving.
//!
//! On cancellation the listener stops accepting, open event streams and
//! pending receives end, and in-flight posts are allowed to finish within the
//! shutdown grace period. Connections still open after the grace period are
//! abandoned.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use aerogate_core::config::GatewayConfig;
use aerogate_core::{Dispatcher, TransportKind};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServeError;
use crate::state::TransportState;
use crate::{polling, sse};

/// `bind:port` from configuration.
pub fn bind_address(config: &GatewayConfig) -> String {
    format!("{}:{}", config.bind, config.port)
}

/// Router for an HTTP transport.
pub fn router(state: TransportState) -> Result<Router, ServeError> {
    match state.transport() {
        TransportKind::Sse => Ok(sse::router(state)),
        TransportKind::Polling => Ok(polling::router(state)),
        other => Err(ServeError::NotHttp(other)),
    }
}

/// Bind and serve the configured HTTP transport until `shutdown` fires.
///
/// # Errors
///
/// [`ServeError::Bind`] when the listener cannot be bound,
/// [`ServeError::NotHttp`] for the stdio transport.
pub async fn serve(
    config: &GatewayConfig,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> Result<(), ServeError> {
    let transport = config.transport;
    if !transport.is_http() {
        return Err(ServeError::NotHttp(transport));
    }

    let state = TransportState::new(
        dispatcher,
        transport,
        config.session.clone(),
        shutdown.clone(),
    );
    let app = router(state.clone())?;

    let addr = bind_address(config);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!(
        addr = %addr,
        transport = %transport,
        queue_capacity = config.session.queue_capacity,
        "HTTP transport listening"
    );

    let sweeper = (transport == TransportKind::Polling).then(|| {
        polling::spawn_sweeper(
            Arc::clone(state.sessions()),
            config.session.sweep_interval(),
            config.session.idle_timeout(),
            shutdown.clone(),
        )
    });

    let result = serve_listener(listener, app, shutdown, config.shutdown_grace()).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    state.sessions().close_all();
    result
}

/// Serve `app` on an already-bound listener with a bounded graceful shutdown.
pub async fn serve_listener(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<(), ServeError> {
    let signal = shutdown.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result.map_err(ServeError::Serve),
        _ = shutdown.cancelled() => {
            info!(grace_secs = grace.as_secs(), "Shutting down HTTP transport");
            match tokio::time::timeout(grace, server).await {
                Ok(result) => result.map_err(ServeError::Serve),
                Err(_) => {
                    warn!(grace_secs = grace.as_secs(), "Grace period elapsed with connections still open");
                    Ok(())
                }
            }
        }
    }
}
