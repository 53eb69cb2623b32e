//! Process bootstrap: build the shared components, run the configured
//! transport, shut down on a signal.

use std::sync::Arc;

use aerogate_core::audit::{AuditCategory, AuditEvent, AuditLevel, AuditLog};
use aerogate_core::capability::CapabilityRegistry;
use aerogate_core::catalog::MemoryCatalog;
use aerogate_core::config::GatewayConfig;
use aerogate_core::rate_limiter::RateLimiter;
use aerogate_core::validator::Validator;
use aerogate_core::{Dispatcher, TransportKind};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::AppError;
use crate::stdio::StdioTransport;

/// Build the dispatcher and everything it depends on.
///
/// # Errors
///
/// [`AppError::Audit`] when the audit file cannot be opened.
pub fn build_dispatcher(
    config: &GatewayConfig,
    registry: Arc<dyn CapabilityRegistry>,
) -> Result<Arc<Dispatcher>, AppError> {
    let audit = Arc::new(AuditLog::new(&config.audit)?);
    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    Ok(Arc::new(Dispatcher::new(
        registry,
        config.role,
        limiter,
        audit,
        Validator::new(config.validator.clone()),
    )))
}

/// Run the gateway until end of input (stdio) or a shutdown signal.
///
/// # Errors
///
/// Startup failures (audit sink, listener bind) and transport I/O failures.
pub async fn run(config: GatewayConfig) -> Result<(), AppError> {
    let dispatcher = build_dispatcher(&config, Arc::new(MemoryCatalog::default()))?;
    let audit = Arc::clone(dispatcher.audit());

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    info!(
        transport = %config.transport,
        role = %config.role,
        rate_limit = dispatcher.rate_limiter().is_enabled(),
        audit = audit.is_enabled(),
        "aerogate starting"
    );
    audit.log(
        AuditEvent::new(AuditLevel::Info, AuditCategory::System, "server_start")
            .with_detail("transport", config.transport.as_str())
            .with_detail("role", config.role.as_str()),
    );

    let result = match config.transport {
        TransportKind::Stdio => StdioTransport::new(Arc::clone(&dispatcher))
            .run(
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                shutdown.clone(),
            )
            .await
            .map_err(AppError::from),
        TransportKind::Sse | TransportKind::Polling => {
            aerogate_http::serve(&config, Arc::clone(&dispatcher), shutdown.clone())
                .await
                .map_err(AppError::from)
        }
    };
    shutdown.cancel();

    let mut event = AuditEvent::new(AuditLevel::Info, AuditCategory::System, "server_shutdown")
        .with_detail("transport", config.transport.as_str());
    if let Err(e) = &result {
        error!(error = %e, "Transport stopped with an error");
        event = event.failed(e.to_string());
    }
    audit.log(event);
    audit.flush();

    info!("aerogate stopped");
    result
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let on_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                on_sigint.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
        }
    });

    #[cfg(not(unix))]
    let _ = shutdown;
}
