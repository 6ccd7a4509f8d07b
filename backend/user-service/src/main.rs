use anyhow::{Context, Result};
use crypto_core::TokenService;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Server};
use tracing::{error, info, warn};
use user_service::config::Settings;
use user_service::db::{InMemoryUserRepository, PgUserRepository, UserRepository};
use user_service::grpc::{UserGrpcService, UserServiceServer};
use user_service::http::admin::admin_router;
use user_service::http::middleware::HttpMetrics;
use user_service::http::{build_router, GatewayState};
use user_service::startup::assemble;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,user_service=debug".into()),
        )
        .with_target(false)
        .json()
        .init();

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(?settings, "Starting user-service");

    let tokens = Arc::new(
        TokenService::new(settings.jwt.token_config())
            .context("Invalid token configuration")?,
    );

    let metrics = prometheus::Registry::new();
    #[cfg(target_os = "linux")]
    metrics
        .register(Box::new(prometheus::process_collector::ProcessCollector::for_self()))
        .context("Failed to register process metrics")?;

    let pool = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.database.max_connections)
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run migrations")?;
            info!("Database connected and migrated");
            Some(pool)
        }
        None => {
            warn!("DATABASE_URL not set; users are kept in memory");
            None
        }
    };

    let parts = assemble(Arc::clone(&tokens), &metrics, move |codes| {
        let repository: Arc<dyn UserRepository> = match pool {
            Some(pool) => Arc::new(PgUserRepository::new(pool, codes)),
            None => Arc::new(InMemoryUserRepository::new(codes)),
        };
        repository
    })?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<UserServiceServer<UserGrpcService>>()
        .await;

    let grpc_listener = TcpListener::bind(settings.server.grpc_addr)
        .await
        .with_context(|| format!("Failed to bind gRPC listener on {}", settings.server.grpc_addr))?;
    let http_listener = TcpListener::bind(settings.server.http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", settings.server.http_addr))?;
    let admin_listener = TcpListener::bind(settings.server.admin_addr)
        .await
        .with_context(|| {
            format!("Failed to bind admin listener on {}", settings.server.admin_addr)
        })?;

    let channel = Channel::from_shared(settings.server.grpc_upstream.clone())
        .context("Invalid GRPC_UPSTREAM")?
        .connect_lazy();
    let http_metrics = HttpMetrics::new(&metrics).context("Failed to register HTTP metrics")?;
    let gateway = build_router(GatewayState::new(channel), http_metrics);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let grpc_server = tokio::spawn({
        let shutdown = wait_for(shutdown_rx.clone());
        Server::builder()
            .add_service(health_service)
            .add_service(UserServiceServer::new(parts.service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(grpc_listener), shutdown)
    });
    let http_shutdown = wait_for(shutdown_rx.clone());
    let http_server = tokio::spawn(async move {
        axum::serve(http_listener, gateway)
            .with_graceful_shutdown(http_shutdown)
            .await
    });
    let admin_router = admin_router(metrics);
    let admin_server = tokio::spawn(async move {
        axum::serve(admin_listener, admin_router)
            .with_graceful_shutdown(wait_for(shutdown_rx))
            .await
    });

    info!(
        event = "server_start",
        grpc_addr = %settings.server.grpc_addr,
        http_addr = %settings.server.http_addr,
        admin_addr = %settings.server.admin_addr,
        "user-service listening"
    );

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drain = async {
        match grpc_server.await {
            Ok(Err(e)) => error!(error = %e, "gRPC server error"),
            Err(e) => error!(error = %e, "gRPC server task failed"),
            Ok(Ok(())) => {}
        }
        match http_server.await {
            Ok(Err(e)) => error!(error = %e, "HTTP gateway error"),
            Err(e) => error!(error = %e, "HTTP gateway task failed"),
            Ok(Ok(())) => {}
        }
        match admin_server.await {
            Ok(Err(e)) => error!(error = %e, "Admin server error"),
            Err(e) => error!(error = %e, "Admin server task failed"),
            Ok(Ok(())) => {}
        }
    };

    let timeout = Duration::from_secs(settings.server.shutdown_timeout_secs);
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "Shutdown timed out; exiting");
    }

    info!(event = "server_shutdown", "user-service shutdown complete");
    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
