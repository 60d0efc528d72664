// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! btrace Query Server
//!
//! HTTP/JSON gateway in front of the btrace storage gRPC service.

pub mod api;
pub mod config;
pub mod storage;

use anyhow::Result;
use axum::{
    error_handling::HandleErrorLayer,
    http::{header, HeaderValue},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{get_service_data, health_check, list_services, not_found, ApiError, AppState};
use btrace_query_core::QueryError;
use config::{HttpServerConfig, LogFormat, ServerConfig};
use storage::GrpcStorage;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

pub async fn run_server(config: ServerConfig) -> Result<()> {
    init_tracing(config.server.log_format);

    tracing::info!("Starting btrace query server");
    tracing::info!("Configuration: {:#?}", config);

    // Validate configuration
    config.validate()?;

    // One storage channel for the lifetime of the process
    let storage = GrpcStorage::connect_lazy(&config.storage)?;
    tracing::info!("Connecting to {}", storage.endpoint());

    let state = AppState::new(Arc::new(storage), config.stream.recv_timeout());
    let shutdown = state.shutdown.clone();
    let app = build_router(state, &config.server)?;

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Routes, CORS, request tracing and the request timeout.
///
/// An expired request timeout is reported like any other query error, as a
/// tagged `504 timeout` body.
pub fn build_router(state: AppState, config: &HttpServerConfig) -> Result<Router> {
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let mut router = Router::new()
        .route("/api/services", get(list_services))
        .route("/api/service/:name/data", get(get_service_data))
        .route("/health", get(health_check))
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    request_error(err, request_timeout)
                }))
                .layer(TimeoutLayer::new(request_timeout)),
        );

    if config.enable_cors {
        router = router.layer(cors_layer(config)?);
    }

    Ok(router.layer(TraceLayer::new_for_http()))
}

fn request_error(err: BoxError, request_timeout: Duration) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::Query(QueryError::Timeout(request_timeout))
    } else {
        ApiError::Internal(err.to_string())
    }
}

fn cors_layer(config: &HttpServerConfig) -> Result<CorsLayer> {
    let origins = if config.cors_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let origins = config
            .cors_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers([header::ORIGIN])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(CORS_MAX_AGE))
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "btrace_query_server=info,btrace_query_core=info,tower_http=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, cancelling in-flight queries");
    shutdown.cancel();
}
